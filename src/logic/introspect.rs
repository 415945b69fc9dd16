use std::collections::BTreeMap;

use crate::model::{
    FieldDef, FieldDescriptor, InvokablePredicate, ModelDescriptor, ModelRegistry, ModelSchema,
    RelationshipDescriptor,
};

/// Build the immutable descriptor for `schema`.
///
/// `registry` supplies the other models so reciprocal references can be
/// paired up; this only happens when `relate` is set. A missing geospatial
/// index or a reference without a partner simply leaves that feature off.
pub fn describe(
    schema: &ModelSchema,
    registry: &ModelRegistry,
    relate: bool,
    invokable_test: &InvokablePredicate,
) -> ModelDescriptor {
    let fields = schema
        .fields
        .iter()
        .map(|field| FieldDescriptor {
            name: field.name.clone(),
            default: field.default.clone(),
            is_subdocument: field.is_subdocument(),
            is_reference: field.referenced_model().is_some(),
        })
        .collect();

    let relationships = if relate {
        find_relationships(schema, registry)
    } else {
        Vec::new()
    };

    let methods: BTreeMap<_, _> = schema
        .methods
        .iter()
        .filter(|method| invokable_test(method))
        .map(|method| (method.name.clone(), method.handler.clone()))
        .collect();

    let blank_template = schema
        .fields
        .iter()
        .map(|field| (field.name.clone(), blank_default(field)))
        .collect();

    ModelDescriptor {
        name: schema.name.clone(),
        fields,
        geo_field: find_geo_field(schema),
        relationships,
        methods,
        blank_template,
    }
}

fn blank_default(field: &FieldDef) -> Option<crate::model::DefaultValue> {
    field.default.clone().or_else(|| {
        field
            .is_subdocument()
            .then(|| crate::model::DefaultValue::Static(serde_json::Value::Array(Vec::new())))
    })
}

/// First field carrying a 2d or 2dsphere index, declared either inline or in
/// a compound index. Inline annotations win.
pub fn find_geo_field(schema: &ModelSchema) -> Option<String> {
    let inline = schema
        .fields
        .iter()
        .find(|field| field.index.map(|kind| kind.is_geospatial()).unwrap_or(false))
        .map(|field| field.name.clone());

    inline.or_else(|| {
        schema
            .indexes
            .iter()
            .flatten()
            .find(|(_, kind)| kind.is_geospatial())
            .map(|(field, _)| field.clone())
    })
}

/// Pair every reference on `schema` with each field of the referenced model
/// that points back at `schema`.
pub fn find_relationships(
    schema: &ModelSchema,
    registry: &ModelRegistry,
) -> Vec<RelationshipDescriptor> {
    let mut relationships = Vec::new();
    for field in &schema.fields {
        let Some(target) = field.referenced_model() else {
            continue;
        };
        let Some(related) = registry.get(target) else {
            log::debug!(
                "{}.{} references unregistered model {}",
                schema.name,
                field.name,
                target
            );
            continue;
        };
        for related_field in &related.fields {
            if related_field.referenced_model() == Some(schema.name.as_str()) {
                log::debug!(
                    "Found relationship {}.{} <-> {}.{}",
                    schema.name,
                    field.name,
                    related.name,
                    related_field.name
                );
                relationships.push(RelationshipDescriptor {
                    owning_field: field.name.clone(),
                    related_model: related.name.clone(),
                    related_field: related_field.name.clone(),
                    is_array: related_field.is_array(),
                });
            }
        }
    }
    relationships
}

/// Describe every registered model.
pub fn describe_all(
    registry: &ModelRegistry,
    relate: bool,
    invokable_test: &InvokablePredicate,
) -> Vec<ModelDescriptor> {
    registry
        .iter()
        .map(|schema| describe(schema, registry, relate, invokable_test))
        .collect()
}
