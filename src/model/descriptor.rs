use serde_json::Value;
use std::collections::BTreeMap;

use crate::model::{DefaultValue, Document, MethodFn};

#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub default: Option<DefaultValue>,
    pub is_subdocument: bool,
    pub is_reference: bool,
}

/// A pair of fields on two models that point at each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipDescriptor {
    /// Field on the owning model holding the reference id(s).
    pub owning_field: String,
    pub related_model: String,
    pub related_field: String,
    /// The related field holds a set of ids rather than a single one.
    pub is_array: bool,
}

/// Immutable, introspected view of one model.
///
/// Produced once at startup by [`describe`](crate::logic::describe) and shared
/// read-only between all request handlers.
#[derive(Clone)]
pub struct ModelDescriptor {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
    pub geo_field: Option<String>,
    pub relationships: Vec<RelationshipDescriptor>,
    pub(crate) methods: BTreeMap<String, MethodFn>,
    pub(crate) blank_template: Vec<(String, Option<DefaultValue>)>,
}

impl ModelDescriptor {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.name.as_str())
    }

    pub fn subdocument_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|field| field.is_subdocument)
            .map(|field| field.name.as_str())
    }

    pub fn is_subdocument(&self, name: &str) -> bool {
        self.field(name).map(|field| field.is_subdocument).unwrap_or(false)
    }

    pub fn invokable_methods(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// The handler for `name`, only if it passed the invokable-method test.
    pub fn invokable(&self, name: &str) -> Option<&MethodFn> {
        self.methods.get(name)
    }

    /// A new, unsaved record with every default evaluated now.
    pub fn blank(&self) -> Document {
        self.blank_template
            .iter()
            .map(|(name, default)| {
                let value = default
                    .as_ref()
                    .map(DefaultValue::evaluate)
                    .unwrap_or(Value::Null);
                (name.clone(), value)
            })
            .collect()
    }

    /// Make every declared top-level field present, using `null` for gaps.
    pub fn fill_missing(&self, document: &mut Document) {
        for name in self.field_names() {
            if !document.contains_key(name) {
                document.insert(name.to_string(), Value::Null);
            }
        }
    }
}

impl std::fmt::Debug for ModelDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelDescriptor")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("geo_field", &self.geo_field)
            .field("relationships", &self.relationships)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}
