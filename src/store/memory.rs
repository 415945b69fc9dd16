use anyhow::anyhow;
use parking_lot::RwLock;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::{StoreError, StoreResult, ValidationError};
use crate::model::{
    document_id, generate_id, is_object_id, Document, FieldDef, FieldKind, Id, ModelRegistry,
    ModelSchema, ID_FIELD,
};
use crate::store::matcher::{lookup, sort_order, FilterMatcher};
use crate::store::traits::{DocumentStore, FieldUpdate, QueryOptions};

/// Process-local document engine.
///
/// Collections are kept in insertion order behind a single lock. When built
/// from a registry it applies field defaults, enforces `required` fields and
/// resolves `populate` through declared references.
#[derive(Debug, Default)]
pub struct MemoryStore {
    schemas: HashMap<String, ModelSchema>,
    collections: RwLock<HashMap<String, Vec<Document>>>,
}

impl MemoryStore {
    /// An engine without schemas: no defaults, no validation, no populate.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: &ModelRegistry) -> Self {
        Self {
            schemas: registry
                .iter()
                .map(|schema| (schema.name.clone(), schema.clone()))
                .collect(),
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored documents in `model`.
    pub fn len(&self, model: &str) -> usize {
        self.collections.read().get(model).map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self, model: &str) -> bool {
        self.len(model) == 0
    }

    /// Fetch a stored document by id without any scoping.
    pub fn get(&self, model: &str, id: &str) -> Option<Document> {
        self.collections
            .read()
            .get(model)?
            .iter()
            .find(|doc| document_id(doc) == Some(id))
            .cloned()
    }

    fn check_id(document: &Document) -> StoreResult<()> {
        match document.get(ID_FIELD) {
            Some(Value::String(id)) if is_object_id(id) => Ok(()),
            Some(other) => Err(StoreError::Validation(
                ValidationError::new(format!("Cast to ObjectId failed for value {other}"))
                    .with_field(
                        ID_FIELD,
                        crate::error::FieldError {
                            message: format!("Cast to ObjectId failed for value {other}"),
                            kind: "ObjectId".to_string(),
                            path: ID_FIELD.to_string(),
                        },
                    ),
            )),
            None => Ok(()),
        }
    }

    /// Give embedded elements ids and fill their nested defaults.
    fn prepare_elements(fields: &[FieldDef], document: &mut Document) {
        for field in fields {
            let FieldKind::Subdocuments(nested) = &field.kind else {
                continue;
            };
            let Some(Value::Array(elements)) = document.get_mut(&field.name) else {
                continue;
            };
            for element in elements.iter_mut() {
                if let Value::Object(element) = element {
                    element
                        .entry(ID_FIELD)
                        .or_insert_with(|| Value::String(generate_id()));
                    apply_defaults(nested, element);
                    Self::prepare_elements(nested, element);
                }
            }
        }
    }

    fn validate(schema: &ModelSchema, document: &Document) -> StoreResult<()> {
        let mut missing = Vec::new();
        collect_missing(&schema.fields, document, "", &mut missing);
        if missing.is_empty() {
            return Ok(());
        }
        let validation = missing.iter().fold(
            ValidationError::new(format!("{} validation failed", schema.name)),
            |err, path| err.with_field(path, ValidationError::required(path)),
        );
        Err(StoreError::Validation(validation))
    }

    fn populate(
        &self,
        collections: &HashMap<String, Vec<Document>>,
        model: &str,
        document: &mut Document,
        fields: &[String],
    ) {
        let Some(schema) = self.schemas.get(model) else {
            return;
        };
        for name in fields {
            let Some(target) = schema.get_field(name).and_then(FieldDef::referenced_model) else {
                continue;
            };
            let related = collections.get(target);
            let resolve = |id: &str| {
                related
                    .and_then(|docs| docs.iter().find(|doc| document_id(doc) == Some(id)))
                    .cloned()
                    .map(Value::Object)
            };
            let Some(value) = document.get_mut(name) else {
                continue;
            };
            *value = match &*value {
                Value::String(id) => resolve(id).unwrap_or(Value::Null),
                Value::Array(ids) => Value::Array(
                    ids.iter()
                        .filter_map(|id| id.as_str().and_then(|id| resolve(id)))
                        .collect(),
                ),
                other => other.clone(),
            };
        }
    }
}

fn apply_defaults(fields: &[FieldDef], document: &mut Document) {
    for field in fields {
        if !document.contains_key(&field.name) {
            if let Some(value) = field.initial_value() {
                document.insert(field.name.clone(), value);
            }
        }
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        _ => false,
    }
}

fn collect_missing(fields: &[FieldDef], document: &Document, prefix: &str, missing: &mut Vec<String>) {
    for field in fields {
        let path = format!("{prefix}{}", field.name);
        if field.required && is_blank(document.get(&field.name)) {
            missing.push(path.clone());
        }
        if let (FieldKind::Subdocuments(nested), Some(Value::Array(elements))) =
            (&field.kind, document.get(&field.name))
        {
            for (index, element) in elements.iter().enumerate() {
                if let Value::Object(element) = element {
                    collect_missing(nested, element, &format!("{path}.{index}."), missing);
                }
            }
        }
    }
}

fn apply_update(document: &mut Document, update: &FieldUpdate) {
    match update {
        FieldUpdate::Set { field, value } => {
            document.insert(field.clone(), value.clone());
        }
        FieldUpdate::Unset { field } => {
            document.remove(field);
        }
        FieldUpdate::AddToSet { field, value } => {
            let slot = document
                .entry(field.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            if !slot.is_array() {
                *slot = match slot.take() {
                    Value::Null => Value::Array(Vec::new()),
                    scalar => Value::Array(vec![scalar]),
                };
            }
            if let Value::Array(items) = slot {
                if !items.contains(value) {
                    items.push(value.clone());
                }
            }
        }
        FieldUpdate::Pull { field, value } => {
            if let Some(Value::Array(items)) = document.get_mut(field) {
                items.retain(|item| item != value);
            }
        }
    }
}

fn compare_on(left: &Document, right: &Document, options: &QueryOptions) -> Ordering {
    options
        .sort
        .iter()
        .map(|key| {
            let order = sort_order(lookup(left, &key.field), lookup(right, &key.field));
            if key.descending {
                order.reverse()
            } else {
                order
            }
        })
        .find(|order| *order != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    fn is_valid_id(&self, id: &str) -> bool {
        is_object_id(id)
    }

    fn generate_id(&self) -> Id {
        generate_id()
    }

    async fn find(
        &self,
        model: &str,
        filter: &Document,
        options: &QueryOptions,
    ) -> StoreResult<Vec<Document>> {
        let collections = self.collections.read();
        let mut matched: Vec<Document> = collections
            .get(model)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| FilterMatcher::matches(doc, filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some((field, target)) = FilterMatcher::near_clause(filter) {
            let distance = |doc: &Document| FilterMatcher::distance(doc, &field, target);
            matched.sort_by(|a, b| {
                distance(a)
                    .partial_cmp(&distance(b))
                    .unwrap_or(Ordering::Equal)
            });
        }
        if !options.sort.is_empty() {
            matched.sort_by(|a, b| compare_on(a, b, options));
        }

        let skip = options.skip.unwrap_or(0);
        let limit = options.limit.filter(|limit| *limit > 0).unwrap_or(usize::MAX);
        let mut page: Vec<Document> = matched.into_iter().skip(skip).take(limit).collect();

        if !options.populate.is_empty() {
            for doc in page.iter_mut() {
                self.populate(&collections, model, doc, &options.populate);
            }
        }
        Ok(page)
    }

    async fn count(&self, model: &str, filter: &Document) -> StoreResult<u64> {
        let collections = self.collections.read();
        let count = collections
            .get(model)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| FilterMatcher::matches(doc, filter))
                    .count()
            })
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn find_one(
        &self,
        model: &str,
        filter: &Document,
        populate: &[String],
    ) -> StoreResult<Option<Document>> {
        let collections = self.collections.read();
        let found = collections
            .get(model)
            .and_then(|docs| docs.iter().find(|doc| FilterMatcher::matches(doc, filter)))
            .cloned();
        Ok(found.map(|mut doc| {
            self.populate(&collections, model, &mut doc, populate);
            doc
        }))
    }

    async fn insert(&self, model: &str, mut document: Document) -> StoreResult<Document> {
        Self::check_id(&document)?;
        document
            .entry(ID_FIELD)
            .or_insert_with(|| Value::String(generate_id()));
        if let Some(schema) = self.schemas.get(model) {
            apply_defaults(&schema.fields, &mut document);
            Self::prepare_elements(&schema.fields, &mut document);
            Self::validate(schema, &document)?;
        }

        let mut collections = self.collections.write();
        let docs = collections.entry(model.to_string()).or_default();
        if let Some(id) = document_id(&document) {
            if docs.iter().any(|doc| document_id(doc) == Some(id)) {
                return Err(StoreError::Validation(
                    ValidationError::new(format!("{model} validation failed"))
                        .with_field(ID_FIELD, ValidationError::unique(ID_FIELD, id)),
                ));
            }
        }
        docs.push(document.clone());
        Ok(document)
    }

    async fn save(&self, model: &str, document: &Document) -> StoreResult<()> {
        let mut document = document.clone();
        if let Some(schema) = self.schemas.get(model) {
            Self::prepare_elements(&schema.fields, &mut document);
            Self::validate(schema, &document)?;
        }
        let id = document_id(&document)
            .ok_or_else(|| anyhow!("cannot save a {model} document without an _id"))?
            .to_string();

        let mut collections = self.collections.write();
        let slot = collections
            .get_mut(model)
            .and_then(|docs| docs.iter_mut().find(|doc| document_id(doc) == Some(&id)))
            .ok_or_else(|| anyhow!("{model} document {id} no longer exists"))?;
        *slot = document;
        Ok(())
    }

    async fn find_one_and_remove(
        &self,
        model: &str,
        filter: &Document,
    ) -> StoreResult<Option<Document>> {
        let mut collections = self.collections.write();
        let Some(docs) = collections.get_mut(model) else {
            return Ok(None);
        };
        let position = docs
            .iter()
            .position(|doc| FilterMatcher::matches(doc, filter));
        Ok(position.map(|index| docs.remove(index)))
    }

    async fn update_by_id(
        &self,
        model: &str,
        id: &str,
        update: &FieldUpdate,
    ) -> StoreResult<bool> {
        if !is_object_id(id) {
            return Err(StoreError::Backend(anyhow!(
                "Cast to ObjectId failed for value \"{id}\" at path \"_id\" for model \"{model}\""
            )));
        }
        let mut collections = self.collections.write();
        let target = collections
            .get_mut(model)
            .and_then(|docs| docs.iter_mut().find(|doc| document_id(doc) == Some(id)));
        match target {
            Some(doc) => {
                apply_update(doc, update);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
