use serde_json::Value;

use crate::error::StoreResult;
use crate::model::{Document, Id};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

/// Modifiers applied to a `find`, in the order sort → skip → limit → populate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub sort: Vec<SortKey>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
    pub populate: Vec<String>,
}

/// A single-field change applied to one document by id.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Set { field: String, value: Value },
    AddToSet { field: String, value: Value },
    Unset { field: String },
    Pull { field: String, value: Value },
}

impl FieldUpdate {
    pub fn field(&self) -> &str {
        match self {
            Self::Set { field, .. }
            | Self::AddToSet { field, .. }
            | Self::Unset { field }
            | Self::Pull { field, .. } => field,
        }
    }
}

/// Storage primitives the generated endpoints are written against.
///
/// Filters are documents in the usual `{field: value}` / `{field: {"$op": ..}}`
/// shape, produced by the query translator and the scope enforcer.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Whether `id` is well formed for this engine.
    fn is_valid_id(&self, id: &str) -> bool;
    /// Fresh id for a new document or embedded element.
    fn generate_id(&self) -> Id;

    async fn find(
        &self,
        model: &str,
        filter: &Document,
        options: &QueryOptions,
    ) -> StoreResult<Vec<Document>>;
    async fn count(&self, model: &str, filter: &Document) -> StoreResult<u64>;
    async fn find_one(
        &self,
        model: &str,
        filter: &Document,
        populate: &[String],
    ) -> StoreResult<Option<Document>>;
    /// Validate, apply defaults and store a new document, returning it as stored.
    async fn insert(&self, model: &str, document: Document) -> StoreResult<Document>;
    /// Validate and replace the stored document with the same `_id`.
    async fn save(&self, model: &str, document: &Document) -> StoreResult<()>;
    async fn find_one_and_remove(
        &self,
        model: &str,
        filter: &Document,
    ) -> StoreResult<Option<Document>>;
    /// Apply `update` to the document `id`. `Ok(false)` when there is no such document.
    async fn update_by_id(&self, model: &str, id: &str, update: &FieldUpdate)
        -> StoreResult<bool>;
}
