use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::model::MethodDef;

/// Default for a field, either a constant or recomputed for every new record.
#[derive(Clone)]
pub enum DefaultValue {
    Static(Value),
    Computed(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl DefaultValue {
    pub fn computed<F>(producer: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        Self::Computed(Arc::new(producer))
    }

    /// Produce the value a new record receives right now.
    pub fn evaluate(&self) -> Value {
        match self {
            Self::Static(value) => value.clone(),
            Self::Computed(producer) => producer(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Ascending,
    Descending,
    /// Spherical geometry index (`2dsphere`).
    Sphere,
    /// Flat legacy coordinate index (`2d`).
    Planar,
    Text,
}

impl IndexKind {
    pub fn is_geospatial(&self) -> bool {
        matches!(self, Self::Sphere | Self::Planar)
    }
}

#[derive(Debug, Clone)]
pub enum FieldKind {
    /// Any JSON value stored as-is.
    Value,
    /// A list of plain values.
    List,
    /// Id of a single document of another model.
    Reference { model: String },
    /// Ids of many documents of another model.
    ReferenceList { model: String },
    /// Array of embedded documents, each addressable by its own `_id`.
    Subdocuments(Vec<FieldDef>),
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    pub default: Option<DefaultValue>,
    pub required: bool,
    pub index: Option<IndexKind>,
}

impl FieldDef {
    fn with_kind(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            required: false,
            index: None,
        }
    }

    pub fn value(name: impl Into<String>) -> Self {
        Self::with_kind(name, FieldKind::Value)
    }

    pub fn list(name: impl Into<String>) -> Self {
        Self::with_kind(name, FieldKind::List)
    }

    pub fn reference(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            FieldKind::Reference {
                model: model.into(),
            },
        )
    }

    pub fn reference_list(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            FieldKind::ReferenceList {
                model: model.into(),
            },
        )
    }

    pub fn subdocuments(name: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        Self::with_kind(name, FieldKind::Subdocuments(fields))
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(DefaultValue::Static(value));
        self
    }

    pub fn default_with<F>(mut self, producer: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = Some(DefaultValue::computed(producer));
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn index(mut self, kind: IndexKind) -> Self {
        self.index = Some(kind);
        self
    }

    /// Model this field points at, for both single and list references.
    pub fn referenced_model(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::Reference { model } | FieldKind::ReferenceList { model } => Some(model),
            _ => None,
        }
    }

    /// Whether the stored value is an array.
    pub fn is_array(&self) -> bool {
        matches!(
            self.kind,
            FieldKind::List | FieldKind::ReferenceList { .. } | FieldKind::Subdocuments(_)
        )
    }

    pub fn is_subdocument(&self) -> bool {
        matches!(self.kind, FieldKind::Subdocuments(_))
    }

    /// Default applied when a record is created without this field.
    pub fn initial_value(&self) -> Option<Value> {
        match (&self.default, &self.kind) {
            (Some(default), _) => Some(default.evaluate()),
            (None, FieldKind::Subdocuments(_)) => Some(Value::Array(Vec::new())),
            (None, _) => None,
        }
    }
}

/// Declared shape of a model as the storage layer knows it.
///
/// Schemas are assembled with the builder methods and handed to a
/// [`ModelRegistry`](crate::model::ModelRegistry) once at startup.
#[derive(Debug, Clone)]
pub struct ModelSchema {
    pub name: String,
    pub fields: Vec<FieldDef>,
    /// Compound index declarations, each an ordered list of `(field, kind)`.
    pub indexes: Vec<Vec<(String, IndexKind)>>,
    pub methods: Vec<MethodDef>,
}

impl ModelSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            indexes: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn index(mut self, keys: Vec<(&str, IndexKind)>) -> Self {
        self.indexes.push(
            keys.into_iter()
                .map(|(field, kind)| (field.to_string(), kind))
                .collect(),
        );
        self
    }

    pub fn method(mut self, method: MethodDef) -> Self {
        self.methods.push(method);
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }
}
