//! Error taxonomy shared by the generator, the translator and the handlers.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// One rejected field inside a [`ValidationError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub message: String,
    pub kind: String,
    pub path: String,
}

/// Engine-native description of a rejected write, sent back verbatim as a 400.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{}{}", .message, field_list(.errors))]
pub struct ValidationError {
    pub name: String,
    pub message: String,
    pub errors: BTreeMap<String, FieldError>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            name: "ValidationError".to_string(),
            message: message.into(),
            errors: BTreeMap::new(),
        }
    }

    pub fn required(path: &str) -> FieldError {
        FieldError {
            message: format!("Path `{path}` is required."),
            kind: "required".to_string(),
            path: path.to_string(),
        }
    }

    /// A value that collides with one already stored.
    pub fn unique(path: &str, value: &str) -> FieldError {
        FieldError {
            message: format!("Path `{path}` must be unique, `{value}` is already taken."),
            kind: "unique".to_string(),
            path: path.to_string(),
        }
    }

    pub fn with_field(mut self, path: &str, error: FieldError) -> Self {
        self.errors.insert(path.to_string(), error);
        self
    }
}

fn field_list(errors: &BTreeMap<String, FieldError>) -> String {
    if errors.is_empty() {
        String::new()
    } else {
        format!(" ({})", errors.keys().join(", "))
    }
}

/// Failures reported by a [`DocumentStore`](crate::store::DocumentStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(ValidationError),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failures while turning query parameters into a search.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("Geospatial Index Not Found")]
    GeoIndexNotFound,
    #[error("invalid coordinate '{value}' in __near")]
    InvalidCoordinate { value: String },
    #[error("__near expects longitude,latitude[,maxDistance] but got {count} values")]
    CoordinateCount { count: usize },
    #[error("invalid value '{value}' for {param}")]
    InvalidModifier { param: String, value: String },
    #[error("invalid JSON filter for field '{field}': {message}")]
    InvalidJson { field: String, message: String },
}

/// Everything a generated endpoint can fail with.
#[derive(Debug, Error)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(ValidationError),
    /// Absent, malformed or out of scope. Deliberately indistinguishable.
    #[error("not found")]
    NotFound,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("storage failure: {0}")]
    Store(anyhow::Error),
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(validation) => Self::Validation(validation),
            StoreError::Backend(backend) => Self::Store(backend),
        }
    }
}

impl Error {
    /// Map an engine failure on insert or save. Every rejected write answers 400.
    pub fn write_rejected(err: StoreError) -> Self {
        match err {
            StoreError::Validation(validation) => Self::Validation(validation),
            StoreError::Backend(backend) => Self::BadRequest(format!("{backend:#}")),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_onto_the_api_taxonomy() {
        let validation = ValidationError::new("Task validation failed")
            .with_field("description", ValidationError::required("description"));
        let err: Error = StoreError::Validation(validation.clone()).into();
        assert!(matches!(err, Error::Validation(v) if v == validation));

        let err: Error = StoreError::Backend(anyhow::anyhow!("disk full")).into();
        assert!(matches!(err, Error::Store(_)));

        let err = Error::write_rejected(StoreError::Backend(anyhow::anyhow!("disk full")));
        assert!(matches!(err, Error::BadRequest(ref message) if message == "disk full"));
    }

    #[test]
    fn validation_error_lists_fields() {
        let validation = ValidationError::new("Task validation failed")
            .with_field("description", ValidationError::required("description"));
        assert_eq!(
            validation.to_string(),
            "Task validation failed (description)"
        );
        assert_eq!(
            validation.errors["description"].message,
            "Path `description` is required."
        );
        assert_eq!(
            ValidationError::new("no fields").to_string(),
            "no fields"
        );
    }
}
