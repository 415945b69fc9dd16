pub mod api;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod store;

// Export API types
pub use api::{generate_api, ApiOptions, GeneratedApi, Resource};

// Export error types
pub use error::{Error, QueryError, StoreError, ValidationError};

// Export logic types
pub use logic::{RelationshipQueue, ScopeRule};

// Export all model types
pub use model::*;

// Export store types
pub use store::{DocumentStore, MemoryStore};
