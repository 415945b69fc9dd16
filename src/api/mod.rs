pub mod context;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod subdoc_handlers;

pub use error::ErrorResponse;
pub use handlers::*;
pub use routes::*;
