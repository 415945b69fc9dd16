pub mod common;
pub mod context;
pub mod descriptor;
pub mod method;
pub mod registry;
pub mod schema;

pub use common::*;
pub use context::*;
pub use descriptor::*;
pub use method::*;
pub use registry::*;
pub use schema::*;
