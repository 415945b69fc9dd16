pub mod introspect;
pub mod invoke;
pub mod pluralize;
pub mod query;
pub mod relate;
pub mod scope;

pub use introspect::*;
pub use invoke::*;
pub use pluralize::*;
pub use query::*;
pub use relate::*;
pub use scope::*;
