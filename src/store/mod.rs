pub mod matcher;
pub mod memory;
pub mod traits;

pub use memory::*;
pub use traits::*;
