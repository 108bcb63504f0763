// Utility functions
pub mod error;
pub mod escape;
pub mod format;
pub mod pagination;

pub use error::*;
pub use escape::*;
pub use format::*;
pub use pagination::*;
