//! Shared domain types, errors and collaborator traits for grade prediction.

pub mod error;
pub mod traits;
pub mod types;

pub use error::*;
pub use traits::*;
pub use types::*;
