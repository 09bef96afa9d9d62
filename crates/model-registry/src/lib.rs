//! Base GPA predictors.
//!
//! Regression models are trained elsewhere and exported as JSON descriptors.
//! The registry loads them once at startup and is read-only afterwards; share
//! it behind an `Arc`.

pub mod error;
pub mod model;
pub mod registry;

pub use error::{RegistryError, RegistryResult};
pub use model::{LinearModel, ModelMetrics, Scaler};
pub use registry::ModelRegistry;
