//! Personalized Grade Estimation
//!
//! Numeric core for turning a course-level GPA prediction into a personalized
//! letter-grade distribution. Everything here is synchronous and free of I/O,
//! so it can be called from blocking or async code alike.

pub mod context;
pub mod distribution;
pub mod kalman;
pub mod uncertainty;

pub use context::{extract_context_features, ContextFeatures};
pub use distribution::{gpa_to_grade_distribution, MIN_DISTRIBUTION_STD};
pub use kalman::{
    typicality, AbilityEstimate, AbilityEstimator, FilterState, FilterStep, Observation,
    WeightPolicy, REFERENCE_GPA,
};
pub use uncertainty::{
    adjust_with_ability, adjust_with_context, context_only_std, kalman_informed_std,
    Adjustment, MeanAdjustments, MIN_COMBINED_STD,
};
