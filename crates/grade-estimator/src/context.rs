//! Context Feature Extraction
//!
//! Reduces optional, self-reported academic context to coarse bounded
//! features. Only bins and counts are kept; course names and exact values
//! never leave this function.

use grade_core::UserContext;
use serde::{Deserialize, Serialize};

/// Number of optional fields that contribute to `context_quality`.
const CONTEXT_FIELDS: f64 = 5.0;

/// Coarse features derived from [`UserContext`]. Every field has a default,
/// so extraction cannot fail.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ContextFeatures {
    /// 1, 2, 3 or 4 by overall GPA; 2.5 when unknown
    pub gpa_quartile: f64,
    /// 0.0 light, 0.5 normal, 1.0 heavy
    pub workload: f64,
    /// Study hours available, as a fraction of 40
    pub time_available: f64,
    /// Comfort level 1-5 mapped to [0, 1]
    pub comfort: f64,
    /// Number of prior courses, as a fraction of 10
    pub prior_courses_count: f64,
    /// Fraction of the five optional fields that were supplied
    pub context_quality: f64,
}

impl Default for ContextFeatures {
    fn default() -> Self {
        Self {
            gpa_quartile: 2.5,
            workload: 0.5,
            time_available: 0.5,
            comfort: 0.5,
            prior_courses_count: 0.0,
            context_quality: 0.0,
        }
    }
}

fn gpa_quartile(avg_gpa: f64) -> f64 {
    if avg_gpa >= 3.5 {
        4.0
    } else if avg_gpa >= 3.0 {
        3.0
    } else if avg_gpa >= 2.5 {
        2.0
    } else {
        1.0
    }
}

fn workload(units: u32) -> f64 {
    if units >= 18 {
        1.0
    } else if units >= 13 {
        0.5
    } else {
        0.0
    }
}

/// Extract bounded features from whatever subset of context was supplied.
pub fn extract_context_features(context: &UserContext) -> ContextFeatures {
    let defaults = ContextFeatures::default();
    let prior = context.prior_courses();

    let supplied = [
        context.avg_gpa.is_some(),
        context.units_this_semester.is_some(),
        context.hours_per_week_available.is_some(),
        context.comfort_level.is_some(),
        !prior.is_empty(),
    ]
    .iter()
    .filter(|&&present| present)
    .count();

    ContextFeatures {
        gpa_quartile: context.avg_gpa.map(gpa_quartile).unwrap_or(defaults.gpa_quartile),
        workload: context.units_this_semester.map(workload).unwrap_or(defaults.workload),
        time_available: context
            .hours_per_week_available
            .map(|h| (h as f64 / 40.0).min(1.0))
            .unwrap_or(defaults.time_available),
        comfort: context
            .comfort_level
            .map(|c| (c as f64 - 1.0) / 4.0)
            .unwrap_or(defaults.comfort),
        prior_courses_count: (prior.len() as f64 / 10.0).min(1.0),
        context_quality: supplied as f64 / CONTEXT_FIELDS,
    }
}
