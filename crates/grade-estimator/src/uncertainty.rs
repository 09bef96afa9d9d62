//! Uncertainty Combination
//!
//! Merges the base model's uncertainty with what is known about the student.
//! Two paths exist:
//!
//! - context-only: interpolates between a conservative ceiling and a floor
//!   using how much context the student supplied;
//! - ability-informed: treats base and ability uncertainty as independent and
//!   adds their variances.

use grade_core::UserContext;
use serde::{Deserialize, Serialize};

use crate::context::ContextFeatures;

/// Floor on the ability-informed standard deviation.
pub const MIN_COMBINED_STD: f64 = 0.12;

const CONTEXT_STD_CEILING: f64 = 0.25;
const CONTEXT_STD_FLOOR: f64 = 0.15;
const MAX_CONTEXT_ADJUSTMENT: f64 = 0.3;

const WORKLOAD_PENALTY: f64 = -0.05;
const WORKLOAD_BONUS: f64 = 0.05;
const COMFORT_STEP: f64 = 0.025;

/// Final mean and standard deviation on the 4.0 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Adjustment {
    pub adjusted_mean: f64,
    pub adjusted_std: f64,
}

/// Context-only standard deviation.
///
/// Quality 0 gives `max(1.5 * base_std, 0.25)`, quality 1 gives
/// `max(base_std, 0.15)`, linear in between.
pub fn context_only_std(base_std: f64, context_quality: f64) -> f64 {
    let ceiling = (base_std * 1.5).max(CONTEXT_STD_CEILING);
    let floor = base_std.max(CONTEXT_STD_FLOOR);
    ceiling - (ceiling - floor) * context_quality
}

/// Ability-informed standard deviation, floored at [`MIN_COMBINED_STD`].
pub fn kalman_informed_std(base_std: f64, ability_uncertainty: f64) -> f64 {
    (base_std.powi(2) + ability_uncertainty.powi(2))
        .sqrt()
        .max(MIN_COMBINED_STD)
}

/// Small additive terms applied on top of the ability offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct MeanAdjustments {
    pub workload: f64,
    pub comfort: f64,
    /// Bounded adjustment from note analysis
    pub notes: f64,
}

impl MeanAdjustments {
    /// Workload and comfort terms from the student's context.
    ///
    /// The workload term needs both units and hours; the ratio uses at least
    /// one hour so a zero-hour answer does not divide by zero.
    pub fn from_context(context: &UserContext) -> Self {
        let workload = match (context.units_this_semester, context.hours_per_week_available) {
            (Some(units), Some(hours)) => {
                let ratio = units as f64 / (hours as f64).max(1.0);
                if ratio > 1.0 {
                    WORKLOAD_PENALTY
                } else if ratio < 0.6 {
                    WORKLOAD_BONUS
                } else {
                    0.0
                }
            }
            _ => 0.0,
        };

        let comfort = context
            .comfort_level
            .map(|c| (c as f64 - 3.0) * COMFORT_STEP)
            .unwrap_or(0.0);

        Self {
            workload,
            comfort,
            notes: 0.0,
        }
    }

    pub fn with_notes(mut self, adjustment: f64) -> Self {
        self.notes = adjustment;
        self
    }

    pub fn total(&self) -> f64 {
        self.workload + self.comfort + self.notes
    }
}

/// Ability-informed adjustment used by personalized predictions.
pub fn adjust_with_ability(
    base_gpa: f64,
    base_std: f64,
    ability_offset: f64,
    ability_uncertainty: f64,
    adjustments: &MeanAdjustments,
) -> Adjustment {
    let adjusted_mean = (base_gpa + ability_offset + adjustments.total()).clamp(0.0, 4.0);
    Adjustment {
        adjusted_mean,
        adjusted_std: kalman_informed_std(base_std, ability_uncertainty),
    }
}

/// Heuristic adjustment from context features alone, without prior-course
/// evidence. The combined shift is limited to +/-0.3 GPA points.
pub fn adjust_with_context(
    base_gpa: f64,
    base_std: f64,
    features: &ContextFeatures,
    note_adjustment: f64,
) -> Adjustment {
    let gpa_factor = (features.gpa_quartile - 2.5) / 10.0;
    let workload_factor = -features.workload * 0.1;
    let time_factor = (features.time_available - 0.5) * 0.1;
    let comfort_factor = (features.comfort - 0.5) * 0.1;

    let shift = (gpa_factor + workload_factor + time_factor + comfort_factor)
        .clamp(-MAX_CONTEXT_ADJUSTMENT, MAX_CONTEXT_ADJUSTMENT);

    Adjustment {
        adjusted_mean: (base_gpa + shift + note_adjustment).clamp(0.0, 4.0),
        adjusted_std: context_only_std(base_std, features.context_quality),
    }
}
