//! Sequential Ability Estimation
//!
//! A scalar Kalman filter over a student's prior courses. The state `x` is the
//! student's ability offset: how many GPA points above or below the course
//! average they typically land. Each prior course contributes one measurement
//! `z = grade_points - course_average`, weighted by how typical that course's
//! average is.
//!
//! ```text
//! predict:  P <- P + Q
//! update:   K = P / (P + R / w)
//!           x <- x + K (z - x)
//!           P <- (1 - K) P
//! ```
//!
//! The estimator is a left fold over the observations: it returns the final
//! state together with a per-step history, and keeps no state between calls.

use grade_core::PriorCourse;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Course average GPA treated as "typical".
pub const REFERENCE_GPA: f64 = 3.3;

/// Ability drift between courses (std, GPA points).
pub const PROCESS_NOISE_STD: f64 = 0.05;
/// Grade noise from grading and instructor variance (std, GPA points).
pub const MEASUREMENT_NOISE_STD: f64 = 0.15;

const PRIOR_STD_WITH_GPA: f64 = 0.25;
const PRIOR_STD_WITHOUT_GPA: f64 = 0.4;

/// Uncertainty reported when no observation could be used.
pub const NO_EVIDENCE_UNCERTAINTY: f64 = 0.4;

/// Filter state. Created per request and consumed by [`AbilityEstimator`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    /// Ability offset estimate
    pub x: f64,
    /// Estimate variance
    pub p: f64,
    /// Process noise variance
    pub q: f64,
    /// Measurement noise variance
    pub r: f64,
}

impl FilterState {
    pub fn new(initial_estimate: f64, initial_std: f64) -> Self {
        Self {
            x: initial_estimate,
            p: initial_std.powi(2),
            q: PROCESS_NOISE_STD.powi(2),
            r: MEASUREMENT_NOISE_STD.powi(2),
        }
    }

    /// Prior from the student's overall GPA, or an uninformed prior when it is
    /// absent or not a finite number.
    pub fn from_overall_gpa(overall_gpa: Option<f64>) -> Self {
        match overall_gpa.filter(|g| g.is_finite()) {
            Some(gpa) => Self::new(gpa - REFERENCE_GPA, PRIOR_STD_WITH_GPA),
            None => Self::new(0.0, PRIOR_STD_WITHOUT_GPA),
        }
    }

    /// Ability is assumed stable, so only the variance grows.
    pub fn predict(self) -> Self {
        Self {
            p: self.p + self.q,
            ..self
        }
    }

    /// Incorporate one weighted measurement. Returns the new state together
    /// with the gain and innovation used.
    ///
    /// `weight` is not validated: a weight of zero yields a zero gain and a
    /// negative weight can push the gain outside `[0, 1]`.
    pub fn update(self, measurement: f64, weight: f64) -> (Self, f64, f64) {
        let gain = self.p / (self.p + self.r / weight);
        let innovation = measurement - self.x;
        let next = Self {
            x: self.x + gain * innovation,
            p: (1.0 - gain) * self.p,
            ..self
        };
        (next, gain, innovation)
    }

    pub fn std_dev(&self) -> f64 {
        self.p.sqrt()
    }
}

/// How close a course's average is to [`REFERENCE_GPA`]: 1 at the reference,
/// 0 one GPA point away, negative beyond that.
pub fn typicality(course_average: f64) -> f64 {
    1.0 - (course_average - REFERENCE_GPA).abs()
}

/// Treatment of the typicality-derived measurement weight.
///
/// `0.5 + 0.5 * typicality` leaves `[0.5, 1.0]` for courses whose average is
/// more than one point from the reference and turns negative beyond two
/// points. `Unclamped` keeps that formula as is; `Clamped` bounds the weight
/// to `[floor, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum WeightPolicy {
    #[default]
    Unclamped,
    Clamped { floor: f64 },
}

impl WeightPolicy {
    pub fn weight(&self, course_average: f64) -> f64 {
        let raw = 0.5 + 0.5 * typicality(course_average);
        match self {
            WeightPolicy::Unclamped => raw,
            WeightPolicy::Clamped { floor } => raw.clamp(*floor, 1.0),
        }
    }
}

/// One prior course reduced to a measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub course_name: String,
    /// Grade points received minus the course average
    pub measurement: f64,
    pub course_average: f64,
}

impl Observation {
    pub fn new(course_name: impl Into<String>, grade_points: f64, course_average: f64) -> Self {
        Self {
            course_name: course_name.into(),
            measurement: grade_points - course_average,
            course_average,
        }
    }
}

/// Diagnostics recorded after each update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct FilterStep {
    pub course_name: String,
    pub measurement: f64,
    pub weight: f64,
    pub kalman_gain: f64,
    pub innovation: f64,
    pub state_after: f64,
    /// NaN when a negative weight drove the variance below zero
    #[cfg_attr(feature = "openapi", schema(value_type = Option<f64>))]
    pub uncertainty_after: f64,
}

/// Final ability estimate with its explanation.
///
/// Under [`WeightPolicy::Unclamped`] a course average more than two points
/// from [`REFERENCE_GPA`] can leave a negative variance, making `uncertainty`
/// NaN. JSON encodes it as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AbilityEstimate {
    pub ability_offset: f64,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<f64>))]
    pub uncertainty: f64,
    /// Observations that went through predict/update
    pub observations: usize,
    /// Prior courses skipped because their average is unknown
    pub skipped: usize,
    pub history: Vec<FilterStep>,
}

impl AbilityEstimate {
    /// Estimate used when no prior-course evidence was supplied at all.
    pub fn no_evidence() -> Self {
        Self {
            ability_offset: 0.0,
            uncertainty: NO_EVIDENCE_UNCERTAINTY,
            observations: 0,
            skipped: 0,
            history: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AbilityEstimator {
    policy: WeightPolicy,
}

impl AbilityEstimator {
    pub fn new(policy: WeightPolicy) -> Self {
        Self { policy }
    }

    /// Fold `observations` into `initial`, in order.
    pub fn run(
        &self,
        initial: FilterState,
        observations: &[Observation],
    ) -> (FilterState, Vec<FilterStep>) {
        observations.iter().fold(
            (initial, Vec::with_capacity(observations.len())),
            |(state, mut history), obs| {
                let weight = self.policy.weight(obs.course_average);
                let (state, kalman_gain, innovation) =
                    state.predict().update(obs.measurement, weight);
                history.push(FilterStep {
                    course_name: obs.course_name.clone(),
                    measurement: obs.measurement,
                    weight,
                    kalman_gain,
                    innovation,
                    state_after: state.x,
                    uncertainty_after: state.std_dev(),
                });
                (state, history)
            },
        )
    }

    /// Estimate ability from prior courses, skipping any course whose average
    /// is not in `course_averages`.
    pub fn estimate(
        &self,
        prior_courses: &[PriorCourse],
        course_averages: &HashMap<String, f64>,
        overall_gpa: Option<f64>,
    ) -> AbilityEstimate {
        let observations: Vec<Observation> = prior_courses
            .iter()
            .filter_map(|course| {
                course_averages.get(&course.course_name).map(|avg| {
                    Observation::new(
                        course.course_name.clone(),
                        course.grade_received.grade_points(),
                        *avg,
                    )
                })
            })
            .collect();
        let skipped = prior_courses.len() - observations.len();

        let (state, history) = self.run(FilterState::from_overall_gpa(overall_gpa), &observations);

        tracing::debug!(
            observations = observations.len(),
            skipped,
            "Ability estimate computed"
        );

        let uncertainty = if observations.is_empty() {
            NO_EVIDENCE_UNCERTAINTY
        } else {
            state.std_dev()
        };

        AbilityEstimate {
            ability_offset: state.x,
            uncertainty,
            observations: observations.len(),
            skipped,
            history,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grade_core::LetterGrade;

    fn course(name: &str, grade: LetterGrade) -> PriorCourse {
        PriorCourse {
            course_name: name.to_string(),
            grade_received: grade,
        }
    }

    #[test]
    fn test_prior_initialization() {
        let informed = FilterState::from_overall_gpa(Some(3.8));
        assert!((informed.x - 0.5).abs() < 1e-12);
        assert!((informed.p - 0.0625).abs() < 1e-12);

        let uninformed = FilterState::from_overall_gpa(None);
        assert_eq!(uninformed.x, 0.0);
        assert!((uninformed.p - 0.16).abs() < 1e-12);

        assert_eq!(FilterState::from_overall_gpa(Some(f64::NAN)), uninformed);
        assert!((uninformed.q - 0.0025).abs() < 1e-12);
        assert!((uninformed.r - 0.0225).abs() < 1e-12);
    }

    #[test]
    fn test_single_observation_update() {
        let initial = FilterState::from_overall_gpa(Some(3.3));
        let predicted = initial.predict();
        assert!((predicted.p - 0.065).abs() < 1e-12);
        assert_eq!(predicted.x, initial.x);

        let (updated, gain, innovation) = predicted.update(0.4, 1.0);
        assert!((gain - 0.742857).abs() < 1e-5);
        assert!((innovation - 0.4).abs() < 1e-12);
        assert!((updated.x - 0.297143).abs() < 1e-5);
        assert!((updated.p - 0.016714).abs() < 1e-5);
    }

    #[test]
    fn test_estimate_matches_manual_filter() {
        let averages = HashMap::from([("COMPSCI 61A".to_string(), 3.3)]);
        let estimate = AbilityEstimator::default().estimate(
            &[course("COMPSCI 61A", LetterGrade::AMinus)],
            &averages,
            Some(3.3),
        );
        assert_eq!(estimate.observations, 1);
        assert_eq!(estimate.skipped, 0);
        assert!((estimate.ability_offset - 0.297143).abs() < 1e-5);
        assert!((estimate.uncertainty - 0.016714_f64.sqrt()).abs() < 1e-4);

        let step = &estimate.history[0];
        assert_eq!(step.weight, 1.0);
        assert!((step.kalman_gain - 0.742857).abs() < 1e-5);
        assert_eq!(step.state_after, estimate.ability_offset);
    }

    #[test]
    fn test_no_observations_reports_default_uncertainty() {
        let estimator = AbilityEstimator::default();

        let with_gpa = estimator.estimate(&[], &HashMap::new(), Some(3.7));
        assert!((with_gpa.ability_offset - 0.4).abs() < 1e-12);
        assert_eq!(with_gpa.uncertainty, 0.4);
        assert!(with_gpa.history.is_empty());

        let unknown = estimator.estimate(
            &[course("HISTORY 7B", LetterGrade::A), course("MATH 1A", LetterGrade::B)],
            &HashMap::new(),
            None,
        );
        assert_eq!(unknown.ability_offset, 0.0);
        assert_eq!(unknown.uncertainty, 0.4);
        assert_eq!(unknown.skipped, 2);
        assert_eq!(unknown.observations, 0);
    }

    #[test]
    fn test_unknown_courses_are_skipped() {
        let averages = HashMap::from([
            ("MATH 1A".to_string(), 3.1),
            ("DATA C8".to_string(), 3.4),
        ]);
        let estimate = AbilityEstimator::default().estimate(
            &[
                course("MATH 1A", LetterGrade::A),
                course("PHYSICS 7A", LetterGrade::C),
                course("DATA C8", LetterGrade::A),
            ],
            &averages,
            None,
        );
        assert_eq!(estimate.observations, 2);
        assert_eq!(estimate.skipped, 1);
        let names: Vec<&str> = estimate.history.iter().map(|s| s.course_name.as_str()).collect();
        assert_eq!(names, ["MATH 1A", "DATA C8"]);
        assert!(estimate.ability_offset > 0.0);
    }

    #[test]
    fn test_uncertainty_shrinks_with_evidence() {
        let averages = HashMap::from([("MATH 1A".to_string(), 3.2), ("MATH 1B".to_string(), 3.2)]);
        let estimator = AbilityEstimator::default();
        let one = estimator.estimate(&[course("MATH 1A", LetterGrade::B)], &averages, None);
        let two = estimator.estimate(
            &[course("MATH 1A", LetterGrade::B), course("MATH 1B", LetterGrade::B)],
            &averages,
            None,
        );
        assert!(two.uncertainty < one.uncertainty);
        assert!(one.uncertainty < 0.4);
    }

    #[test]
    fn test_typicality_weight() {
        let policy = WeightPolicy::Unclamped;
        assert_eq!(policy.weight(3.3), 1.0);
        assert!((policy.weight(2.8) - 0.75).abs() < 1e-12);
        assert!((policy.weight(3.8) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_unclamped_weight_goes_below_half_and_negative() {
        let policy = WeightPolicy::Unclamped;
        assert!((typicality(1.6) + 0.7).abs() < 1e-12);
        assert!((policy.weight(1.6) - 0.15).abs() < 1e-12);

        assert!((typicality(1.0) + 1.3).abs() < 1e-12);
        assert!((policy.weight(1.0) + 0.15).abs() < 1e-12);
    }

    #[test]
    fn test_negative_weight_pushes_gain_outside_unit_interval() {
        let averages = HashMap::from([("PHYSED 1".to_string(), 1.0)]);
        let estimate = AbilityEstimator::new(WeightPolicy::Unclamped).estimate(
            &[course("PHYSED 1", LetterGrade::B)],
            &averages,
            None,
        );
        let gain = estimate.history[0].kalman_gain;
        assert!(!(0.0..=1.0).contains(&gain), "gain = {gain}");
    }

    #[test]
    fn test_clamped_policy_bounds_weight_and_gain() {
        let policy = WeightPolicy::Clamped { floor: 0.1 };
        assert_eq!(policy.weight(1.0), 0.1);
        assert_eq!(policy.weight(3.3), 1.0);

        let averages = HashMap::from([("PHYSED 1".to_string(), 1.0)]);
        let estimate = AbilityEstimator::new(policy).estimate(
            &[course("PHYSED 1", LetterGrade::B)],
            &averages,
            None,
        );
        let gain = estimate.history[0].kalman_gain;
        assert!(gain > 0.0 && gain < 1.0);
    }

    #[test]
    fn test_run_is_restartable() {
        let observations = vec![
            Observation::new("MATH 1A", 3.7, 3.1),
            Observation::new("MATH 1B", 3.0, 2.9),
        ];
        let estimator = AbilityEstimator::default();
        let initial = FilterState::from_overall_gpa(Some(3.5));
        let first = estimator.run(initial, &observations);
        let second = estimator.run(initial, &observations);
        assert_eq!(first, second);
        assert_eq!(first.1.len(), 2);
    }
}
