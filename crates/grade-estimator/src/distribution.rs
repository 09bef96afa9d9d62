//! Grade-boundary mapping
//!
//! Converts a continuous GPA estimate, modelled as Normal(mean, std), into
//! the probability of landing in each letter-grade band.

use grade_core::{GradeBand, GradeDistribution};
use statrs::distribution::{ContinuousCDF, Normal};

/// Smallest standard deviation the mapper will use.
pub const MIN_DISTRIBUTION_STD: f64 = 0.15;

/// Map `(mean, std)` on the 4.0 scale to a normalized grade distribution.
///
/// `std` is floored at [`MIN_DISTRIBUTION_STD`] and `mean` clipped to `[0, 4]`.
/// Band masses are CDF differences, renormalized so they sum to 1. When the
/// raw mass is zero (or the inputs are not finite) an all-zero distribution is
/// returned instead of dividing by zero.
pub fn gpa_to_grade_distribution(mean: f64, std: f64) -> GradeDistribution {
    let std = std.max(MIN_DISTRIBUTION_STD);
    let mean = mean.clamp(0.0, 4.0);

    let normal = match Normal::new(mean, std) {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!("Cannot build grade distribution: {}", e);
            return GradeDistribution::default();
        }
    };

    let mut raw = GradeDistribution::default();
    for band in GradeBand::ALL {
        let (lower, upper) = band.bounds();
        raw.set(band, normal.cdf(upper) - normal.cdf(lower));
    }

    let total = raw.total();
    if !(total > 0.0) || !total.is_finite() {
        tracing::warn!("Grade distribution has zero total mass; returning empty distribution");
        return GradeDistribution::default();
    }

    let mut normalized = GradeDistribution::default();
    for (band, mass) in raw.iter() {
        normalized.set(band, (mass / total).max(0.0));
    }
    normalized
}

/// Probability of receiving `band` or better.
pub fn probability_at_least(distribution: &GradeDistribution, band: GradeBand) -> f64 {
    let (floor, _) = band.bounds();
    distribution
        .iter()
        .filter(|(b, _)| b.bounds().0 >= floor)
        .map(|(_, p)| p)
        .sum()
}
