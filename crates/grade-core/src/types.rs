use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::PredictionError;

/// Letter grade a student can report for a prior course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum LetterGrade {
    #[serde(rename = "A+")]
    APlus,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "A-")]
    AMinus,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "B-")]
    BMinus,
    #[serde(rename = "C+")]
    CPlus,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "C-")]
    CMinus,
    #[serde(rename = "D")]
    D,
    #[serde(rename = "F")]
    F,
}

impl LetterGrade {
    pub const ALL: [LetterGrade; 11] = [
        LetterGrade::APlus,
        LetterGrade::A,
        LetterGrade::AMinus,
        LetterGrade::BPlus,
        LetterGrade::B,
        LetterGrade::BMinus,
        LetterGrade::CPlus,
        LetterGrade::C,
        LetterGrade::CMinus,
        LetterGrade::D,
        LetterGrade::F,
    ];

    /// Grade points on the 4.0 scale (A+ is capped at 4.0).
    pub fn grade_points(&self) -> f64 {
        match self {
            LetterGrade::APlus | LetterGrade::A => 4.0,
            LetterGrade::AMinus => 3.7,
            LetterGrade::BPlus => 3.3,
            LetterGrade::B => 3.0,
            LetterGrade::BMinus => 2.7,
            LetterGrade::CPlus => 2.3,
            LetterGrade::C => 2.0,
            LetterGrade::CMinus => 1.7,
            LetterGrade::D => 1.0,
            LetterGrade::F => 0.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LetterGrade::APlus => "A+",
            LetterGrade::A => "A",
            LetterGrade::AMinus => "A-",
            LetterGrade::BPlus => "B+",
            LetterGrade::B => "B",
            LetterGrade::BMinus => "B-",
            LetterGrade::CPlus => "C+",
            LetterGrade::C => "C",
            LetterGrade::CMinus => "C-",
            LetterGrade::D => "D",
            LetterGrade::F => "F",
        }
    }
}

impl fmt::Display for LetterGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LetterGrade {
    type Err = PredictionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LetterGrade::ALL
            .iter()
            .copied()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| {
                PredictionError::InvalidGrade(format!(
                    "grade_received must be one of A+, A, A-, B+, B, B-, C+, C, C-, D, F (got {s:?})"
                ))
            })
    }
}

/// Output grade band with its half-open GPA interval.
///
/// `A` is the only closed interval, `[3.85, 4.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GradeBand {
    A,
    AMinus,
    BPlus,
    B,
    BMinus,
    CPlus,
    C,
    CMinus,
    D,
    F,
}

impl GradeBand {
    /// Bands from best to worst.
    pub const ALL: [GradeBand; 10] = [
        GradeBand::A,
        GradeBand::AMinus,
        GradeBand::BPlus,
        GradeBand::B,
        GradeBand::BMinus,
        GradeBand::CPlus,
        GradeBand::C,
        GradeBand::CMinus,
        GradeBand::D,
        GradeBand::F,
    ];

    /// `(lower, upper)` GPA bounds of the band.
    pub fn bounds(&self) -> (f64, f64) {
        match self {
            GradeBand::A => (3.85, 4.0),
            GradeBand::AMinus => (3.7, 3.85),
            GradeBand::BPlus => (3.3, 3.7),
            GradeBand::B => (3.0, 3.3),
            GradeBand::BMinus => (2.7, 3.0),
            GradeBand::CPlus => (2.3, 2.7),
            GradeBand::C => (2.0, 2.3),
            GradeBand::CMinus => (1.7, 2.0),
            GradeBand::D => (1.0, 1.7),
            GradeBand::F => (0.0, 1.0),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GradeBand::A => "A",
            GradeBand::AMinus => "A-",
            GradeBand::BPlus => "B+",
            GradeBand::B => "B",
            GradeBand::BMinus => "B-",
            GradeBand::CPlus => "C+",
            GradeBand::C => "C",
            GradeBand::CMinus => "C-",
            GradeBand::D => "D",
            GradeBand::F => "F",
        }
    }
}

/// Probability of each grade band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct GradeDistribution {
    #[serde(rename = "A")]
    pub a: f64,
    #[serde(rename = "A-")]
    pub a_minus: f64,
    #[serde(rename = "B+")]
    pub b_plus: f64,
    #[serde(rename = "B")]
    pub b: f64,
    #[serde(rename = "B-")]
    pub b_minus: f64,
    #[serde(rename = "C+")]
    pub c_plus: f64,
    #[serde(rename = "C")]
    pub c: f64,
    #[serde(rename = "C-")]
    pub c_minus: f64,
    #[serde(rename = "D")]
    pub d: f64,
    #[serde(rename = "F")]
    pub f: f64,
}

impl GradeDistribution {
    pub fn get(&self, band: GradeBand) -> f64 {
        match band {
            GradeBand::A => self.a,
            GradeBand::AMinus => self.a_minus,
            GradeBand::BPlus => self.b_plus,
            GradeBand::B => self.b,
            GradeBand::BMinus => self.b_minus,
            GradeBand::CPlus => self.c_plus,
            GradeBand::C => self.c,
            GradeBand::CMinus => self.c_minus,
            GradeBand::D => self.d,
            GradeBand::F => self.f,
        }
    }

    pub fn set(&mut self, band: GradeBand, probability: f64) {
        let slot = match band {
            GradeBand::A => &mut self.a,
            GradeBand::AMinus => &mut self.a_minus,
            GradeBand::BPlus => &mut self.b_plus,
            GradeBand::B => &mut self.b,
            GradeBand::BMinus => &mut self.b_minus,
            GradeBand::CPlus => &mut self.c_plus,
            GradeBand::C => &mut self.c,
            GradeBand::CMinus => &mut self.c_minus,
            GradeBand::D => &mut self.d,
            GradeBand::F => &mut self.f,
        };
        *slot = probability;
    }

    /// Bands paired with their probabilities, best grade first.
    pub fn iter(&self) -> impl Iterator<Item = (GradeBand, f64)> + '_ {
        GradeBand::ALL.iter().map(move |band| (*band, self.get(*band)))
    }

    pub fn total(&self) -> f64 {
        self.iter().map(|(_, p)| p).sum()
    }

    /// True when every band is zero, i.e. the mapper could not normalize.
    pub fn is_degenerate(&self) -> bool {
        self.iter().all(|(_, p)| p == 0.0)
    }

    /// Band with the highest probability.
    pub fn most_likely(&self) -> Option<GradeBand> {
        if self.is_degenerate() {
            return None;
        }
        self.iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(band, _)| band)
    }
}

/// A course the student already took and the grade received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PriorCourse {
    /// Course name, e.g. "COMPSCI 61A"
    pub course_name: String,
    pub grade_received: LetterGrade,
}

/// Optional, coarse-grained academic context supplied by the student.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UserContext {
    #[serde(default)]
    pub prior_courses: Option<Vec<PriorCourse>>,
    #[serde(default)]
    pub avg_gpa: Option<f64>,
    #[serde(default)]
    pub units_this_semester: Option<u32>,
    #[serde(default)]
    pub hours_per_week_available: Option<u32>,
    #[serde(default)]
    pub comfort_level: Option<u8>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl UserContext {
    pub const MAX_NOTES_CHARS: usize = 1000;

    /// Range checks applied at the request boundary.
    pub fn validate(&self) -> Result<(), PredictionError> {
        if let Some(gpa) = self.avg_gpa {
            if !(0.0..=4.0).contains(&gpa) {
                return Err(PredictionError::InvalidInput(format!(
                    "avg_gpa must be within [0.0, 4.0] (got {gpa})"
                )));
            }
        }
        if let Some(units) = self.units_this_semester {
            if units > 35 {
                return Err(PredictionError::InvalidInput(format!(
                    "units_this_semester must be within [0, 35] (got {units})"
                )));
            }
        }
        if let Some(hours) = self.hours_per_week_available {
            if hours > 80 {
                return Err(PredictionError::InvalidInput(format!(
                    "hours_per_week_available must be within [0, 80] (got {hours})"
                )));
            }
        }
        if let Some(comfort) = self.comfort_level {
            if !(1..=5).contains(&comfort) {
                return Err(PredictionError::InvalidInput(format!(
                    "comfort_level must be within [1, 5] (got {comfort})"
                )));
            }
        }
        if let Some(notes) = &self.notes {
            if notes.chars().count() > Self::MAX_NOTES_CHARS {
                return Err(PredictionError::InvalidInput(format!(
                    "notes must be at most {} characters",
                    Self::MAX_NOTES_CHARS
                )));
            }
        }
        Ok(())
    }

    /// Prior courses, treating `None` as an empty list.
    pub fn prior_courses(&self) -> &[PriorCourse] {
        self.prior_courses.as_deref().unwrap_or(&[])
    }
}

/// Which regression model produces the base prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    #[default]
    GradeDistribution,
    Full,
    Personalized,
}

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::GradeDistribution => "grade_distribution",
            ModelType::Full => "full",
            ModelType::Personalized => "personalized",
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = PredictionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "grade_distribution" => Ok(ModelType::GradeDistribution),
            "full" => Ok(ModelType::Full),
            "personalized" => Ok(ModelType::Personalized),
            other => Err(PredictionError::InvalidModelType(other.to_string())),
        }
    }
}

/// Numeric course features keyed by name. Null database values are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(transparent)]
pub struct CourseFeatures(pub BTreeMap<String, f64>);

impl CourseFeatures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Option<f64>) {
        if let Some(v) = value {
            self.0.insert(name.into(), v);
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

/// Metadata describing a loaded regression model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ModelInfo {
    pub model_type: ModelType,
    pub model_name: String,
    pub description: Option<String>,
    pub mae: Option<f64>,
    pub rmse: Option<f64>,
    pub r2: Option<f64>,
    pub features_used: Vec<String>,
    pub num_features: usize,
}

/// Output of the external point predictor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BasePrediction {
    /// Predicted course GPA, clipped to [0, 4]
    pub gpa: f64,
    /// Standard deviation hint derived from the model's stored error metric
    pub std_hint: f64,
    pub confidence_interval: ConfidenceInterval,
    pub model_info: ModelInfo,
}

/// Context factors extracted from free-form student notes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct NoteAnalysis {
    pub health_impact: Option<String>,
    pub external_commitments: Option<String>,
    pub motivation: Option<String>,
    pub relevant_experience: Option<String>,
    pub support_system: Option<String>,
    pub resource_access: Option<String>,
    /// GPA modifier, always within [-0.2, 0.2]
    pub confidence_adjustment: f64,
    pub reasoning: String,
    pub llm_used: bool,
}

impl NoteAnalysis {
    pub const MAX_ADJUSTMENT: f64 = 0.2;

    /// Neutral analysis used whenever notes were not (or could not be) analyzed.
    pub fn neutral(llm_used: bool) -> Self {
        Self {
            health_impact: None,
            external_commitments: None,
            motivation: None,
            relevant_experience: None,
            support_system: None,
            resource_access: None,
            confidence_adjustment: 0.0,
            reasoning: if llm_used {
                "Unable to analyze context".to_string()
            } else {
                "No additional context analyzed".to_string()
            },
            llm_used,
        }
    }

    /// Adjustment clamped into the accepted range; non-finite values count as zero.
    pub fn bounded_adjustment(&self) -> f64 {
        if self.confidence_adjustment.is_finite() {
            self.confidence_adjustment
                .clamp(-Self::MAX_ADJUSTMENT, Self::MAX_ADJUSTMENT)
        } else {
            0.0
        }
    }
}
