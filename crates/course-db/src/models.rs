use serde::{Deserialize, Serialize};

/// Distribution-shape features shown when browsing courses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CourseFeatureSummary {
    pub grade_entropy: Option<f64>,
    pub grade_skewness: Option<f64>,
    pub pct_a_range: Option<f64>,
    pub pct_passing: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CourseSummary {
    pub course_id: i64,
    pub subject: String,
    pub number: String,
    pub full_name: String,
    pub avg_gpa: Option<f64>,
    pub total_students: Option<i64>,
    #[sqlx(flatten)]
    pub features: CourseFeatureSummary,
    pub has_grading_structure: bool,
}

/// Share of students that received one letter grade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct GradeShare {
    pub letter_grade: String,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct GradingStructure {
    pub pct_exams: Option<f64>,
    pub pct_projects: Option<f64>,
    pub pct_homework: Option<f64>,
    pub pct_participation: Option<f64>,
    pub pct_other: Option<f64>,
    pub num_exams: Option<i64>,
    pub num_projects: Option<i64>,
    pub num_homeworks: Option<i64>,
    pub has_final_exam: Option<bool>,
    pub notes: Option<String>,
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CourseDetail {
    pub course_id: i64,
    pub subject: String,
    pub number: String,
    pub full_name: String,
    pub avg_gpa: Option<f64>,
    pub total_students: Option<i64>,
    pub grade_entropy: Option<f64>,
    pub grade_skewness: Option<f64>,
    pub pct_a_range: Option<f64>,
    pub pct_passing: Option<f64>,
    /// Ordered from A+ down to F
    pub grade_distribution: Vec<GradeShare>,
    pub grading_structure: Option<GradingStructure>,
}

/// Identity of a course attached to prediction responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CourseInfo {
    pub course_id: i64,
    pub subject: String,
    pub number: String,
    pub full_name: String,
    pub avg_gpa: Option<f64>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CourseRow {
    pub course_id: i64,
    pub subject: String,
    pub number: String,
    pub full_name: String,
    pub avg_gpa: Option<f64>,
    pub total_students: Option<i64>,
    #[sqlx(flatten)]
    pub features: CourseFeatureSummary,
}

/// Raw model inputs; booleans and counts are cast to REAL in SQL.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeatureRow {
    pub grade_entropy: Option<f64>,
    pub grade_skewness: Option<f64>,
    pub pct_a_range: Option<f64>,
    pub pct_passing: Option<f64>,
    pub exam_heavy: Option<f64>,
    pub project_heavy: Option<f64>,
    pub has_projects: Option<f64>,
    pub is_theory_course: Option<f64>,
    pub total_assessments: Option<f64>,
    pub pct_exams: Option<f64>,
    pub pct_projects: Option<f64>,
    pub pct_homework: Option<f64>,
    pub is_upper_div: f64,
}
