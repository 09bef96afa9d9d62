//! Prediction Routes
//!
//! Course-level predictions from the regression models and personalized
//! grade distributions. Personal inputs in requests are used in memory only.

use axum::{extract::State, http::StatusCode, routing::{get, post}, Json, Router};
use course_db::CourseInfo;
use grade_core::{
    BasePredictor, ConfidenceInterval, CourseFeatures, GradeDistribution, ModelInfo, ModelType,
    NoteAnalysis, PredictionError, UserContext,
};
use grade_estimator::AbilityEstimate;
use prediction_orchestrator::PersonalizationStrategy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{ApiResponse, AppError, AppState};

const MAX_BATCH_SIZE: usize = 50;

const CONFIDENCE_NOTE: &str =
    "This is a statistical estimate based on historical patterns, not an individual outcome.";
const PRIVACY_NOTE: &str = "Personal inputs are processed in-memory only and are not retained.";

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct PredictRequest {
    pub course_id: i64,
    #[serde(default)]
    pub model_type: ModelType,
    /// Required when `model_type` is `personalized`
    pub user_context: Option<UserContext>,
    #[serde(default)]
    pub strategy: PersonalizationStrategy,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct BatchPredictRequest {
    pub course_ids: Vec<i64>,
    #[serde(default)]
    pub model_type: ModelType,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PredictionSummary {
    pub predicted_gpa: f64,
    pub actual_gpa: Option<f64>,
    /// Predicted minus actual
    pub error: Option<f64>,
    pub confidence_interval: ConfidenceInterval,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PredictResponse {
    pub prediction: PredictionSummary,
    pub model_info: ModelInfo,
    pub input_features: BTreeMap<String, f64>,
    pub course: CourseInfo,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PersonalizedPrediction {
    pub course_id: i64,
    pub model_type: ModelType,
    pub strategy: PersonalizationStrategy,
    pub predicted_gpa_mean: f64,
    pub predicted_gpa_std: f64,
    pub grade_distribution: GradeDistribution,
    pub ability: AbilityEstimate,
    pub note_analysis: Option<NoteAnalysis>,
    pub confidence_note: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PrivacyInfo {
    pub stored: bool,
    pub logged: bool,
    pub note: String,
}

impl Default for PrivacyInfo {
    fn default() -> Self {
        Self {
            stored: false,
            logged: false,
            note: PRIVACY_NOTE.to_string(),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PersonalizedPredictResponse {
    pub prediction: PersonalizedPrediction,
    pub privacy: PrivacyInfo,
    pub course: CourseInfo,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(untagged)]
pub enum PredictOutcome {
    Course(PredictResponse),
    Personalized(PersonalizedPredictResponse),
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct BatchSummary {
    pub total_courses: usize,
    pub mean_predicted_gpa: f64,
    pub min_predicted_gpa: f64,
    pub max_predicted_gpa: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_actual_gpa: Option<f64>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct BatchPredictResponse {
    pub predictions: Vec<PredictResponse>,
    pub summary: BatchSummary,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
}

pub fn prediction_routes() -> Router<AppState> {
    Router::new()
        .route("/predict", post(predict))
        .route("/predict/batch", post(predict_batch))
        .route("/models", get(list_models))
}

/// Course features and identity, or `CourseNotFound` if either is missing.
async fn load_course(
    state: &AppState,
    course_id: i64,
) -> Result<(CourseFeatures, CourseInfo), AppError> {
    if course_id < 1 {
        return Err(AppError::bad_request("course_id must be a positive integer"));
    }

    let features = state
        .db
        .course_features(course_id)
        .await?
        .ok_or(PredictionError::CourseNotFound(course_id))?;
    let course = state
        .db
        .course_info(course_id)
        .await?
        .ok_or(PredictionError::CourseNotFound(course_id))?;

    Ok((features, course))
}

async fn course_prediction(
    state: &AppState,
    course_id: i64,
    model_type: ModelType,
) -> Result<PredictResponse, AppError> {
    let (features, course) = load_course(state, course_id).await?;

    if model_type == ModelType::Full && !features.contains("pct_exams") {
        return Err(AppError::bad_request(format!(
            "Course {} does not have grading structure data. Please use model_type='grade_distribution' instead.",
            course.full_name
        )));
    }

    let base = state.registry.predict(model_type, &features).await?;

    let actual_gpa = course.avg_gpa;
    let input_features = base
        .model_info
        .features_used
        .iter()
        .filter_map(|name| features.get(name).map(|v| (name.clone(), v)))
        .collect();

    Ok(PredictResponse {
        prediction: PredictionSummary {
            predicted_gpa: base.gpa,
            actual_gpa,
            error: actual_gpa.map(|actual| base.gpa - actual),
            confidence_interval: base.confidence_interval,
        },
        model_info: base.model_info,
        input_features,
        course,
    })
}

async fn personalized_prediction(
    state: &AppState,
    course_id: i64,
    context: &UserContext,
    strategy: PersonalizationStrategy,
) -> Result<PersonalizedPredictResponse, AppError> {
    let (features, course) = load_course(state, course_id).await?;

    let result = state
        .orchestrator
        .predict_personalized(&course.full_name, &features, context, strategy)
        .await?;

    Ok(PersonalizedPredictResponse {
        prediction: PersonalizedPrediction {
            course_id,
            model_type: ModelType::Personalized,
            strategy: result.strategy,
            predicted_gpa_mean: result.adjusted_mean,
            predicted_gpa_std: result.adjusted_std,
            grade_distribution: result.grade_distribution,
            ability: result.ability,
            note_analysis: result.note_analysis,
            confidence_note: CONFIDENCE_NOTE.to_string(),
        },
        privacy: PrivacyInfo::default(),
        course,
    })
}

/// Predict a course GPA, or a personalized grade distribution
#[utoipa::path(
    post,
    path = "/predict",
    request_body = PredictRequest,
    responses(
        (status = 200, description = "Course or personalized prediction", body = PredictOutcome),
        (status = 400, description = "Unknown course, unusable model or invalid context"),
        (status = 422, description = "Malformed request body")
    ),
    tag = "predictions"
)]
pub async fn predict(
    State(state): State<AppState>,
    Json(req): Json<PredictRequest>,
) -> Result<Json<ApiResponse<PredictOutcome>>, AppError> {
    let outcome = match req.model_type {
        ModelType::Personalized => {
            let context = req.user_context.as_ref().ok_or_else(|| {
                AppError::bad_request("user_context is required for personalized predictions")
            })?;
            PredictOutcome::Personalized(
                personalized_prediction(&state, req.course_id, context, req.strategy).await?,
            )
        }
        model_type => {
            PredictOutcome::Course(course_prediction(&state, req.course_id, model_type).await?)
        }
    };

    Ok(Json(ApiResponse::success(outcome)))
}

/// Predict several courses at once; courses that cannot be predicted are skipped
#[utoipa::path(
    post,
    path = "/predict/batch",
    request_body = BatchPredictRequest,
    responses(
        (status = 200, description = "Predictions with summary statistics", body = BatchPredictResponse),
        (status = 400, description = "Empty batch or no predictable course")
    ),
    tag = "predictions"
)]
pub async fn predict_batch(
    State(state): State<AppState>,
    Json(req): Json<BatchPredictRequest>,
) -> Result<Json<ApiResponse<BatchPredictResponse>>, AppError> {
    if req.course_ids.is_empty() || req.course_ids.len() > MAX_BATCH_SIZE {
        return Err(AppError::bad_request(format!(
            "course_ids must contain between 1 and {} entries",
            MAX_BATCH_SIZE
        )));
    }
    if req.model_type == ModelType::Personalized {
        return Err(AppError::bad_request(
            "Batch predictions support grade_distribution and full models only",
        ));
    }

    let mut predictions = Vec::with_capacity(req.course_ids.len());
    for &course_id in &req.course_ids {
        match course_prediction(&state, course_id, req.model_type).await {
            Ok(prediction) => predictions.push(prediction),
            Err(e) if e.status() == StatusCode::BAD_REQUEST => {
                tracing::debug!("Skipping course {} in batch", course_id);
            }
            Err(e) => return Err(e),
        }
    }

    let summary = summarize(&predictions).ok_or_else(|| {
        AppError::bad_request("No valid predictions could be made for the given courses")
    })?;

    Ok(Json(ApiResponse::success(BatchPredictResponse {
        predictions,
        summary,
    })))
}

fn summarize(predictions: &[PredictResponse]) -> Option<BatchSummary> {
    if predictions.is_empty() {
        return None;
    }

    let predicted: Vec<f64> = predictions.iter().map(|p| p.prediction.predicted_gpa).collect();
    let actual: Vec<f64> = predictions
        .iter()
        .filter_map(|p| p.prediction.actual_gpa)
        .collect();

    Some(BatchSummary {
        total_courses: predictions.len(),
        mean_predicted_gpa: predicted.iter().sum::<f64>() / predicted.len() as f64,
        min_predicted_gpa: predicted.iter().copied().fold(f64::INFINITY, f64::min),
        max_predicted_gpa: predicted.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        mean_actual_gpa: (!actual.is_empty())
            .then(|| actual.iter().sum::<f64>() / actual.len() as f64),
    })
}

/// Metadata and metrics of the loaded models
#[utoipa::path(
    get,
    path = "/models",
    responses((status = 200, description = "Loaded models", body = ModelsResponse)),
    tag = "predictions"
)]
pub async fn list_models(State(state): State<AppState>) -> Json<ApiResponse<ModelsResponse>> {
    Json(ApiResponse::success(ModelsResponse {
        models: state.registry.all_model_info(),
    }))
}
