//! HTTP service for course browsing and GPA prediction.

pub mod access_log;
pub mod config;
pub mod course_routes;
pub mod health_routes;
pub mod prediction_routes;
pub mod request_id;

use anyhow::Context;
use axum::{
    http::{HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    Json, Router,
};
use course_db::CourseDb;
use grade_core::{NoteAnalyzer, PredictionError};
use model_registry::ModelRegistry;
use note_analyzer::GroqAnalyzer;
use prediction_orchestrator::PredictionOrchestrator;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use utoipa::openapi::server::Server;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use config::ServerConfig;

/// Envelope for every JSON response.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Handler error carrying the HTTP status to answer with.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    pub fn with_status(status: StatusCode, error: anyhow::Error) -> Self {
        Self { status, error }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, anyhow::anyhow!(message.into()))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, anyhow::anyhow!(message.into()))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

fn prediction_status(e: &PredictionError) -> StatusCode {
    match e {
        PredictionError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        PredictionError::Database(_) | PredictionError::External(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        other if other.is_client_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("Request failed: {:#}", self.error);
        } else {
            // Client error messages can echo personal inputs
            tracing::debug!("Request rejected with status {}", self.status.as_u16());
        }
        let body = ApiResponse::<()>::error(format!("{:#}", self.error));
        (self.status, Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let error = err.into();
        let status = error
            .downcast_ref::<PredictionError>()
            .map(prediction_status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self { status, error }
    }
}

/// Shared, read-only application state.
#[derive(Clone)]
pub struct AppState {
    pub db: CourseDb,
    pub registry: Arc<ModelRegistry>,
    pub orchestrator: Arc<PredictionOrchestrator>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(
        db: CourseDb,
        registry: ModelRegistry,
        note_analyzer: Option<Arc<dyn NoteAnalyzer>>,
        config: ServerConfig,
    ) -> Self {
        let registry = Arc::new(registry);
        let mut orchestrator = PredictionOrchestrator::new(registry.clone(), Arc::new(db.clone()))
            .with_weight_policy(config.weight_policy);
        if let Some(analyzer) = note_analyzer {
            orchestrator = orchestrator.with_note_analyzer(analyzer);
        }

        Self {
            db,
            registry,
            orchestrator: Arc::new(orchestrator),
            config: Arc::new(config),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "GradeCast API",
        description = "Course GPA predictions with privacy-preserving personalization"
    ),
    paths(
        health_routes::health_check,
        course_routes::list_courses,
        course_routes::get_course,
        prediction_routes::list_models,
        prediction_routes::predict,
        prediction_routes::predict_batch,
    ),
    tags(
        (name = "health", description = "Service status"),
        (name = "courses", description = "Historical course data"),
        (name = "predictions", description = "GPA predictions")
    )
)]
pub struct ApiDoc;

/// OpenAPI document with paths relative to the configured API prefix.
pub fn api_doc(prefix: &str) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    if !prefix.is_empty() {
        doc.servers = Some(vec![Server::new(prefix)]);
    }
    doc
}

/// Without `GROQ_API_KEY` the analyzer still runs and answers with a neutral
/// analysis, so notes never leave the process.
fn note_analyzer(config: &ServerConfig) -> anyhow::Result<Arc<dyn NoteAnalyzer>> {
    let analyzer = GroqAnalyzer::new(config.groq_api_key.clone())?;
    if analyzer.is_configured() {
        tracing::info!("Note analysis enabled");
    } else {
        tracing::info!("GROQ_API_KEY not set, note analysis disabled");
    }
    Ok(Arc::new(analyzer))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request())
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .merge(health_routes::health_routes())
        .merge(course_routes::course_routes())
        .merge(prediction_routes::prediction_routes());

    let prefix = state.config.api_prefix.clone();
    let mut router = if prefix.is_empty() {
        api
    } else {
        Router::new().nest(&prefix, api)
    };

    if state.config.is_development() {
        router = router.merge(health_routes::root_routes());
    }

    router
        .merge(SwaggerUi::new("/docs").url("/openapi.json", api_doc(&prefix)))
        .layer(middleware::from_fn(access_log::access_log_middleware))
        .layer(middleware::from_fn(request_id::request_id_middleware))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}

fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ServerConfig::from_env()?;
    tracing::info!("Starting GradeCast API ({})", config.environment);

    let registry = ModelRegistry::load(&config.models_dir)
        .with_context(|| format!("Failed to load models from {}", config.models_dir.display()))?;

    let db = CourseDb::open(&config.db_path).await?;

    let note_analyzer = note_analyzer(&config)?;

    let bind_addr = config.bind_addr;
    let app = build_router(AppState::new(db, registry, Some(note_analyzer), config));

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    tracing::info!("Listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use model_registry::LinearModel;

    pub(crate) fn registry() -> ModelRegistry {
        let grade_distribution = LinearModel::from_json(
            r#"{
                "model_type": "grade_distribution",
                "model_name": "Ridge Regression",
                "description": "Grade distribution features only",
                "features": ["grade_entropy", "pct_a_range"],
                "scaler": { "mean": [2.0, 30.0], "scale": [0.5, 10.0] },
                "coefficients": [-0.1, 0.2],
                "intercept": 3.2,
                "metrics": { "mae": 0.12, "rmse": 0.16, "r2": 0.71 }
            }"#,
        )
        .unwrap();
        let full = LinearModel::from_json(
            r#"{
                "model_type": "full",
                "model_name": "Ridge Regression (all features)",
                "features": ["grade_entropy", "pct_a_range", "pct_exams"],
                "scaler": { "mean": [2.0, 30.0, 50.0], "scale": [0.5, 10.0, 10.0] },
                "coefficients": [-0.1, 0.2, -0.1],
                "intercept": 3.2
            }"#,
        )
        .unwrap();
        ModelRegistry::from_models(vec![grade_distribution, full]).unwrap()
    }

    /// In-memory database with three courses: 1 has grading structure,
    /// 2 has only distribution features, 3 has no features at all.
    pub(crate) async fn seeded_db() -> CourseDb {
        let db = CourseDb::in_memory().await.unwrap();
        let statements = [
            "INSERT INTO courses VALUES (1, 'COMPSCI', '170', 2.9, 600)",
            "INSERT INTO courses VALUES (2, 'COMPSCI', '61A', 3.1, 1200)",
            "INSERT INTO courses VALUES (3, 'MATH', '1A', NULL, 300)",
            "INSERT INTO courses VALUES (4, 'DATA', 'C8', 3.4, 1500)",
            "INSERT INTO course_features VALUES (1, 2.0, -0.2, 30.0, 88.0, 1, 0, 0, 1, 4, 'upper_div')",
            "INSERT INTO course_features VALUES (2, 2.5, -0.4, 40.0, 92.0, 1, 0, 1, 0, 6, 'lower_div')",
            "INSERT INTO grading_structure VALUES (1, 60.0, 0.0, 30.0, 10.0, 0.0, 3, 0, 10, 1, NULL, NULL)",
            "INSERT INTO grade_distributions (course_id, letter_grade, student_count, percentage) VALUES (1, 'A', 150, 25.0)",
            "INSERT INTO grade_distributions (course_id, letter_grade, student_count, percentage) VALUES (1, 'B', 240, 40.0)",
        ];
        for stmt in statements {
            sqlx::query(stmt).execute(db.pool()).await.unwrap();
        }
        db
    }

    pub(crate) async fn app() -> Router {
        let state = AppState::new(seeded_db().await, registry(), None, ServerConfig::default());
        build_router(state)
    }

    pub(crate) async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[test]
    fn test_prediction_errors_map_to_status() {
        let err: AppError = PredictionError::CourseNotFound(7).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err: AppError = PredictionError::ModelUnavailable("full".into()).into();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);

        let err: AppError = PredictionError::Database("locked".into()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let err: AppError = anyhow::anyhow!("boom").into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_request_id_is_generated_and_propagated() {
        let app = app().await;

        let response = app
            .clone()
            .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let generated = response.headers().get("x-request-id").unwrap();
        assert_eq!(generated.len(), 36);

        let response = app
            .oneshot(
                Request::get("/api/v1/health")
                    .header("x-request-id", "req-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers().get("x-request-id").unwrap(), "req-123");
    }

    #[tokio::test]
    async fn test_root_info_in_development() {
        let response = app()
            .await
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["docs"], "/docs");
        assert_eq!(body["data"]["health"], "/api/v1/health");
    }

    #[tokio::test]
    async fn test_root_hidden_outside_development() {
        let config = ServerConfig {
            environment: "production".to_string(),
            ..ServerConfig::default()
        };
        let state = AppState::new(seeded_db().await, registry(), None, config);
        let response = build_router(state)
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_openapi_document_lists_routes() {
        let response = app()
            .await
            .oneshot(Request::get("/openapi.json").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let doc = body_json(response).await;
        assert!(doc["paths"]["/predict"].is_object());
        assert!(doc["paths"]["/courses/{course_id}"].is_object());
        assert_eq!(doc["servers"][0]["url"], "/api/v1");
    }

    #[test]
    fn test_openapi_servers_follow_prefix() {
        let doc = api_doc("/gradecast/v2");
        let servers = doc.servers.unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].url, "/gradecast/v2");
        assert!(doc.paths.paths.contains_key("/health"));

        assert!(api_doc("").servers.is_none());
    }

    #[tokio::test]
    async fn test_custom_prefix_serves_routes() {
        let config = ServerConfig {
            api_prefix: "/gradecast/v2".to_string(),
            ..ServerConfig::default()
        };
        let state = AppState::new(seeded_db().await, registry(), None, config);
        let response = build_router(state)
            .oneshot(Request::get("/gradecast/v2/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_notes_without_api_key_get_neutral_analysis() {
        let config = ServerConfig::default();
        let analyzer = note_analyzer(&config).unwrap();
        let state = AppState::new(seeded_db().await, registry(), Some(analyzer), config);
        let request = serde_json::json!({
            "course_id": 1,
            "model_type": "personalized",
            "user_context": { "notes": "Working 25 hours a week this semester" }
        });
        let response = build_router(state)
            .oneshot(
                Request::post("/api/v1/predict")
                    .header("content-type", "application/json")
                    .body(Body::from(request.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let analysis = &body["data"]["prediction"]["note_analysis"];
        assert_eq!(analysis["llm_used"], false);
        assert_eq!(analysis["confidence_adjustment"], 0.0);
    }
}
