use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::{ApiResponse, AppState};

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    /// `healthy` when the database answers and the required model is loaded
    pub status: String,
    pub database_connected: bool,
    pub models_loaded: bool,
    pub model_count: usize,
}

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub docs: String,
    pub health: String,
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// Service description at `/`, mounted only in development.
pub fn root_routes() -> Router<AppState> {
    Router::new().route("/", get(service_info))
}

/// Database and model status
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service health", body = HealthResponse)),
    tag = "health"
)]
pub async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    let database_connected = state.db.ping().await;
    let models_loaded = state.registry.is_loaded();

    let status = if database_connected && models_loaded {
        "healthy"
    } else {
        "unhealthy"
    };

    Json(ApiResponse::success(HealthResponse {
        status: status.to_string(),
        database_connected,
        models_loaded,
        model_count: state.registry.len(),
    }))
}

async fn service_info(State(state): State<AppState>) -> Json<ApiResponse<ServiceInfo>> {
    Json(ApiResponse::success(ServiceInfo {
        name: "GradeCast API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        docs: "/docs".to_string(),
        health: format!("{}/health", state.config.api_prefix),
    }))
}

#[cfg(test)]
mod tests {
    use crate::test_support::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_reports_components() {
        let response = app()
            .await
            .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["status"], "healthy");
        assert_eq!(body["data"]["database_connected"], true);
        assert_eq!(body["data"]["models_loaded"], true);
        assert_eq!(body["data"]["model_count"], 2);
    }
}
