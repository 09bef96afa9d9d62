use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use course_db::{CourseDetail, CourseSummary};
use serde::{Deserialize, Serialize};

use crate::{ApiResponse, AppError, AppState};

const DEFAULT_LIMIT: i64 = 50;

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct CoursesQuery {
    /// Filter by subject, e.g. `COMPSCI`
    pub subject: Option<String>,
    /// 1..=100, default 50
    pub limit: Option<i64>,
    /// Default 0
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CoursesResponse {
    pub courses: Vec<CourseSummary>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

pub fn course_routes() -> Router<AppState> {
    Router::new()
        .route("/courses", get(list_courses))
        .route("/courses/:course_id", get(get_course))
}

/// List courses, largest enrolment first
#[utoipa::path(
    get,
    path = "/courses",
    params(CoursesQuery),
    responses(
        (status = 200, description = "Page of courses", body = CoursesResponse),
        (status = 400, description = "Invalid pagination")
    ),
    tag = "courses"
)]
pub async fn list_courses(
    State(state): State<AppState>,
    Query(query): Query<CoursesQuery>,
) -> Result<Json<ApiResponse<CoursesResponse>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let offset = query.offset.unwrap_or(0);
    if !(1..=course_db::MAX_PAGE_SIZE).contains(&limit) {
        return Err(AppError::bad_request(format!(
            "limit must be between 1 and {}",
            course_db::MAX_PAGE_SIZE
        )));
    }
    if offset < 0 {
        return Err(AppError::bad_request("offset must be non-negative"));
    }

    let subject = query.subject.as_deref().filter(|s| !s.is_empty());
    let courses = state.db.list_courses(subject, limit, offset).await?;
    let total = state.db.count_courses(subject).await?;

    Ok(Json(ApiResponse::success(CoursesResponse {
        courses,
        total,
        limit,
        offset,
    })))
}

/// Course detail with grade distribution and grading structure
#[utoipa::path(
    get,
    path = "/courses/{course_id}",
    params(("course_id" = i64, Path, description = "Course ID")),
    responses(
        (status = 200, description = "Course detail", body = CourseDetail),
        (status = 404, description = "Unknown course")
    ),
    tag = "courses"
)]
pub async fn get_course(
    State(state): State<AppState>,
    Path(course_id): Path<i64>,
) -> Result<Json<ApiResponse<CourseDetail>>, AppError> {
    let course = state
        .db
        .get_course(course_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Course ID {} not found", course_id)))?;

    Ok(Json(ApiResponse::success(course)))
}
