use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredictionError {
    #[error("Course ID {0} not found")]
    CourseNotFound(i64),

    #[error("Invalid model_type: {0}")]
    InvalidModelType(String),

    #[error("Missing required feature: {0}")]
    MissingFeature(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid grade: {0}")]
    InvalidGrade(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("External service error: {0}")]
    External(String),
}

impl PredictionError {
    /// Errors caused by the request itself rather than by the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PredictionError::CourseNotFound(_)
                | PredictionError::InvalidModelType(_)
                | PredictionError::MissingFeature(_)
                | PredictionError::InsufficientData(_)
                | PredictionError::InvalidGrade(_)
                | PredictionError::InvalidInput(_)
        )
    }
}

pub type CoreResult<T> = Result<T, PredictionError>;
