use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("LLM service returned status {0}")]
    Status(u16),

    #[error("Invalid response: {0}")]
    Parse(String),

    #[error("Timeout")]
    Timeout,
}

pub type AnalyzerResult<T> = Result<T, AnalyzerError>;
