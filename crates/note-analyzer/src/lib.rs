//! Optional analysis of free-form student notes through an
//! OpenAI-compatible chat completions API.
//!
//! Notes leave the process only when an API key is configured. Every failure
//! path returns a neutral analysis so predictions never depend on the LLM.

pub mod error;
pub mod groq;

pub use error::{AnalyzerError, AnalyzerResult};
pub use groq::{parse_completion, GroqAnalyzer, DEFAULT_BASE_URL, DEFAULT_MODEL};
