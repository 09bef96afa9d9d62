use async_trait::async_trait;
use grade_core::{NoteAnalysis, NoteAnalyzer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::{AnalyzerError, AnalyzerResult};

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MIN_NOTES_LEN: usize = 10;
const DEFAULT_REASONING: &str = "Analysis based on provided context";

const SYSTEM_PROMPT: &str = r#"You are an academic performance analyzer. Your job is to extract relevant contextual factors from a student's free-form notes that might affect their performance in a course.

Analyze the student's notes and extract ONLY the following factors (if mentioned):
1. Health issues or disabilities affecting study (physical/mental health)
2. Major life events or personal circumstances (family, relationships, housing)
3. Work or external commitments (job hours, caregiving, extracurriculars)
4. Specific academic strengths or weaknesses (subject areas, learning styles)
5. Motivation level and interest in the subject
6. Prior relevant experience outside of coursework
7. Study group or peer support availability
8. Access to resources (tutoring, office hours, textbooks)

Output ONLY a JSON object with these fields (use null if not mentioned):
{
  "health_impact": "positive" | "negative" | "neutral" | null,
  "external_commitments": "high" | "moderate" | "low" | null,
  "motivation": "high" | "moderate" | "low" | null,
  "relevant_experience": "extensive" | "some" | "none" | null,
  "support_system": "strong" | "moderate" | "weak" | null,
  "resource_access": "full" | "limited" | "restricted" | null,
  "confidence_adjustment": -0.2 to +0.2,
  "reasoning": "1-2 sentence summary"
}

The confidence_adjustment is a GPA modifier between -0.2 and +0.2 based on the overall context.
Be conservative - most contexts should result in adjustments between -0.1 and +0.1.

Output ONLY the JSON, no other text."#;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
    top_p: f64,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Debug, Deserialize)]
struct ChatContent {
    content: String,
}

/// Note analyzer backed by Groq's hosted Llama model.
#[derive(Clone)]
pub struct GroqAnalyzer {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl GroqAnalyzer {
    /// A blank key is treated as no key.
    pub fn new(api_key: Option<String>) -> AnalyzerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn request_completion(
        &self,
        api_key: &str,
        notes: &str,
        course_name: &str,
    ) -> AnalyzerResult<String> {
        let user_prompt = format!(
            "Target Course: {}\n\nStudent Notes:\n{}\n\nAnalyze the above notes and extract relevant contextual factors as JSON.",
            course_name, notes
        );

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &user_prompt,
                },
            ],
            temperature: 0.3,
            max_tokens: 300,
            top_p: 0.9,
        };

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AnalyzerError::Timeout
                } else {
                    AnalyzerError::Request(e)
                }
            })?;

        if !response.status().is_success() {
            return Err(AnalyzerError::Status(response.status().as_u16()));
        }

        let body = response.json::<ChatResponse>().await?;
        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| AnalyzerError::Parse("response has no choices".to_string()))
    }
}

#[async_trait]
impl NoteAnalyzer for GroqAnalyzer {
    async fn analyze_notes(&self, notes: &str, course_name: &str) -> NoteAnalysis {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::debug!("No LLM API key configured, skipping note analysis");
            return NoteAnalysis::neutral(false);
        };

        if notes.trim().chars().count() < MIN_NOTES_LEN {
            tracing::info!("Notes too short for analysis");
            return NoteAnalysis::neutral(false);
        }

        match self.request_completion(api_key, notes, course_name).await {
            Ok(content) => {
                let analysis = parse_completion(&content);
                tracing::info!(
                    "Note analysis complete: adjustment={:.3}",
                    analysis.confidence_adjustment
                );
                analysis
            }
            Err(e) => {
                tracing::error!("Note analysis failed: {}", e);
                NoteAnalysis::neutral(false)
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        "groq"
    }
}

/// Extract the analysis from raw completion text.
///
/// The JSON object is taken from the first `{` to the last `}`. Unparseable
/// output yields a neutral analysis that still reports the LLM as used.
pub fn parse_completion(content: &str) -> NoteAnalysis {
    let (Some(start), Some(end)) = (content.find('{'), content.rfind('}')) else {
        tracing::warn!("No JSON found in LLM response");
        return NoteAnalysis::neutral(true);
    };
    if end <= start {
        tracing::warn!("No JSON found in LLM response");
        return NoteAnalysis::neutral(true);
    }

    let value: Value = match serde_json::from_str::<Value>(&content[start..=end]) {
        Ok(value) if value.is_object() => value,
        Ok(_) => {
            tracing::warn!("LLM response JSON is not an object");
            return NoteAnalysis::neutral(true);
        }
        Err(e) => {
            tracing::error!("Failed to parse LLM JSON: {}", e);
            return NoteAnalysis::neutral(true);
        }
    };

    let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);

    let adjustment = value
        .get("confidence_adjustment")
        .and_then(Value::as_f64)
        .filter(|a| a.is_finite())
        .unwrap_or(0.0)
        .clamp(-NoteAnalysis::MAX_ADJUSTMENT, NoteAnalysis::MAX_ADJUSTMENT);

    let reasoning = text("reasoning")
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_REASONING.to_string());

    NoteAnalysis {
        health_impact: text("health_impact"),
        external_commitments: text("external_commitments"),
        motivation: text("motivation"),
        relevant_experience: text("relevant_experience"),
        support_system: text("support_system"),
        resource_access: text("resource_access"),
        confidence_adjustment: adjustment,
        reasoning,
        llm_used: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_completion_with_surrounding_text() {
        let content = r#"Here you go:
        {"health_impact": "negative", "motivation": "high", "external_commitments": null,
         "confidence_adjustment": -0.05, "reasoning": "Recent illness but high motivation"}
        Hope that helps."#;
        let analysis = parse_completion(content);
        assert!(analysis.llm_used);
        assert_eq!(analysis.health_impact.as_deref(), Some("negative"));
        assert_eq!(analysis.motivation.as_deref(), Some("high"));
        assert_eq!(analysis.external_commitments, None);
        assert!((analysis.confidence_adjustment + 0.05).abs() < 1e-12);
        assert_eq!(analysis.reasoning, "Recent illness but high motivation");
    }

    #[test]
    fn test_parse_completion_clamps_adjustment() {
        let analysis = parse_completion(r#"{"confidence_adjustment": 0.9}"#);
        assert_eq!(analysis.confidence_adjustment, 0.2);
        assert_eq!(analysis.reasoning, DEFAULT_REASONING);

        let analysis = parse_completion(r#"{"confidence_adjustment": -3}"#);
        assert_eq!(analysis.confidence_adjustment, -0.2);
    }

    #[test]
    fn test_parse_completion_non_numeric_adjustment() {
        let analysis = parse_completion(r#"{"confidence_adjustment": "a lot", "reasoning": ""}"#);
        assert_eq!(analysis.confidence_adjustment, 0.0);
        assert_eq!(analysis.reasoning, DEFAULT_REASONING);
        assert!(analysis.llm_used);
    }

    #[test]
    fn test_parse_completion_without_json() {
        for content in ["no json here", "} backwards {", "{not valid json}", "[1, 2]"] {
            let analysis = parse_completion(content);
            assert_eq!(analysis, NoteAnalysis::neutral(true), "{content}");
        }
    }

    #[tokio::test]
    async fn test_missing_key_is_neutral() {
        let analyzer = GroqAnalyzer::new(Some("   ".to_string())).unwrap();
        assert!(!analyzer.is_configured());
        let analysis = analyzer
            .analyze_notes("I work 30 hours a week at a cafe", "COMPSCI 170")
            .await;
        assert_eq!(analysis, NoteAnalysis::neutral(false));
    }

    #[tokio::test]
    async fn test_short_notes_are_neutral() {
        let analyzer = GroqAnalyzer::new(Some("key".to_string()))
            .unwrap()
            .with_base_url("http://127.0.0.1:9/unreachable");
        let analysis = analyzer.analyze_notes("   tired   ", "COMPSCI 170").await;
        assert_eq!(analysis, NoteAnalysis::neutral(false));
    }

    #[tokio::test]
    async fn test_request_failure_is_neutral() {
        let analyzer = GroqAnalyzer::new(Some("key".to_string()))
            .unwrap()
            .with_base_url("http://127.0.0.1:9/unreachable");
        let analysis = analyzer
            .analyze_notes("Working part time but very motivated this term", "DATA C8")
            .await;
        assert_eq!(analysis, NoteAnalysis::neutral(false));
        assert_eq!(analyzer.backend_name(), "groq");
    }
}
