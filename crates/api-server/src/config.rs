use anyhow::{Context, Result};
use grade_estimator::WeightPolicy;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_CORS_ORIGINS: &str =
    "http://localhost:5173,http://localhost:3000,http://127.0.0.1:5173,http://127.0.0.1:3000";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub db_path: PathBuf,
    pub models_dir: PathBuf,
    pub api_prefix: String,
    pub cors_origins: Vec<String>,
    pub environment: String,
    pub groq_api_key: Option<String>,
    pub weight_policy: WeightPolicy,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8000".to_string())
            .parse()
            .context("BIND_ADDR must be a socket address")?;

        let weight_policy = parse_weight_policy(env::var("ABILITY_WEIGHT_FLOOR").ok().as_deref())?;

        let config = Self {
            bind_addr,
            db_path: env::var("DB_PATH")
                .unwrap_or_else(|_| "data/courses.db".to_string())
                .into(),
            models_dir: env::var("MODELS_DIR")
                .unwrap_or_else(|_| "models".to_string())
                .into(),
            api_prefix: normalize_prefix(
                &env::var("API_PREFIX").unwrap_or_else(|_| "/api/v1".to_string()),
            ),
            cors_origins: parse_origins(
                &env::var("CORS_ORIGINS").unwrap_or_else(|_| DEFAULT_CORS_ORIGINS.to_string()),
            ),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            groq_api_key: env::var("GROQ_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            weight_policy,
        };

        Ok(config)
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            db_path: PathBuf::from("data/courses.db"),
            models_dir: PathBuf::from("models"),
            api_prefix: "/api/v1".to_string(),
            cors_origins: parse_origins(DEFAULT_CORS_ORIGINS),
            environment: "development".to_string(),
            groq_api_key: None,
            weight_policy: WeightPolicy::Unclamped,
        }
    }
}

/// Unset or blank keeps the unclamped weight; otherwise the value is the
/// weight floor and must lie in (0, 1].
fn parse_weight_policy(raw: Option<&str>) -> Result<WeightPolicy> {
    let raw = match raw.map(str::trim) {
        Some(raw) if !raw.is_empty() => raw,
        _ => return Ok(WeightPolicy::Unclamped),
    };

    let floor: f64 = raw
        .parse()
        .with_context(|| format!("ABILITY_WEIGHT_FLOOR must be a number, got {:?}", raw))?;
    if !(floor > 0.0 && floor <= 1.0) {
        anyhow::bail!("ABILITY_WEIGHT_FLOOR must be in (0, 1], got {}", floor);
    }
    Ok(WeightPolicy::Clamped { floor })
}

/// Leading slash, no trailing slash. An empty prefix mounts at the root.
fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("/api/v1"), "/api/v1");
        assert_eq!(normalize_prefix("api/v2/"), "/api/v2");
        assert_eq!(normalize_prefix("/"), "");
        assert_eq!(normalize_prefix(""), "");
    }

    #[test]
    fn test_weight_policy_defaults_to_unclamped() {
        assert_eq!(parse_weight_policy(None).unwrap(), WeightPolicy::Unclamped);
        assert_eq!(parse_weight_policy(Some("")).unwrap(), WeightPolicy::Unclamped);
        assert_eq!(parse_weight_policy(Some("   ")).unwrap(), WeightPolicy::Unclamped);
    }

    #[test]
    fn test_weight_policy_floor() {
        assert_eq!(
            parse_weight_policy(Some("0.1")).unwrap(),
            WeightPolicy::Clamped { floor: 0.1 }
        );
        assert_eq!(
            parse_weight_policy(Some(" 1 ")).unwrap(),
            WeightPolicy::Clamped { floor: 1.0 }
        );
    }

    #[test]
    fn test_weight_policy_rejects_bad_floor() {
        for raw in ["0", "-0.2", "1.5", "NaN", "inf"] {
            let err = parse_weight_policy(Some(raw)).unwrap_err();
            assert!(err.to_string().contains("(0, 1]"), "{raw}: {err}");
        }

        let err = parse_weight_policy(Some("abc")).unwrap_err();
        assert!(err.to_string().contains("must be a number"), "{err}");
    }

    #[test]
    fn test_parse_origins() {
        let origins = parse_origins(" http://a.test , ,http://b.test");
        assert_eq!(origins, vec!["http://a.test", "http://b.test"]);
        assert_eq!(ServerConfig::default().cors_origins.len(), 4);
    }
}
