use grade_core::{ConfidenceInterval, CourseFeatures, ModelInfo, ModelType, PredictionError};
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};

/// Default MAE assumed when a descriptor carries no metrics.
pub const DEFAULT_MAE: f64 = 0.1;

/// z-score of a two-sided 95% interval.
const CI_Z: f64 = 1.96;

/// Personalization inflates the base error metric by this factor.
const STD_HINT_FACTOR: f64 = 1.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
}

/// Standardization parameters applied before the linear map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

/// Exported linear regression model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub model_type: ModelType,
    pub model_name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub features: Vec<String>,
    pub scaler: Scaler,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    #[serde(default)]
    pub metrics: Option<ModelMetrics>,
}

impl LinearModel {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Check that the descriptor is internally consistent.
    pub fn validate(&self) -> RegistryResult<()> {
        if self.model_type == ModelType::Personalized {
            return Err(RegistryError::InvalidModel(format!(
                "{}: 'personalized' is not a base model type",
                self.model_name
            )));
        }
        let n = self.features.len();
        if n == 0 {
            return Err(RegistryError::InvalidModel(format!(
                "{}: no features",
                self.model_name
            )));
        }
        if self.coefficients.len() != n || self.scaler.mean.len() != n || self.scaler.scale.len() != n
        {
            return Err(RegistryError::InvalidModel(format!(
                "{}: expected {} coefficients and scaler entries, got {} / {} / {}",
                self.model_name,
                n,
                self.coefficients.len(),
                self.scaler.mean.len(),
                self.scaler.scale.len()
            )));
        }
        Ok(())
    }

    pub fn mae(&self) -> f64 {
        self.metrics.as_ref().map(|m| m.mae).unwrap_or(DEFAULT_MAE)
    }

    /// Predicted GPA clipped to `[0, 4]`.
    pub fn predict(&self, features: &CourseFeatures) -> Result<f64, PredictionError> {
        let mut y = self.intercept;
        for (i, name) in self.features.iter().enumerate() {
            let value = features
                .get(name)
                .ok_or_else(|| PredictionError::MissingFeature(name.clone()))?;
            let scale = match self.scaler.scale[i] {
                s if s == 0.0 => 1.0,
                s => s,
            };
            y += self.coefficients[i] * (value - self.scaler.mean[i]) / scale;
        }
        Ok(y.clamp(0.0, 4.0))
    }

    pub fn confidence_interval(&self, prediction: f64) -> ConfidenceInterval {
        let margin = CI_Z * self.mae();
        ConfidenceInterval {
            lower: (prediction - margin).max(0.0),
            upper: (prediction + margin).min(4.0),
        }
    }

    /// Standard deviation handed to personalization.
    pub fn std_hint(&self) -> f64 {
        self.mae() * STD_HINT_FACTOR
    }

    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            model_type: self.model_type,
            model_name: self.model_name.clone(),
            description: self.description.clone(),
            mae: self.metrics.as_ref().map(|m| m.mae),
            rmse: self.metrics.as_ref().map(|m| m.rmse),
            r2: self.metrics.as_ref().map(|m| m.r2),
            features_used: self.features.clone(),
            num_features: self.features.len(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn ridge() -> LinearModel {
        LinearModel::from_json(
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
        .unwrap()
    }

    fn features(entropy: f64, pct_a: f64) -> CourseFeatures {
        let mut f = CourseFeatures::new();
        f.insert("grade_entropy", Some(entropy));
        f.insert("pct_a_range", Some(pct_a));
        f
    }

    #[test]
    fn test_descriptor_is_valid() {
        assert!(ridge().validate().is_ok());
    }

    #[test]
    fn test_predict_standardizes_features() {
        let model = ridge();
        // At the scaler mean every term vanishes.
        assert!((model.predict(&features(2.0, 30.0)).unwrap() - 3.2).abs() < 1e-12);
        // One std above the mean on pct_a_range adds its coefficient.
        assert!((model.predict(&features(2.0, 40.0)).unwrap() - 3.4).abs() < 1e-12);
    }

    #[test]
    fn test_predict_clips_to_gpa_range() {
        let model = ridge();
        assert_eq!(model.predict(&features(2.0, 200.0)).unwrap(), 4.0);
        assert_eq!(model.predict(&features(2.0, -500.0)).unwrap(), 0.0);
    }

    #[test]
    fn test_missing_feature_is_reported() {
        let mut partial = CourseFeatures::new();
        partial.insert("grade_entropy", Some(2.0));
        let err = ridge().predict(&partial).unwrap_err();
        assert_eq!(err, PredictionError::MissingFeature("pct_a_range".to_string()));
    }

    #[test]
    fn test_interval_and_std_hint() {
        let model = ridge();
        let ci = model.confidence_interval(3.9);
        assert!((ci.lower - (3.9 - 1.96 * 0.12)).abs() < 1e-12);
        assert_eq!(ci.upper, 4.0);
        assert!((model.std_hint() - 0.18).abs() < 1e-12);

        let mut bare = model.clone();
        bare.metrics = None;
        assert!((bare.std_hint() - 0.15).abs() < 1e-12);
        assert_eq!(bare.info().mae, None);
    }

    #[test]
    fn test_mismatched_descriptor_is_rejected() {
        let mut model = ridge();
        model.coefficients.pop();
        assert!(matches!(model.validate(), Err(RegistryError::InvalidModel(_))));

        let mut personalized = ridge();
        personalized.model_type = ModelType::Personalized;
        assert!(personalized.validate().is_err());
    }
}
