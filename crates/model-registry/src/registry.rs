use async_trait::async_trait;
use grade_core::{BasePrediction, BasePredictor, CourseFeatures, ModelInfo, ModelType, PredictionError};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{RegistryError, RegistryResult};
use crate::model::LinearModel;

/// Read-only set of base models, keyed by model type.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<ModelType, LinearModel>,
}

impl ModelRegistry {
    /// Build a registry from already-parsed descriptors.
    pub fn from_models(models: impl IntoIterator<Item = LinearModel>) -> RegistryResult<Self> {
        let mut registry = Self::default();
        for model in models {
            model.validate()?;
            if let Some(previous) = registry.models.insert(model.model_type, model) {
                tracing::warn!(
                    "Duplicate descriptor for {}; replacing {}",
                    previous.model_type,
                    previous.model_name
                );
            }
        }
        registry.require(ModelType::GradeDistribution)?;
        Ok(registry)
    }

    /// Load every `*.json` descriptor in `dir`. The `grade_distribution` model
    /// is required; other models are optional.
    pub fn load(dir: &Path) -> RegistryResult<Self> {
        tracing::info!("Loading models from {}", dir.display());

        let entries = std::fs::read_dir(dir).map_err(|source| RegistryError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut paths: Vec<_> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().map(|ext| ext == "json").unwrap_or(false))
            .collect();
        paths.sort();

        let mut models = Vec::with_capacity(paths.len());
        for path in paths {
            let raw = std::fs::read_to_string(&path).map_err(|source| RegistryError::Io {
                path: path.clone(),
                source,
            })?;
            let model = LinearModel::from_json(&raw).map_err(|source| RegistryError::Parse {
                path: path.clone(),
                source,
            })?;
            match model.metrics.as_ref() {
                Some(m) => tracing::info!("Loaded {} model: MAE={:.3}", model.model_type, m.mae),
                None => tracing::info!("Loaded {} model (no metrics)", model.model_type),
            }
            models.push(model);
        }

        let registry = Self::from_models(models)?;
        tracing::info!("Successfully loaded {} models", registry.len());
        Ok(registry)
    }

    fn require(&self, model_type: ModelType) -> RegistryResult<&LinearModel> {
        self.models
            .get(&model_type)
            .ok_or_else(|| RegistryError::MissingModel(model_type.to_string()))
    }

    pub fn get(&self, model_type: ModelType) -> Option<&LinearModel> {
        self.models.get(&model_type)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn is_loaded(&self) -> bool {
        self.models.contains_key(&ModelType::GradeDistribution)
    }
}

#[async_trait]
impl BasePredictor for ModelRegistry {
    async fn predict(
        &self,
        model_type: ModelType,
        features: &CourseFeatures,
    ) -> Result<BasePrediction, PredictionError> {
        let model = self
            .get(model_type)
            .ok_or_else(|| PredictionError::InvalidModelType(model_type.to_string()))?;
        let gpa = model.predict(features)?;
        Ok(BasePrediction {
            gpa,
            std_hint: model.std_hint(),
            confidence_interval: model.confidence_interval(gpa),
            model_info: model.info(),
        })
    }

    fn all_model_info(&self) -> Vec<ModelInfo> {
        let mut infos: Vec<ModelInfo> = self.models.values().map(LinearModel::info).collect();
        infos.sort_by_key(|i| i.model_type.as_str());
        infos
    }
}
