use async_trait::async_trait;
use std::collections::HashMap;

use crate::{BasePrediction, CoreResult, CourseFeatures, ModelInfo, ModelType, NoteAnalysis};

/// Point predictor producing a course-level GPA estimate.
#[async_trait]
pub trait BasePredictor: Send + Sync {
    async fn predict(
        &self,
        model_type: ModelType,
        features: &CourseFeatures,
    ) -> CoreResult<BasePrediction>;

    fn all_model_info(&self) -> Vec<ModelInfo>;
}

/// Batch lookup of historical course averages by course name.
///
/// Names that cannot be resolved are simply absent from the returned map.
#[async_trait]
pub trait CourseAverageLookup: Send + Sync {
    async fn course_averages(
        &self,
        course_names: &[String],
    ) -> CoreResult<HashMap<String, f64>>;
}

/// Extracts context factors from free-form notes. Never fails; degrades to
/// [`NoteAnalysis::neutral`].
#[async_trait]
pub trait NoteAnalyzer: Send + Sync {
    async fn analyze_notes(&self, notes: &str, course_name: &str) -> NoteAnalysis;

    fn backend_name(&self) -> &'static str;
}

#[async_trait]
impl CourseAverageLookup for HashMap<String, f64> {
    async fn course_averages(
        &self,
        course_names: &[String],
    ) -> CoreResult<HashMap<String, f64>> {
        Ok(course_names
            .iter()
            .filter_map(|name| self.get(name).map(|avg| (name.clone(), *avg)))
            .collect())
    }
}
