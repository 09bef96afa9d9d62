//! Prediction Orchestration
//!
//! Wires the base predictor, course-average lookup and optional note analyzer
//! into the personalization pipeline. The numeric step, [`personalize`], is
//! pure; [`PredictionOrchestrator`] performs the I/O around it.

use grade_core::{
    BasePredictor, CourseAverageLookup, CourseFeatures, GradeDistribution, ModelType,
    NoteAnalysis, NoteAnalyzer, PredictionError, UserContext,
};
use grade_estimator::{
    adjust_with_ability, adjust_with_context, extract_context_features,
    gpa_to_grade_distribution, AbilityEstimate, AbilityEstimator, Adjustment, ContextFeatures,
    MeanAdjustments, WeightPolicy,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// How student context is folded into the base prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum PersonalizationStrategy {
    /// Ability offset from prior courses plus minor workload/comfort terms
    #[default]
    Kalman,
    /// Binned context features only
    ContextOnly,
}

/// Personalized prediction for one course. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PredictionResult {
    pub strategy: PersonalizationStrategy,
    pub base_gpa: f64,
    pub base_std: f64,
    /// In [0, 4]
    pub adjusted_mean: f64,
    /// At least 0.12
    pub adjusted_std: f64,
    pub grade_distribution: GradeDistribution,
    pub ability: AbilityEstimate,
    pub context_features: ContextFeatures,
    pub adjustments: MeanAdjustments,
    pub note_analysis: Option<NoteAnalysis>,
}

/// Inputs to [`personalize`] that come from outside the numeric core.
#[derive(Debug, Clone, Copy)]
pub struct PersonalizationInput<'a> {
    pub base_gpa: f64,
    pub base_std: f64,
    pub context: &'a UserContext,
    pub course_averages: &'a HashMap<String, f64>,
    pub note_analysis: Option<&'a NoteAnalysis>,
}

/// Pure personalization step: estimate ability, combine uncertainty, map to
/// grades. Performs no I/O.
pub fn personalize(
    estimator: &AbilityEstimator,
    strategy: PersonalizationStrategy,
    input: PersonalizationInput<'_>,
) -> PredictionResult {
    let context_features = extract_context_features(input.context);
    let note_adjustment = input
        .note_analysis
        .map(NoteAnalysis::bounded_adjustment)
        .unwrap_or(0.0);

    let (ability, adjustments, Adjustment { adjusted_mean, adjusted_std }) = match strategy {
        PersonalizationStrategy::Kalman => {
            let prior = input.context.prior_courses();
            let ability = if prior.is_empty() {
                AbilityEstimate::no_evidence()
            } else {
                estimator.estimate(prior, input.course_averages, input.context.avg_gpa)
            };
            let adjustments =
                MeanAdjustments::from_context(input.context).with_notes(note_adjustment);
            let adjustment = adjust_with_ability(
                input.base_gpa,
                input.base_std,
                ability.ability_offset,
                ability.uncertainty,
                &adjustments,
            );
            (ability, adjustments, adjustment)
        }
        PersonalizationStrategy::ContextOnly => {
            let adjustments = MeanAdjustments::default().with_notes(note_adjustment);
            let adjustment = adjust_with_context(
                input.base_gpa,
                input.base_std,
                &context_features,
                note_adjustment,
            );
            (AbilityEstimate::no_evidence(), adjustments, adjustment)
        }
    };

    let grade_distribution = gpa_to_grade_distribution(adjusted_mean, adjusted_std);
    if grade_distribution.is_degenerate() {
        tracing::error!(
            "Degenerate grade distribution for base_gpa={:.3} base_std={:.3}",
            input.base_gpa,
            input.base_std
        );
    }

    PredictionResult {
        strategy,
        base_gpa: input.base_gpa,
        base_std: input.base_std,
        adjusted_mean,
        adjusted_std,
        grade_distribution,
        ability,
        context_features,
        adjustments,
        note_analysis: input.note_analysis.cloned(),
    }
}

/// Drives the external collaborators and the numeric core for one request.
pub struct PredictionOrchestrator {
    predictor: Arc<dyn BasePredictor>,
    averages: Arc<dyn CourseAverageLookup>,
    note_analyzer: Option<Arc<dyn NoteAnalyzer>>,
    estimator: AbilityEstimator,
}

impl PredictionOrchestrator {
    pub fn new(predictor: Arc<dyn BasePredictor>, averages: Arc<dyn CourseAverageLookup>) -> Self {
        Self {
            predictor,
            averages,
            note_analyzer: None,
            estimator: AbilityEstimator::default(),
        }
    }

    pub fn with_note_analyzer(mut self, analyzer: Arc<dyn NoteAnalyzer>) -> Self {
        self.note_analyzer = Some(analyzer);
        self
    }

    pub fn with_weight_policy(mut self, policy: WeightPolicy) -> Self {
        self.estimator = AbilityEstimator::new(policy);
        self
    }

    /// Personalized prediction for `course_name` with the given features.
    ///
    /// The base prediction always comes from the `grade_distribution` model.
    /// Failing to look up prior-course averages degrades to "no evidence"
    /// rather than failing the request.
    pub async fn predict_personalized(
        &self,
        course_name: &str,
        features: &CourseFeatures,
        context: &UserContext,
        strategy: PersonalizationStrategy,
    ) -> Result<PredictionResult, PredictionError> {
        context.validate()?;

        let base = self
            .predictor
            .predict(ModelType::GradeDistribution, features)
            .await?;

        let course_averages = self.lookup_averages(context).await;
        let note_analysis = self.analyze_notes(context, course_name).await;

        Ok(personalize(
            &self.estimator,
            strategy,
            PersonalizationInput {
                base_gpa: base.gpa,
                base_std: base.std_hint,
                context,
                course_averages: &course_averages,
                note_analysis: note_analysis.as_ref(),
            },
        ))
    }

    async fn lookup_averages(&self, context: &UserContext) -> HashMap<String, f64> {
        let prior = context.prior_courses();
        if prior.is_empty() {
            return HashMap::new();
        }
        let names: Vec<String> = prior.iter().map(|c| c.course_name.clone()).collect();
        match self.averages.course_averages(&names).await {
            Ok(averages) => averages,
            Err(e) => {
                tracing::warn!("Course average lookup failed, ignoring prior courses: {}", e);
                HashMap::new()
            }
        }
    }

    async fn analyze_notes(&self, context: &UserContext, course_name: &str) -> Option<NoteAnalysis> {
        let notes = context.notes.as_deref()?;
        let analyzer = self.note_analyzer.as_ref()?;
        Some(analyzer.analyze_notes(notes, course_name).await)
    }
}
