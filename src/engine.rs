//! Engine facade
//!
//! Wires one shared [`FeatureEncoder`] into the similarity index and the
//! recommender, next to the footprint estimator whose models keep private
//! encoders.

use ecoprint_core::{EngineConfig, FeatureEncoder, ProfileSchema, Result, UserProfile};
use ecoprint_model::{rule_based_tips, Category, EstimatorStats, FootprintEstimate, FootprintEstimator, TrainingSample};
use ecoprint_similarity::{
    Explainer, Recommendation, RecommendationGenerator, RecommendationStats, RecommendationSummary, UserSimilarityIndex,
};
use serde::Serialize;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Everything the engine can tell one user
#[derive(Debug, Clone, Serialize)]
pub struct FootprintReport {
    pub user_id: String,
    pub estimate: FootprintEstimate,
    pub recommendations: Vec<Recommendation>,
    /// Sentences explaining the recommendations, or generic tips when there
    /// are none
    pub advice: Vec<String>,
    pub summary: RecommendationSummary,
}

/// Engine-wide counters
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub indexed_users: usize,
    pub index_generation: u64,
    pub recommendations: RecommendationStats,
    pub estimator: EstimatorStats,
}

pub struct Engine {
    config: EngineConfig,
    encoder: Arc<FeatureEncoder>,
    index: Arc<UserSimilarityIndex>,
    generator: RecommendationGenerator,
    explainer: Explainer,
    estimator: FootprintEstimator,
}

impl Engine {
    /// Engine over the default lifestyle questionnaire
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_schema(ProfileSchema::lifestyle(), config)
    }

    pub fn with_schema(schema: ProfileSchema, config: EngineConfig) -> Result<Self> {
        config.forest.validate()?;
        let schema = config.apply_to(schema)?;

        let encoder = Arc::new(FeatureEncoder::new(schema.clone())?);
        let index = Arc::new(UserSimilarityIndex::new(encoder.clone()));
        let generator = RecommendationGenerator::new(index.clone())?;
        let explainer = Explainer::new(encoder.clone());
        let estimator = FootprintEstimator::new(schema, config.forest.clone())?;

        tracing::debug!(attributes = encoder.dim()?, "engine initialized");
        Ok(Self {
            config,
            encoder,
            index,
            generator,
            explainer,
            estimator,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn schema(&self) -> &ProfileSchema {
        self.estimator.schema()
    }

    pub fn encoder(&self) -> &Arc<FeatureEncoder> {
        &self.encoder
    }

    pub fn index(&self) -> &Arc<UserSimilarityIndex> {
        &self.index
    }

    pub fn estimator(&self) -> &FootprintEstimator {
        &self.estimator
    }

    /// Apply the configured unknown-attribute policy
    pub fn validate_profile(&self, profile: &UserProfile) -> Result<UserProfile> {
        profile.validated(self.schema(), self.config.unknown_attributes)
    }

    fn validate_all(&self, profiles: &[UserProfile]) -> Result<Vec<UserProfile>> {
        profiles.iter().map(|p| self.validate_profile(p)).collect()
    }

    pub fn rebuild(&self, profiles: &[UserProfile]) -> Result<()> {
        self.rebuild_with_abort(profiles, &AtomicBool::new(false))
    }

    /// Rebuild the similarity index, giving up once `abort` is raised
    pub fn rebuild_with_abort(&self, profiles: &[UserProfile], abort: &AtomicBool) -> Result<()> {
        let profiles = self.validate_all(profiles)?;
        self.index.rebuild_with_abort(&profiles, abort)
    }

    pub fn train(&self, category: Category, samples: &[TrainingSample]) -> Result<f64> {
        let samples = samples
            .iter()
            .map(|s| Ok(TrainingSample::new(self.validate_profile(&s.profile)?, s.footprint)))
            .collect::<Result<Vec<_>>>()?;
        self.estimator.train(category, &samples)
    }

    pub fn estimate(&self, profile: &UserProfile) -> Result<FootprintEstimate> {
        let profile = self.validate_profile(profile)?;
        Ok(self.estimator.estimate(&profile))
    }

    /// Recommendations from the `k` most similar indexed users. Empty for a
    /// user that is not indexed yet.
    pub fn recommend(&self, user_id: &str, k: usize) -> Vec<Recommendation> {
        self.generator.recommend(user_id, k)
    }

    /// [`recommend`](Self::recommend) with the configured `default_k`
    pub fn recommend_default(&self, user_id: &str) -> Vec<Recommendation> {
        self.recommend(user_id, self.config.default_k)
    }

    pub fn describe(&self, rec: &Recommendation) -> String {
        self.explainer.describe(rec)
    }

    pub fn report(&self, profile: &UserProfile, k: usize) -> Result<FootprintReport> {
        let estimate = self.estimate(profile)?;
        let recommendations = self.recommend(&profile.user_id, k);

        let advice = if recommendations.is_empty() {
            rule_based_tips(&estimate)
        } else {
            self.explainer.describe_all(&recommendations)
        };
        let summary = RecommendationSummary::compute(&recommendations);

        Ok(FootprintReport {
            user_id: profile.user_id.clone(),
            estimate,
            recommendations,
            advice,
            summary,
        })
    }

    pub fn stats(&self) -> EngineStats {
        let snapshot = self.index.snapshot();
        EngineStats {
            indexed_users: snapshot.len(),
            index_generation: snapshot.generation(),
            recommendations: self.generator.stats(),
            estimator: self.estimator.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecoprint_core::{Error, UnknownAttributePolicy};

    fn profile(id: &str, diet: &str, transport: &str) -> UserProfile {
        UserProfile::new(id)
            .with("diet_type", diet)
            .with("transportation_mode", transport)
            .with("recycling", "Paper")
    }

    #[test]
    fn test_report_uses_neighbors_when_available() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let alice = profile("alice", "Omnivore", "Private car");
        engine
            .rebuild(&[alice.clone(), profile("bob", "Vegan", "Private car")])
            .unwrap();

        let report = engine.report(&alice, 3).unwrap();
        assert_eq!(report.recommendations.len(), 1);
        assert_eq!(report.recommendations[0].feature, "diet_type");
        assert_eq!(report.advice.len(), 1);
        assert!(report.advice[0].contains("diet"));
        assert_eq!(report.summary.results_count, 1);
    }

    #[test]
    fn test_report_falls_back_to_tips() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let carol = profile("carol", "Omnivore", "Private car");

        let report = engine.report(&carol, 3).unwrap();
        assert!(report.recommendations.is_empty());
        assert!(report
            .advice
            .contains(&"Consider reducing meat consumption or trying plant-based meals".to_string()));
        assert_eq!(engine.stats().recommendations.not_indexed, 1);
    }

    #[test]
    fn test_reject_policy_propagates() {
        let config = EngineConfig {
            unknown_attributes: UnknownAttributePolicy::Reject,
            ..EngineConfig::default()
        };
        let engine = Engine::new(config).unwrap();
        let bad = UserProfile::new("x").with("pets", "3 cats");

        let err = engine.rebuild(&[bad.clone()]).unwrap_err();
        assert!(matches!(err, Error::UnknownAttribute(_)));
        assert!(err.is_fatal());
        assert!(engine.estimate(&bad).is_err());
    }

    #[test]
    fn test_ignore_policy_drops_unknown_attributes() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let profile = UserProfile::new("x").with("pets", "3 cats").with("diet_type", "Vegan");
        let validated = engine.validate_profile(&profile).unwrap();
        assert!(validated.get("pets").is_none());
        assert_eq!(engine.estimate(&profile).unwrap().get(Category::Diet), 1.5);
    }

    #[test]
    fn test_polarity_override_reaches_recommender() {
        let config = EngineConfig::from_json_str(r#"{"polarity": {"diet_type": "higher_is_better"}}"#).unwrap();
        let engine = Engine::new(config).unwrap();
        engine
            .rebuild(&[
                profile("alice", "Omnivore", "Private car"),
                profile("bob", "Vegan", "Private car"),
            ])
            .unwrap();

        // Vegan now counts as the worse diet, so bob learns from alice
        assert!(engine.recommend("alice", 3).is_empty());
        let recs = engine.recommend("bob", 3);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].neighbor_id, "alice");
    }
}
