//! Footprint estimation across all categories
//!
//! Each category is served by its trained model when one is installed and
//! able to score the profile, and by the rule table otherwise. Models are
//! swapped in wholesale behind an `Arc`, so an estimate in flight keeps the
//! model it started with.

use crate::category::Category;
use crate::model::{CategoryFootprintModel, TrainingSample};
use crate::rules::rule_footprint;
use ecoprint_core::{Error, ForestConfig, ProfileSchema, Result, UserProfile};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Per-category footprints and their sum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FootprintEstimate {
    pub breakdown: BTreeMap<Category, f64>,
    pub total: f64,
}

impl FootprintEstimate {
    pub fn from_breakdown(breakdown: BTreeMap<Category, f64>) -> Self {
        let total = breakdown.values().sum();
        Self { breakdown, total }
    }

    /// Footprint of `category`, 0.0 when absent
    pub fn get(&self, category: Category) -> f64 {
        self.breakdown.get(&category).copied().unwrap_or(0.0)
    }
}

/// Observability counters of one category
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CategoryStats {
    pub trained: bool,
    pub quality: Option<f64>,
    pub model_estimates: u64,
    pub fallbacks: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EstimatorStats {
    pub categories: BTreeMap<Category, CategoryStats>,
}

impl EstimatorStats {
    pub fn total_fallbacks(&self) -> u64 {
        self.categories.values().map(|c| c.fallbacks).sum()
    }
}

#[derive(Default)]
struct Slot {
    model: RwLock<Option<Arc<CategoryFootprintModel>>>,
    model_estimates: AtomicU64,
    fallbacks: AtomicU64,
}

/// Combines category models with rule-based fallback
pub struct FootprintEstimator {
    schema: ProfileSchema,
    config: ForestConfig,
    slots: BTreeMap<Category, Slot>,
}

impl FootprintEstimator {
    pub fn new(schema: ProfileSchema, config: ForestConfig) -> Result<Self> {
        schema.validate()?;
        config.validate()?;
        Ok(Self {
            schema,
            config,
            slots: Category::ALL.into_iter().map(|c| (c, Slot::default())).collect(),
        })
    }

    fn slot(&self, category: Category) -> &Slot {
        // Every category gets a slot in `new`
        &self.slots[&category]
    }

    pub fn schema(&self) -> &ProfileSchema {
        &self.schema
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    /// Train a fresh model for `category` and swap it in, returning its
    /// quality score. The previous model keeps serving until the swap.
    pub fn train(&self, category: Category, samples: &[TrainingSample]) -> Result<f64> {
        let mut model = CategoryFootprintModel::new(category, self.schema.clone(), self.config.clone())?;
        let quality = model.train(samples)?;
        self.install(model);
        Ok(quality)
    }

    /// Install a trained or restored model, replacing the current one
    pub fn install(&self, model: CategoryFootprintModel) {
        let category = model.category();
        let trained = model.is_trained();
        *self.slot(category).model.write() = Some(Arc::new(model));
        tracing::debug!(%category, trained, "category model installed");
    }

    pub fn model(&self, category: Category) -> Option<Arc<CategoryFootprintModel>> {
        self.slot(category).model.read().clone()
    }

    pub fn trained_categories(&self) -> Vec<Category> {
        Category::ALL
            .into_iter()
            .filter(|c| self.model(*c).is_some_and(|m| m.is_trained()))
            .collect()
    }

    /// Model prediction for one category, without fallback
    pub fn predict(&self, category: Category, profile: &UserProfile) -> Result<f64> {
        match self.model(category) {
            Some(model) => model.predict(profile),
            None => Err(Error::model_unavailable(category.as_str(), "no model installed")),
        }
    }

    /// Footprint per category and in total. Never fails: a category whose
    /// model is missing or cannot score the profile uses its rule table.
    pub fn estimate(&self, profile: &UserProfile) -> FootprintEstimate {
        let mut breakdown = BTreeMap::new();
        for category in Category::ALL {
            let slot = self.slot(category);
            let footprint = match self.predict(category, profile) {
                Ok(value) if value.is_finite() => {
                    slot.model_estimates.fetch_add(1, Ordering::Relaxed);
                    value
                }
                Ok(value) => {
                    slot.fallbacks.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(%category, value, user = %profile.user_id, "non-finite model output; using rules");
                    rule_footprint(category, profile)
                }
                Err(e) => {
                    slot.fallbacks.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(%category, user = %profile.user_id, error = %e, "using rule-based footprint");
                    rule_footprint(category, profile)
                }
            };
            breakdown.insert(category, footprint);
        }

        let estimate = FootprintEstimate::from_breakdown(breakdown);
        tracing::debug!(user = %profile.user_id, total = estimate.total, "footprint estimated");
        estimate
    }

    pub fn stats(&self) -> EstimatorStats {
        let categories = self
            .slots
            .iter()
            .map(|(category, slot)| {
                let model = slot.model.read().clone();
                let stats = CategoryStats {
                    trained: model.as_ref().is_some_and(|m| m.is_trained()),
                    quality: model.as_ref().and_then(|m| m.quality()),
                    model_estimates: slot.model_estimates.load(Ordering::Relaxed),
                    fallbacks: slot.fallbacks.load(Ordering::Relaxed),
                };
                (*category, stats)
            })
            .collect();
        EstimatorStats { categories }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::{diet_samples, small_config};
    use crate::rules::rule_based_tips;

    fn estimator() -> FootprintEstimator {
        FootprintEstimator::new(ProfileSchema::lifestyle(), small_config()).unwrap()
    }

    #[test]
    fn test_untrained_estimator_uses_rules() {
        let estimator = estimator();
        let profile = UserProfile::new("u")
            .with("diet_type", "Vegan")
            .with("transportation_mode", "Public transport")
            .with("vehicle_type", "Electric");

        let estimate = estimator.estimate(&profile);
        assert_eq!(estimate.get(Category::Diet), 1.5);
        assert_eq!(estimate.get(Category::Transportation), 2.0);
        assert_eq!(estimate.breakdown.len(), 5);
        assert!((estimate.total - estimate.breakdown.values().sum::<f64>()).abs() < 1e-12);

        let stats = estimator.stats();
        assert_eq!(stats.total_fallbacks(), 5);
        assert!(stats.categories.values().all(|c| !c.trained));
    }

    #[test]
    fn test_trained_category_uses_model() {
        let estimator = estimator();
        let quality = estimator.train(Category::Diet, &diet_samples()).unwrap();
        assert!(quality > 0.9);
        assert_eq!(estimator.trained_categories(), vec![Category::Diet]);

        let profile = UserProfile::new("u").with("diet_type", "Omnivore");
        let estimate = estimator.estimate(&profile);
        assert!((estimate.get(Category::Diet) - 3.0).abs() < 0.1);

        let stats = estimator.stats();
        let diet = stats.categories[&Category::Diet];
        assert!(diet.trained);
        assert_eq!(diet.model_estimates, 1);
        assert_eq!(diet.fallbacks, 0);
        assert_eq!(stats.total_fallbacks(), 4);
    }

    #[test]
    fn test_unseen_value_falls_back_for_that_category_only() {
        let estimator = estimator();
        estimator.train(Category::Diet, &diet_samples()).unwrap();

        // The lifestyle model has seen "Flexitarian", the diet model has not
        let mut lifestyle = diet_samples();
        lifestyle.push(TrainingSample::new(
            UserProfile::new("f").with("diet_type", "Flexitarian"),
            1.0,
        ));
        estimator.train(Category::Lifestyle, &lifestyle).unwrap();

        let profile = UserProfile::new("u").with("diet_type", "Flexitarian");
        let estimate = estimator.estimate(&profile);
        assert_eq!(estimate.get(Category::Diet), 2.5);

        let stats = estimator.stats();
        assert_eq!(stats.categories[&Category::Diet].fallbacks, 1);
        assert_eq!(stats.categories[&Category::Diet].model_estimates, 0);
        assert_eq!(stats.categories[&Category::Lifestyle].model_estimates, 1);
        assert_eq!(stats.categories[&Category::Lifestyle].fallbacks, 0);
    }

    #[test]
    fn test_empty_training_falls_back() {
        let estimator = estimator();
        assert_eq!(estimator.train(Category::Waste, &[]).unwrap(), 0.0);
        assert!(estimator.model(Category::Waste).is_some());
        assert!(matches!(
            estimator.predict(Category::Waste, &UserProfile::new("u")),
            Err(Error::ModelUnavailable { .. })
        ));
        assert_eq!(estimator.estimate(&UserProfile::new("u")).get(Category::Waste), 1.5);
    }

    #[test]
    fn test_retraining_swaps_model() {
        let estimator = estimator();
        estimator.train(Category::Diet, &diet_samples()).unwrap();
        let before = estimator.model(Category::Diet).unwrap();

        let shifted: Vec<TrainingSample> = diet_samples()
            .into_iter()
            .map(|s| TrainingSample::new(s.profile, s.footprint + 10.0))
            .collect();
        estimator.train(Category::Diet, &shifted).unwrap();

        let vegan = UserProfile::new("v").with("diet_type", "Vegan");
        assert!(before.predict(&vegan).unwrap() < 2.0);
        assert!(estimator.predict(Category::Diet, &vegan).unwrap() > 11.0);
    }

    #[test]
    fn test_estimate_json_shape_and_tips() {
        let estimator = estimator();
        let profile = UserProfile::new("u").with("diet_type", "Omnivore");
        let estimate = estimator.estimate(&profile);

        let json = serde_json::to_value(&estimate).unwrap();
        assert_eq!(json["breakdown"]["diet"], 3.0);
        assert!(json["total"].is_number());

        let tips = rule_based_tips(&estimate);
        assert!(tips.contains(&"Consider reducing meat consumption or trying plant-based meals".to_string()));
    }
}
