//! Per-category footprint model
//!
//! Each model owns a private [`FeatureEncoder`] so its vocabulary codes stay
//! exactly those seen during training, independent of the shared encoder the
//! similarity index grows. After training the encoder is only used frozen: an
//! answer the model never saw makes the prediction unavailable instead of
//! feeding the forest a code it has no splits for.

use crate::category::Category;
use crate::forest::{r_squared, RandomForest};
use ecoprint_core::{EncoderState, Error, FeatureEncoder, ForestConfig, ProfileSchema, Result, UserProfile};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Below this many samples the validation split is skipped
const MIN_SAMPLES_FOR_SPLIT: usize = 5;

/// A profile with its measured footprint for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    pub profile: UserProfile,
    pub footprint: f64,
}

impl TrainingSample {
    pub fn new(profile: UserProfile, footprint: f64) -> Self {
        Self { profile, footprint }
    }
}

#[derive(Debug)]
struct Trained {
    forest: RandomForest,
    quality: f64,
}

/// Serializable trained model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryModelState {
    pub category: Category,
    pub config: ForestConfig,
    pub encoder: EncoderState,
    pub forest: RandomForest,
    pub quality: f64,
}

/// Random forest regressor for one footprint category
#[derive(Debug)]
pub struct CategoryFootprintModel {
    category: Category,
    config: ForestConfig,
    encoder: FeatureEncoder,
    trained: Option<Trained>,
}

impl CategoryFootprintModel {
    pub fn new(category: Category, schema: ProfileSchema, config: ForestConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            category,
            config,
            encoder: FeatureEncoder::new(schema)?,
            trained: None,
        })
    }

    pub fn from_state(state: CategoryModelState) -> Result<Self> {
        let encoder = FeatureEncoder::from_state(state.encoder)?;
        let dim = encoder.dim()?;
        if state.forest.n_features() != dim {
            return Err(Error::Persistence(format!(
                "{} model expects {} features, encoder has {}",
                state.category,
                state.forest.n_features(),
                dim
            )));
        }

        Ok(Self {
            category: state.category,
            config: state.config,
            encoder,
            trained: Some(Trained {
                forest: state.forest,
                quality: state.quality,
            }),
        })
    }

    /// Trained state, `None` before a successful training
    pub fn state(&self) -> Result<Option<CategoryModelState>> {
        let Some(trained) = &self.trained else {
            return Ok(None);
        };
        Ok(Some(CategoryModelState {
            category: self.category,
            config: self.config.clone(),
            encoder: self.encoder.state()?,
            forest: trained.forest.clone(),
            quality: trained.quality,
        }))
    }

    /// Fit the forest and return its R² on a held-out validation split.
    ///
    /// Samples with a non-finite footprint are skipped. With no usable sample
    /// the model stays untrained and the quality is 0.0. With fewer than five
    /// samples the quality is measured on the training data.
    pub fn train(&mut self, samples: &[TrainingSample]) -> Result<f64> {
        let started = Instant::now();
        let usable: Vec<&TrainingSample> = samples.iter().filter(|s| s.footprint.is_finite()).collect();
        if usable.len() < samples.len() {
            tracing::warn!(
                category = %self.category,
                skipped = samples.len() - usable.len(),
                "skipping samples with non-finite footprint"
            );
        }
        if usable.is_empty() {
            tracing::warn!(category = %self.category, "no training samples; model left untrained");
            return Ok(0.0);
        }

        // Fresh vocabularies and scaler for every training run
        let encoder = FeatureEncoder::new(self.encoder.schema()?.clone())?;
        let profiles: Vec<UserProfile> = usable.iter().map(|s| s.profile.clone()).collect();
        encoder.fit_scaler(&profiles)?;
        let rows: Vec<Vec<f32>> = encoder
            .encode_batch(&profiles)?
            .into_iter()
            .map(|v| v.as_slice().to_vec())
            .collect();
        let targets: Vec<f64> = usable.iter().map(|s| s.footprint).collect();

        let (train_idx, valid_idx) = self.split(rows.len());
        let pick_rows = |idx: &[usize]| idx.iter().map(|&i| rows[i].clone()).collect::<Vec<_>>();
        let pick_targets = |idx: &[usize]| idx.iter().map(|&i| targets[i]).collect::<Vec<_>>();

        let train_rows = pick_rows(&train_idx);
        let train_targets = pick_targets(&train_idx);
        let forest = RandomForest::fit(&train_rows, &train_targets, &self.config)?;

        let (eval_rows, eval_targets) = if valid_idx.is_empty() {
            (train_rows, train_targets)
        } else {
            (pick_rows(&valid_idx), pick_targets(&valid_idx))
        };
        let predicted: Vec<f64> = eval_rows.iter().map(|r| forest.predict(r)).collect();
        let quality = r_squared(&eval_targets, &predicted);

        self.encoder = encoder;
        self.trained = Some(Trained { forest, quality });

        tracing::info!(
            category = %self.category,
            samples = usable.len(),
            validation = valid_idx.len(),
            quality,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "category model trained"
        );
        Ok(quality)
    }

    /// Shuffled (train, validation) row indices
    fn split(&self, n: usize) -> (Vec<usize>, Vec<usize>) {
        let mut indices: Vec<usize> = (0..n).collect();
        if n < MIN_SAMPLES_FOR_SPLIT || self.config.validation_fraction <= 0.0 {
            return (indices, Vec::new());
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        indices.shuffle(&mut rng);

        let n_valid = ((n as f64) * self.config.validation_fraction).ceil() as usize;
        let n_valid = n_valid.clamp(1, n - 1);
        let valid = indices.split_off(n - n_valid);
        (indices, valid)
    }

    /// Predicted footprint of `profile`.
    ///
    /// Fails with [`Error::ModelUnavailable`] when the model is untrained or
    /// the profile holds a value the model never saw.
    pub fn predict(&self, profile: &UserProfile) -> Result<f64> {
        let Some(trained) = &self.trained else {
            return Err(Error::model_unavailable(self.category.as_str(), "not trained"));
        };

        let vector = match self.encoder.encode_frozen(profile) {
            Ok(vector) => vector,
            Err(Error::UnseenCategoryValue { attribute, value }) => {
                return Err(Error::model_unavailable(
                    self.category.as_str(),
                    format!("value '{}' of {} was not seen in training", value, attribute),
                ))
            }
            Err(e) => return Err(e),
        };

        Ok(trained.forest.predict(vector.as_slice()))
    }

    /// Attribute importances, highest first, summing to 1
    pub fn feature_importances(&self) -> Option<Vec<(String, f64)>> {
        let trained = self.trained.as_ref()?;
        let schema = self.encoder.schema().ok()?;

        let mut ranked: Vec<(String, f64)> = schema
            .attribute_names()
            .into_iter()
            .zip(trained.forest.feature_importances())
            .map(|(name, &importance)| (name.to_string(), importance))
            .collect();
        // Stable, so equal importances keep schema order
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        Some(ranked)
    }

    pub fn quality(&self) -> Option<f64> {
        self.trained.as_ref().map(|t| t.quality)
    }

    pub fn is_trained(&self) -> bool {
        self.trained.is_some()
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn small_config() -> ForestConfig {
        ForestConfig {
            n_trees: 10,
            ..ForestConfig::default()
        }
    }

    /// Diet footprints that depend on diet type only
    pub(crate) fn diet_samples() -> Vec<TrainingSample> {
        let diets = [("Vegan", 1.5), ("Vegetarian", 2.0), ("Pescatarian", 2.5), ("Omnivore", 3.0)];
        let screens = ["Less than 4 hours", "4-8 hours", "8-16 hours"];
        (0..24)
            .map(|i| {
                let (diet, footprint) = diets[i % diets.len()];
                let profile = UserProfile::new(format!("u{}", i))
                    .with("diet_type", diet)
                    .with("screen_time", screens[i % screens.len()])
                    .with("monthly_grocery_bill", 100.0 + (i * 10) as f64);
                TrainingSample::new(profile, footprint)
            })
            .collect()
    }

    fn diet_model() -> CategoryFootprintModel {
        CategoryFootprintModel::new(Category::Diet, ProfileSchema::lifestyle(), small_config()).unwrap()
    }

    #[test]
    fn test_untrained_model_is_unavailable() {
        let model = diet_model();
        assert!(!model.is_trained());
        assert!(model.quality().is_none());
        assert!(matches!(
            model.predict(&UserProfile::new("u")),
            Err(Error::ModelUnavailable { .. })
        ));
    }

    #[test]
    fn test_empty_training_leaves_model_untrained() {
        let mut model = diet_model();
        assert_eq!(model.train(&[]).unwrap(), 0.0);
        assert!(!model.is_trained());
        assert!(matches!(
            model.predict(&UserProfile::new("u")),
            Err(Error::ModelUnavailable { .. })
        ));
        assert!(model.state().unwrap().is_none());
    }

    #[test]
    fn test_train_and_predict() {
        let mut model = diet_model();
        let quality = model.train(&diet_samples()).unwrap();
        assert!(quality > 0.9, "quality {}", quality);

        let vegan = UserProfile::new("x").with("diet_type", "Vegan").with("screen_time", "4-8 hours");
        let omnivore = UserProfile::new("y").with("diet_type", "Omnivore").with("screen_time", "4-8 hours");
        let low = model.predict(&vegan).unwrap();
        let high = model.predict(&omnivore).unwrap();
        assert!((low - 1.5).abs() < 0.1, "vegan {}", low);
        assert!((high - 3.0).abs() < 0.1, "omnivore {}", high);

        let importances = model.feature_importances().unwrap();
        assert_eq!(importances[0].0, "diet_type");
        assert!((importances.iter().map(|(_, x)| x).sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_same_seed_same_predictions() {
        let samples = diet_samples();
        let mut a = diet_model();
        let mut b = diet_model();
        assert_eq!(a.train(&samples).unwrap(), b.train(&samples).unwrap());

        let probe = UserProfile::new("p").with("diet_type", "Pescatarian").with("monthly_grocery_bill", 175.0);
        assert_eq!(a.predict(&probe).unwrap(), b.predict(&probe).unwrap());
    }

    #[test]
    fn test_unseen_value_is_unavailable() {
        let mut model = diet_model();
        model.train(&diet_samples()).unwrap();

        // Seeded but never observed values are still known to the encoder
        let seeded = UserProfile::new("x").with("heating_source", "Coal");
        assert!(model.predict(&seeded).is_ok());

        let unseen = UserProfile::new("x").with("diet_type", "Flexitarian");
        match model.predict(&unseen) {
            Err(Error::ModelUnavailable { category, reason }) => {
                assert_eq!(category, "diet");
                assert!(reason.contains("Flexitarian"));
            }
            other => panic!("expected ModelUnavailable, got {:?}", other),
        }
    }

    #[test]
    fn test_small_training_set_scores_on_training_data() {
        let mut model = diet_model();
        let samples: Vec<TrainingSample> = diet_samples().into_iter().take(4).collect();
        let quality = model.train(&samples).unwrap();
        assert!(model.is_trained());
        assert!(quality <= 1.0);
    }

    #[test]
    fn test_non_finite_targets_skipped() {
        let mut model = diet_model();
        let mut samples = diet_samples();
        samples.push(TrainingSample::new(UserProfile::new("bad").with("diet_type", "Vegan"), f64::NAN));
        let quality = model.train(&samples).unwrap();
        assert!(quality.is_finite());
    }

    #[test]
    fn test_state_roundtrip_predicts_identically() {
        let mut model = diet_model();
        model.train(&diet_samples()).unwrap();
        let state = model.state().unwrap().unwrap();
        let restored = CategoryFootprintModel::from_state(state).unwrap();

        assert_eq!(restored.category(), Category::Diet);
        assert_eq!(restored.quality(), model.quality());
        let probe = UserProfile::new("p").with("diet_type", "Vegetarian").with("monthly_grocery_bill", 120.0);
        assert_eq!(restored.predict(&probe).unwrap(), model.predict(&probe).unwrap());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ForestConfig {
            n_trees: 0,
            ..ForestConfig::default()
        };
        assert!(CategoryFootprintModel::new(Category::Diet, ProfileSchema::lifestyle(), config).is_err());
    }
}
