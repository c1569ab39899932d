use crate::error::{Error, Result};
use crate::profile::UnknownAttributePolicy;
use crate::schema::{Polarity, ProfileSchema};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Random forest hyper-parameters for category footprint models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Share of samples held out to compute the quality score
    pub validation_fraction: f64,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: Some(12),
            min_samples_split: 2,
            min_samples_leaf: 1,
            validation_fraction: 0.2,
            seed: 42,
        }
    }
}

impl ForestConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_trees == 0 {
            return Err(Error::InvalidConfig("n_trees must be at least 1".into()));
        }
        if self.min_samples_leaf == 0 {
            return Err(Error::InvalidConfig("min_samples_leaf must be at least 1".into()));
        }
        if self.min_samples_split < 2 {
            return Err(Error::InvalidConfig("min_samples_split must be at least 2".into()));
        }
        if !(0.0..1.0).contains(&self.validation_fraction) {
            return Err(Error::InvalidConfig(format!(
                "validation_fraction must be in [0, 1), got {}",
                self.validation_fraction
            )));
        }
        Ok(())
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Neighbors consulted per recommendation request
    pub default_k: usize,
    pub unknown_attributes: UnknownAttributePolicy,
    /// Per-attribute overrides of the schema's recommendation polarity
    pub polarity: BTreeMap<String, Polarity>,
    pub forest: ForestConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_k: 5,
            unknown_attributes: UnknownAttributePolicy::default(),
            polarity: BTreeMap::new(),
            forest: ForestConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig =
            serde_json::from_str(json).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.forest.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Apply the polarity overrides to `schema`
    pub fn apply_to(&self, mut schema: ProfileSchema) -> Result<ProfileSchema> {
        for (attribute, polarity) in &self.polarity {
            schema.set_polarity(attribute, *polarity).map_err(|_| {
                Error::InvalidConfig(format!("polarity override for unknown attribute '{}'", attribute))
            })?;
        }
        Ok(schema)
    }
}
