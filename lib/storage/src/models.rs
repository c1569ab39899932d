// Trained model persistence: one file per category
use anyhow::{anyhow, bail, Context, Result};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use chrono::{DateTime, Utc};
use ecoprint_core::ProfileSchema;
use ecoprint_model::{Category, CategoryFootprintModel, CategoryModelState, FootprintEstimator};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Bumped whenever the stored model layout changes
pub const FORMAT_VERSION: u32 = 1;

const EXTENSION: &str = "model";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelFileHeader {
    format_version: u32,
    category: Category,
    quality: f64,
    saved_at: DateTime<Utc>,
    /// Hex SHA-256 of the payload
    checksum: String,
}

/// On-disk envelope. The model state itself is JSON because its schema uses
/// tagged and flattened enums the bincode format cannot express.
#[derive(Debug, Serialize, Deserialize)]
struct ModelFile {
    header: ModelFileHeader,
    payload: Vec<u8>,
}

/// Stored model description for listings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredModel {
    pub category: Category,
    pub quality: f64,
    pub saved_at: DateTime<Utc>,
    pub size: u64,
    pub checksum: String,
}

/// Directory of trained category models
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).with_context(|| format!("creating model directory {:?}", dir))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, category: Category) -> PathBuf {
        self.dir.join(format!("{}.{}", category, EXTENSION))
    }

    /// Write one model. Untrained models are skipped; returns whether a file
    /// was written.
    pub fn save_model(&self, model: &CategoryFootprintModel) -> Result<bool> {
        let Some(state) = model.state()? else {
            return Ok(false);
        };

        let payload = serde_json::to_vec(&state)?;
        let file = ModelFile {
            header: ModelFileHeader {
                format_version: FORMAT_VERSION,
                category: state.category,
                quality: state.quality,
                saved_at: Utc::now(),
                checksum: format!("{:x}", Sha256::digest(&payload)),
            },
            payload,
        };
        let data = bincode::serialize(&file).map_err(|e| anyhow!("Serialization error: {}", e))?;

        let path = self.path_for(state.category);
        AtomicFile::new(&path, OverwriteBehavior::AllowOverwrite)
            .write(|f| f.write_all(&data))
            .with_context(|| format!("writing {:?}", path))?;

        tracing::info!(category = %state.category, path = ?path, bytes = data.len(), "model saved");
        Ok(true)
    }

    /// Write every trained model of `estimator`; returns how many were saved
    pub fn save(&self, estimator: &FootprintEstimator) -> Result<usize> {
        let mut saved = 0;
        for category in Category::ALL {
            if let Some(model) = estimator.model(category) {
                if self.save_model(&model)? {
                    saved += 1;
                }
            }
        }
        Ok(saved)
    }

    fn read_file(&self, path: &Path) -> Result<ModelFile> {
        let data = fs::read(path).with_context(|| format!("reading {:?}", path))?;
        let file: ModelFile =
            bincode::deserialize(&data).map_err(|e| anyhow!("Deserialization error in {:?}: {}", path, e))?;

        if file.header.format_version != FORMAT_VERSION {
            bail!(
                "{:?} has format version {}, expected {}",
                path,
                file.header.format_version,
                FORMAT_VERSION
            );
        }
        let checksum = format!("{:x}", Sha256::digest(&file.payload));
        if checksum != file.header.checksum {
            bail!("{:?} is corrupt: checksum mismatch", path);
        }
        Ok(file)
    }

    /// Restore the stored model of `category`, if any
    pub fn load(&self, category: Category) -> Result<Option<CategoryFootprintModel>> {
        let path = self.path_for(category);
        if !path.exists() {
            return Ok(None);
        }

        let file = self.read_file(&path)?;
        if file.header.category != category {
            bail!("{:?} holds a {} model", path, file.header.category);
        }
        let state: CategoryModelState = serde_json::from_slice(&file.payload)?;
        let model = CategoryFootprintModel::from_state(state)?;
        Ok(Some(model))
    }

    /// Install every stored model into `estimator`; returns how many were
    /// restored
    pub fn load_into(&self, estimator: &FootprintEstimator) -> Result<usize> {
        let mut restored = 0;
        for category in Category::ALL {
            let Some(model) = self.load(category)? else {
                continue;
            };
            let compatible = model_schema(&model).is_ok_and(|schema| same_layout(&schema, estimator.schema()));
            if !compatible {
                tracing::warn!(%category, "stored model was trained on a different attribute layout; skipped");
                continue;
            }
            estimator.install(model);
            restored += 1;
        }
        tracing::info!(restored, dir = ?self.dir, "models restored");
        Ok(restored)
    }

    /// Describe the stored models, in category order
    pub fn list(&self) -> Result<Vec<StoredModel>> {
        let mut stored = Vec::new();
        for category in Category::ALL {
            let path = self.path_for(category);
            if !path.exists() {
                continue;
            }
            let size = fs::metadata(&path)?.len();
            let header = self.read_file(&path)?.header;
            stored.push(StoredModel {
                category: header.category,
                quality: header.quality,
                saved_at: header.saved_at,
                size,
                checksum: header.checksum,
            });
        }
        Ok(stored)
    }

    /// Delete the stored model of `category`; returns whether one existed
    pub fn remove(&self, category: Category) -> Result<bool> {
        let path = self.path_for(category);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).with_context(|| format!("removing {:?}", path))?;
        Ok(true)
    }
}

fn model_schema(model: &CategoryFootprintModel) -> Result<ProfileSchema> {
    let state = model.state()?.ok_or_else(|| anyhow!("model is not trained"))?;
    Ok(state.encoder.schema)
}

/// Same attributes in the same slots. Polarity and labels do not affect the
/// encoded vectors.
fn same_layout(a: &ProfileSchema, b: &ProfileSchema) -> bool {
    a.attributes.len() == b.attributes.len()
        && a
            .attributes
            .iter()
            .zip(&b.attributes)
            .all(|(x, y)| x.name == y.name && x.kind == y.kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecoprint_core::{AttributeSpec, ForestConfig, Polarity, UserProfile};
    use ecoprint_model::TrainingSample;
    use tempfile::TempDir;

    fn estimator() -> FootprintEstimator {
        let config = ForestConfig {
            n_trees: 8,
            ..ForestConfig::default()
        };
        FootprintEstimator::new(ProfileSchema::lifestyle(), config).unwrap()
    }

    fn samples() -> Vec<TrainingSample> {
        let diets = [("Vegan", 1.5), ("Vegetarian", 2.0), ("Omnivore", 3.0)];
        (0..18)
            .map(|i| {
                let (diet, footprint) = diets[i % diets.len()];
                let profile = UserProfile::new(format!("u{}", i))
                    .with("diet_type", diet)
                    .with("monthly_grocery_bill", 50.0 * (i % 4) as f64);
                TrainingSample::new(profile, footprint)
            })
            .collect()
    }

    #[test]
    fn test_save_and_restore_predict_identically() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path()).unwrap();

        let original = estimator();
        original.train(Category::Diet, &samples()).unwrap();
        original.train(Category::Waste, &samples()).unwrap();
        assert_eq!(store.save(&original).unwrap(), 2);
        assert!(store.path_for(Category::Diet).exists());

        let restored = estimator();
        assert_eq!(store.load_into(&restored).unwrap(), 2);
        assert_eq!(restored.trained_categories(), vec![Category::Diet, Category::Waste]);

        let probe = UserProfile::new("p")
            .with("diet_type", "Vegetarian")
            .with("monthly_grocery_bill", 75.0);
        assert_eq!(
            restored.predict(Category::Diet, &probe).unwrap(),
            original.predict(Category::Diet, &probe).unwrap()
        );
        assert_eq!(restored.estimate(&probe), original.estimate(&probe));
    }

    #[test]
    fn test_models_from_another_layout_are_skipped() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path()).unwrap();

        let schema = ProfileSchema::new(vec![
            AttributeSpec::numeric("monthly_grocery_bill"),
            AttributeSpec::categorical("diet_type", ["Vegan", "Vegetarian", "Omnivore"]),
        ]);
        let foreign = FootprintEstimator::new(schema, ForestConfig::default()).unwrap();
        foreign.train(Category::Diet, &samples()).unwrap();
        assert_eq!(store.save(&foreign).unwrap(), 1);

        let restored = estimator();
        assert_eq!(store.load_into(&restored).unwrap(), 0);
        assert!(restored.model(Category::Diet).is_none());
        let probe = UserProfile::new("p").with("diet_type", "Vegan");
        assert_eq!(restored.estimate(&probe).get(Category::Diet), 1.5);
    }

    #[test]
    fn test_polarity_difference_still_restores() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path()).unwrap();

        let mut schema = ProfileSchema::lifestyle();
        schema.attributes[0].polarity = Polarity::HigherIsBetter;
        let original = FootprintEstimator::new(schema, ForestConfig::default()).unwrap();
        original.train(Category::Diet, &samples()).unwrap();
        store.save(&original).unwrap();

        assert_eq!(store.load_into(&estimator()).unwrap(), 1);
    }

    #[test]
    fn test_untrained_models_are_not_saved() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path()).unwrap();

        let estimator = estimator();
        estimator.train(Category::Housing, &[]).unwrap();
        assert_eq!(store.save(&estimator).unwrap(), 0);
        assert!(store.list().unwrap().is_empty());
        assert!(store.load(Category::Housing).unwrap().is_none());
    }

    #[test]
    fn test_list_and_remove() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path()).unwrap();

        let estimator = estimator();
        let quality = estimator.train(Category::Lifestyle, &samples()).unwrap();
        store.save(&estimator).unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].category, Category::Lifestyle);
        assert_eq!(listed[0].quality, quality);
        assert_eq!(listed[0].checksum.len(), 64);
        assert!(listed[0].size > 0);

        assert!(store.remove(Category::Lifestyle).unwrap());
        assert!(!store.remove(Category::Lifestyle).unwrap());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path()).unwrap();

        let estimator = estimator();
        estimator.train(Category::Diet, &samples()).unwrap();
        store.save(&estimator).unwrap();

        let path = store.path_for(Category::Diet);
        let mut data = fs::read(&path).unwrap();
        let last = data.len() - 1;
        data[last] ^= 0xff;
        fs::write(&path, &data).unwrap();

        assert!(store.load(Category::Diet).is_err());
    }

    #[test]
    fn test_version_mismatch_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path()).unwrap();

        let payload = b"{}".to_vec();
        let file = ModelFile {
            header: ModelFileHeader {
                format_version: FORMAT_VERSION + 1,
                category: Category::Diet,
                quality: 0.5,
                saved_at: Utc::now(),
                checksum: format!("{:x}", Sha256::digest(&payload)),
            },
            payload,
        };
        fs::write(store.path_for(Category::Diet), bincode::serialize(&file).unwrap()).unwrap();

        let err = store.load(Category::Diet).unwrap_err();
        assert!(err.to_string().contains("format version"));
    }

    #[test]
    fn test_empty_directory_restores_nothing() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path().join("nested")).unwrap();
        assert_eq!(store.load_into(&estimator()).unwrap(), 0);
    }
}
