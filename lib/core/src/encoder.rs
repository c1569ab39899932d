//! Feature encoder
//!
//! Turns a [`UserProfile`] into a fixed-length [`Vector`], one slot per schema
//! attribute:
//!
//! - categorical slots hold the vocabulary code of the answer
//! - numeric slots hold the value, standardized once a scaler has been fitted
//! - missing answers hold 0.0, which is the code of the first vocabulary entry
//!
//! Vocabulary growth is the only mutation. Lookups run under a read lock; an
//! unseen value is appended under the write lock after a second lookup, so two
//! threads seeing the same new value at once still agree on one code.

use crate::error::{Error, Result};
use crate::profile::{AttributeValue, UserProfile};
use crate::schema::{AttributeKind, ProfileSchema};
use crate::vector::Vector;
use crate::vocabulary::AttributeVocabulary;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Mean and standard deviation of one numeric slot
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScaleParams {
    pub mean: f64,
    pub std: f64,
}

/// Standardization parameters, fitted once over a reference batch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NumericScaler {
    /// One entry per slot, `None` for categorical slots
    params: Vec<Option<ScaleParams>>,
}

impl NumericScaler {
    pub fn fit(schema: &ProfileSchema, profiles: &[UserProfile]) -> Self {
        let params = schema
            .attributes
            .iter()
            .map(|spec| {
                if !spec.is_numeric() {
                    return None;
                }
                let values: Vec<f64> = profiles
                    .iter()
                    .filter_map(|p| p.get(&spec.name).and_then(AttributeValue::as_number))
                    .collect();
                if values.is_empty() {
                    return Some(ScaleParams { mean: 0.0, std: 1.0 });
                }
                let n = values.len() as f64;
                let mean = values.iter().sum::<f64>() / n;
                let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
                let std = variance.sqrt();
                Some(ScaleParams {
                    mean,
                    std: if std > f64::EPSILON { std } else { 1.0 },
                })
            })
            .collect();

        Self { params }
    }

    pub fn params(&self, slot: usize) -> Option<ScaleParams> {
        self.params.get(slot).copied().flatten()
    }

    fn apply(&self, slot: usize, x: f64) -> f64 {
        match self.params(slot) {
            Some(p) => (x - p.mean) / p.std,
            None => x,
        }
    }
}

/// Serializable snapshot of an encoder
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncoderState {
    pub schema: ProfileSchema,
    pub vocabularies: Vec<AttributeVocabulary>,
    pub scaler: Option<NumericScaler>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Growth {
    Append,
    Frozen,
}

#[derive(Debug)]
struct Layout {
    schema: ProfileSchema,
    /// One vocabulary per slot; numeric slots keep an empty one
    vocabularies: RwLock<Vec<AttributeVocabulary>>,
    scaler: OnceLock<NumericScaler>,
}

impl Layout {
    fn new(schema: ProfileSchema) -> Self {
        let vocabularies = schema
            .attributes
            .iter()
            .map(|spec| match &spec.kind {
                AttributeKind::Categorical { vocabulary } => AttributeVocabulary::seeded(vocabulary),
                AttributeKind::Numeric => AttributeVocabulary::new(),
            })
            .collect();

        Self {
            schema,
            vocabularies: RwLock::new(vocabularies),
            scaler: OnceLock::new(),
        }
    }

    fn encode(&self, profile: &UserProfile, growth: Growth) -> Result<Vector> {
        self.encode_scaled(profile, growth, self.scaler.get())
    }

    fn encode_scaled(&self, profile: &UserProfile, growth: Growth, scaler: Option<&NumericScaler>) -> Result<Vector> {
        let mut data = vec![0.0f32; self.schema.dim()];
        let mut unseen: Vec<(usize, String)> = Vec::new();

        {
            let vocabularies = self.vocabularies.read();
            for (slot, spec) in self.schema.attributes.iter().enumerate() {
                let Some(value) = profile.get(&spec.name) else {
                    continue;
                };

                match spec.kind {
                    AttributeKind::Categorical { .. } => {
                        let raw = value.as_text();
                        if raw.trim().is_empty() {
                            continue;
                        }
                        match vocabularies[slot].code_of(&raw) {
                            Some(code) => data[slot] = code as f32,
                            None if growth == Growth::Append => unseen.push((slot, raw.into_owned())),
                            None => {
                                return Err(Error::UnseenCategoryValue {
                                    attribute: spec.name.clone(),
                                    value: raw.into_owned(),
                                })
                            }
                        }
                    }
                    AttributeKind::Numeric => match value.as_number() {
                        Some(x) => {
                            let scaled = match scaler {
                                Some(scaler) => scaler.apply(slot, x),
                                None => x,
                            };
                            data[slot] = scaled as f32;
                        }
                        None => {
                            tracing::warn!(
                                user = %profile.user_id,
                                attribute = %spec.name,
                                value = %value,
                                "unparseable numeric value treated as missing"
                            );
                        }
                    },
                }
            }
        }

        if !unseen.is_empty() {
            let mut vocabularies = self.vocabularies.write();
            for (slot, raw) in unseen {
                let (code, inserted) = vocabularies[slot].get_or_insert(&raw);
                if inserted {
                    tracing::debug!(
                        attribute = %self.schema.attributes[slot].name,
                        value = %raw,
                        code,
                        "vocabulary grew"
                    );
                }
                data[slot] = code as f32;
            }
        }

        Ok(Vector::new(data))
    }
}

/// Profile to vector encoder with append-only vocabularies
#[derive(Debug, Default)]
pub struct FeatureEncoder {
    layout: OnceLock<Layout>,
}

impl FeatureEncoder {
    pub fn new(schema: ProfileSchema) -> Result<Self> {
        let encoder = Self::default();
        encoder.set_schema(schema)?;
        Ok(encoder)
    }

    /// Initialize an encoder created with `default()`. The attribute order can
    /// be set only once.
    pub fn set_schema(&self, schema: ProfileSchema) -> Result<()> {
        schema.validate()?;
        self.layout
            .set(Layout::new(schema))
            .map_err(|_| Error::InvalidSchema("encoder schema is already set".into()))
    }

    pub fn from_state(state: EncoderState) -> Result<Self> {
        state.schema.validate()?;
        if state.vocabularies.len() != state.schema.dim() {
            return Err(Error::InvalidSchema(format!(
                "expected {} vocabularies, got {}",
                state.schema.dim(),
                state.vocabularies.len()
            )));
        }

        let layout = Layout {
            schema: state.schema,
            vocabularies: RwLock::new(state.vocabularies),
            scaler: OnceLock::new(),
        };
        if let Some(scaler) = state.scaler {
            let _ = layout.scaler.set(scaler);
        }

        let encoder = Self::default();
        let _ = encoder.layout.set(layout);
        Ok(encoder)
    }

    fn layout(&self) -> Result<&Layout> {
        self.layout.get().ok_or(Error::SchemaUndefined)
    }

    pub fn is_initialized(&self) -> bool {
        self.layout.get().is_some()
    }

    pub fn schema(&self) -> Result<&ProfileSchema> {
        Ok(&self.layout()?.schema)
    }

    pub fn dim(&self) -> Result<usize> {
        Ok(self.layout()?.schema.dim())
    }

    /// Attribute names in slot order
    pub fn attribute_names(&self) -> Result<Vec<&str>> {
        Ok(self.layout()?.schema.attribute_names())
    }

    /// Encode, appending unseen categorical values to the vocabulary
    pub fn encode(&self, profile: &UserProfile) -> Result<Vector> {
        self.layout()?.encode(profile, Growth::Append)
    }

    /// Encode without growing; an unseen value fails with
    /// [`Error::UnseenCategoryValue`]
    pub fn encode_frozen(&self, profile: &UserProfile) -> Result<Vector> {
        self.layout()?.encode(profile, Growth::Frozen)
    }

    pub fn encode_batch(&self, profiles: &[UserProfile]) -> Result<Vec<Vector>> {
        let layout = self.layout()?;
        profiles
            .iter()
            .map(|p| layout.encode(p, Growth::Append))
            .collect()
    }

    /// Fit the numeric scaler over `profiles`. Only the first call with a
    /// non-empty batch has an effect; returns whether this call fitted it.
    pub fn fit_scaler(&self, profiles: &[UserProfile]) -> Result<bool> {
        let layout = self.layout()?;
        if layout.scaler.get().is_some() || profiles.is_empty() {
            return Ok(false);
        }
        let scaler = NumericScaler::fit(&layout.schema, profiles);
        Ok(layout.scaler.set(scaler).is_ok())
    }

    /// Encode with growth, scaling numeric slots by `scaler` instead of the
    /// fitted one. Lets a caller try a scaler before committing it with
    /// [`install_scaler`](Self::install_scaler).
    pub fn encode_with_scaler(&self, profile: &UserProfile, scaler: &NumericScaler) -> Result<Vector> {
        self.layout()?.encode_scaled(profile, Growth::Append, Some(scaler))
    }

    /// Freeze `scaler` as the reference unless one is already fitted;
    /// returns whether it was installed.
    pub fn install_scaler(&self, scaler: NumericScaler) -> Result<bool> {
        Ok(self.layout()?.scaler.set(scaler).is_ok())
    }

    pub fn scaler(&self) -> Option<NumericScaler> {
        self.layout.get().and_then(|l| l.scaler.get().cloned())
    }

    pub fn code_of(&self, attribute: &str, raw: &str) -> Option<u32> {
        let layout = self.layout.get()?;
        let slot = layout.schema.position(attribute)?;
        layout.vocabularies.read()[slot].code_of(raw)
    }

    pub fn vocabulary(&self, attribute: &str) -> Option<AttributeVocabulary> {
        let layout = self.layout.get()?;
        let slot = layout.schema.position(attribute)?;
        Some(layout.vocabularies.read()[slot].clone())
    }

    pub fn state(&self) -> Result<EncoderState> {
        let layout = self.layout()?;
        Ok(EncoderState {
            schema: layout.schema.clone(),
            vocabularies: layout.vocabularies.read().clone(),
            scaler: layout.scaler.get().cloned(),
        })
    }
}
