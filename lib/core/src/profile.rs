use crate::error::{Error, Result};
use crate::schema::ProfileSchema;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

/// Raw attribute value as supplied by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Number(f64),
    Text(String),
}

impl AttributeValue {
    /// Text form used for vocabulary lookups. Whole numbers render without a
    /// fractional part so `3` and `3.0` share one code.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            AttributeValue::Text(s) => Cow::Borrowed(s.as_str()),
            AttributeValue::Number(n) => {
                if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
                    Cow::Owned(format!("{}", *n as i64))
                } else {
                    Cow::Owned(n.to_string())
                }
            }
        }
    }

    /// Numeric form; text is parsed after trimming
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(n) if n.is_finite() => Some(*n),
            AttributeValue::Number(_) => None,
            AttributeValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_text())
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Text(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::Text(s)
    }
}

impl From<f64> for AttributeValue {
    fn from(n: f64) -> Self {
        AttributeValue::Number(n)
    }
}

/// What to do with attributes that are not part of the schema
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnknownAttributePolicy {
    /// Drop them before encoding
    #[default]
    Ignore,
    /// Fail validation with [`Error::UnknownAttribute`]
    Reject,
}

/// A user's lifestyle answers, keyed by attribute name.
///
/// Serialized flat, e.g. `{"userId": "u1", "diet_type": "Vegan"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(alias = "userId")]
    pub user_id: String,

    #[serde(flatten)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl UserProfile {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style attribute setter
    pub fn with(mut self, name: &str, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Text of a categorical answer, if present
    pub fn text(&self, name: &str) -> Option<Cow<'_, str>> {
        self.attributes.get(name).map(AttributeValue::as_text)
    }

    /// Apply the unknown-attribute policy against `schema`.
    ///
    /// Returns the profile restricted to schema attributes, or
    /// [`Error::UnknownAttribute`] for the first foreign attribute under
    /// [`UnknownAttributePolicy::Reject`].
    pub fn validated(&self, schema: &ProfileSchema, policy: UnknownAttributePolicy) -> Result<UserProfile> {
        let mut attributes = BTreeMap::new();
        for (name, value) in &self.attributes {
            if schema.position(name).is_some() {
                attributes.insert(name.clone(), value.clone());
            } else if policy == UnknownAttributePolicy::Reject {
                return Err(Error::UnknownAttribute(name.clone()));
            } else {
                tracing::debug!(user = %self.user_id, attribute = %name, "ignoring unknown attribute");
            }
        }
        Ok(UserProfile {
            user_id: self.user_id.clone(),
            attributes,
        })
    }
}
