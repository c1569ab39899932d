//! Profile schema definitions
//!
//! The schema fixes the attribute order shared by every consumer of an encoded
//! vector (encoder, similarity index, recommender). Slot `i` of every vector is
//! always attribute `i` of the schema.

use crate::error::{Error, Result};
use crate::vocabulary::canonical_key;
use ahash::AHashSet;
use serde::{Deserialize, Serialize};

/// Ordered attribute schema for lifestyle profiles
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileSchema {
    /// Schema version for future compatibility
    #[serde(default = "default_version")]
    pub version: u32,

    /// Attributes in slot order
    pub attributes: Vec<AttributeSpec>,
}

fn default_version() -> u32 {
    1
}

impl ProfileSchema {
    pub fn new(attributes: Vec<AttributeSpec>) -> Self {
        Self {
            version: 1,
            attributes,
        }
    }

    /// Validate the schema
    /// - At least one attribute
    /// - Attribute names unique
    /// - Seeded vocabularies free of duplicates (after canonicalization)
    pub fn validate(&self) -> Result<()> {
        if self.attributes.is_empty() {
            return Err(Error::InvalidSchema("schema has no attributes".into()));
        }

        let mut names = AHashSet::new();
        for spec in &self.attributes {
            if spec.name.trim().is_empty() {
                return Err(Error::InvalidSchema("attribute name cannot be empty".into()));
            }
            if !names.insert(spec.name.as_str()) {
                return Err(Error::InvalidSchema(format!(
                    "duplicate attribute '{}'",
                    spec.name
                )));
            }
            if let AttributeKind::Categorical { vocabulary } = &spec.kind {
                let mut seen = AHashSet::new();
                for value in vocabulary {
                    if !seen.insert(canonical_key(value)) {
                        return Err(Error::InvalidSchema(format!(
                            "attribute '{}' lists '{}' twice",
                            spec.name, value
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    /// Number of slots in every encoded vector
    pub fn dim(&self) -> usize {
        self.attributes.len()
    }

    pub fn attribute_names(&self) -> Vec<&str> {
        self.attributes.iter().map(|a| a.name.as_str()).collect()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&AttributeSpec> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Override the recommendation polarity of one attribute
    pub fn set_polarity(&mut self, name: &str, polarity: Polarity) -> Result<()> {
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(spec) => {
                spec.polarity = polarity;
                Ok(())
            }
            None => Err(Error::UnknownAttribute(name.to_string())),
        }
    }

    /// The lifestyle questionnaire schema.
    ///
    /// Categorical vocabularies are seeded in ascending footprint order, so the
    /// first value of each list gets code 0 and is the most sustainable choice
    /// under the default [`Polarity::LowerIsBetter`]. This ordering is a modeling
    /// assumption carried over from the questionnaire's scoring tables, not a
    /// measured fact; override it per attribute when it does not hold.
    pub fn lifestyle() -> Self {
        let hours = ["Less than 4 hours", "4-8 hours", "8-16 hours", "More than 16 hours"];
        Self::new(vec![
            AttributeSpec::categorical("diet_type", ["Vegan", "Vegetarian", "Pescatarian", "Omnivore"])
                .with_label("diet"),
            AttributeSpec::categorical(
                "transportation_mode",
                ["Walking/Bicycle", "Public transport", "Private car"],
            )
            .with_label("transportation habits"),
            AttributeSpec::categorical(
                "vehicle_type",
                ["I don't own a vehicle", "Electric", "Diesel", "Petrol"],
            )
            .with_label("vehicle"),
            AttributeSpec::categorical(
                "heating_source",
                ["Electricity", "Natural gas", "Wood", "Coal"],
            )
            .with_label("heating source"),
            AttributeSpec::categorical("home_energy_efficiency", ["Yes", "Sometimes", "No"])
                .with_label("home energy efficiency"),
            AttributeSpec::categorical(
                "shower_frequency",
                ["Less frequently", "Daily", "Twice a day", "More frequently"],
            )
            .with_label("shower frequency"),
            AttributeSpec::categorical("screen_time", hours).with_label("screen time"),
            AttributeSpec::categorical("internet_usage", hours).with_label("internet usage"),
            AttributeSpec::categorical("clothes_purchases", ["0-10", "11-20", "21-30", "31+"])
                .with_label("clothes purchases"),
            AttributeSpec::categorical(
                "recycling",
                ["Paper", "Plastic", "Glass", "Metal", "I do not recycle"],
            )
            .with_label("recycling"),
            AttributeSpec::categorical("trash_bag_size", ["Small", "Medium", "Large", "Extra large"])
                .with_label("trash bag size"),
            AttributeSpec::numeric("monthly_grocery_bill").with_label("grocery spending"),
            AttributeSpec::numeric("vehicle_monthly_distance_km").with_label("monthly driving distance"),
            AttributeSpec::numeric("waste_bag_weekly_count").with_label("weekly waste bags"),
        ])
    }
}

/// One slot of the encoded vector
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttributeSpec {
    pub name: String,

    #[serde(flatten)]
    pub kind: AttributeKind,

    #[serde(default)]
    pub polarity: Polarity,

    /// Human readable name used in explanations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl AttributeSpec {
    pub fn categorical<I, S>(name: &str, vocabulary: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            kind: AttributeKind::Categorical {
                vocabulary: vocabulary.into_iter().map(Into::into).collect(),
            },
            polarity: Polarity::default(),
            label: None,
        }
    }

    pub fn numeric(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: AttributeKind::Numeric,
            polarity: Polarity::default(),
            label: None,
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn with_polarity(mut self, polarity: Polarity) -> Self {
        self.polarity = polarity;
        self
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.kind, AttributeKind::Numeric)
    }

    pub fn display_label(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => self.name.replace('_', " "),
        }
    }
}

/// How raw values of an attribute become a slot value
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AttributeKind {
    /// Closed documented vocabulary; unseen values are appended at run time
    Categorical {
        #[serde(default)]
        vocabulary: Vec<String>,
    },
    /// Free-form float, optionally standardized
    Numeric,
}

/// Which direction of an encoded value counts as the more sustainable choice
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    #[default]
    LowerIsBetter,
    HigherIsBetter,
}

impl Polarity {
    /// True when `candidate` is strictly better than `current`
    pub fn is_improvement(self, current: f32, candidate: f32) -> bool {
        match self {
            Polarity::LowerIsBetter => candidate < current,
            Polarity::HigherIsBetter => candidate > current,
        }
    }

    /// Size of the improvement, positive when `candidate` is better
    pub fn gain(self, current: f32, candidate: f32) -> f32 {
        match self {
            Polarity::LowerIsBetter => current - candidate,
            Polarity::HigherIsBetter => candidate - current,
        }
    }
}
