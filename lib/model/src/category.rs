use ecoprint_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Footprint category with its own model and rule table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Diet,
    Transportation,
    Housing,
    Lifestyle,
    Waste,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Diet,
        Category::Transportation,
        Category::Housing,
        Category::Lifestyle,
        Category::Waste,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Diet => "diet",
            Category::Transportation => "transportation",
            Category::Housing => "housing",
            Category::Lifestyle => "lifestyle",
            Category::Waste => "waste",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidConfig(format!("unknown footprint category '{}'", s)))
    }
}
