//! Explainability for recommendations
//!
//! Turns encoded recommendations back into user-facing sentences and summary
//! statistics.

use crate::recommend::Recommendation;
use ecoprint_core::{FeatureEncoder, Polarity};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Formats recommendations using the encoder's labels and vocabularies
#[derive(Clone)]
pub struct Explainer {
    encoder: Arc<FeatureEncoder>,
}

impl Explainer {
    pub fn new(encoder: Arc<FeatureEncoder>) -> Self {
        Self { encoder }
    }

    /// One sentence for `rec`, e.g.
    /// `Similar users with 80.0% similarity have reduced their diet impact by 1.0 units (they chose "Vegetarian")`
    pub fn describe(&self, rec: &Recommendation) -> String {
        let spec = self
            .encoder
            .schema()
            .ok()
            .and_then(|schema| schema.get(&rec.feature));

        let label = spec.map_or_else(|| rec.feature.replace('_', " "), |s| s.display_label());
        let mut sentence = format!(
            "Similar users with {:.1}% similarity have {} their {} impact by {:.1} units",
            rec.similarity_score * 100.0,
            match spec.map(|s| s.polarity) {
                Some(Polarity::HigherIsBetter) => "improved",
                _ => "reduced",
            },
            label,
            rec.improvement_potential
        );

        if spec.is_some_and(|s| !s.is_numeric()) {
            if let Some(value) = self.decode(&rec.feature, rec.neighbor_value) {
                sentence.push_str(&format!(" (they chose \"{}\")", value));
            }
        }
        sentence
    }

    pub fn describe_all(&self, recs: &[Recommendation]) -> Vec<String> {
        recs.iter().map(|r| self.describe(r)).collect()
    }

    /// Vocabulary value behind an encoded categorical slot value
    pub fn decode(&self, attribute: &str, encoded: f32) -> Option<String> {
        if encoded < 0.0 || encoded.fract() != 0.0 {
            return None;
        }
        let vocabulary = self.encoder.vocabulary(attribute)?;
        vocabulary.value(encoded as u32).map(str::to_string)
    }
}

/// Summary statistics for one recommendation request
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RecommendationSummary {
    /// Number of recommendations returned
    pub results_count: usize,
    /// Distinct neighbors contributing at least one recommendation
    pub neighbors_count: usize,
    /// Mean similarity over the recommendations
    pub avg_similarity: f32,
    pub best_similarity: f32,
    /// Feature with the largest summed improvement potential
    pub top_feature: Option<String>,
}

impl RecommendationSummary {
    pub fn compute(recs: &[Recommendation]) -> Self {
        if recs.is_empty() {
            return Self {
                results_count: 0,
                neighbors_count: 0,
                avg_similarity: 0.0,
                best_similarity: 0.0,
                top_feature: None,
            };
        }

        let avg_similarity = recs.iter().map(|r| r.similarity_score).sum::<f32>() / recs.len() as f32;
        // Results are ordered by neighbor, most similar first
        let best_similarity = recs[0].similarity_score;

        let mut neighbors: Vec<&str> = recs.iter().map(|r| r.neighbor_id.as_str()).collect();
        neighbors.sort_unstable();
        neighbors.dedup();

        let mut totals: BTreeMap<&str, f32> = BTreeMap::new();
        for rec in recs {
            *totals.entry(rec.feature.as_str()).or_default() += rec.improvement_potential;
        }
        let top_feature = totals
            .into_iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(name, _)| name.to_string());

        Self {
            results_count: recs.len(),
            neighbors_count: neighbors.len(),
            avg_similarity,
            best_similarity,
            top_feature,
        }
    }
}
