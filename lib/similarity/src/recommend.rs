//! Neighbor-based recommendations
//!
//! For each of a user's nearest neighbors, every attribute where the neighbor's
//! encoded value is strictly better than the user's becomes one
//! [`Recommendation`]. "Better" follows the attribute's [`Polarity`]; with the
//! default lower-is-better polarity this relies on vocabularies being ordered
//! from most to least sustainable, which is a modeling assumption and not a
//! universal truth.

use crate::index::UserSimilarityIndex;
use ecoprint_core::{Error, Polarity, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One actionable difference between a user and a similar user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Attribute name
    pub feature: String,
    /// The neighbor the suggestion comes from
    pub neighbor_id: String,
    /// Cosine similarity of that neighbor, in [-1, 1]
    pub similarity_score: f32,
    /// Distance between the two encoded values, positive in the favorable
    /// direction of the attribute
    pub improvement_potential: f32,
    /// Encoded value of the user
    pub user_value: f32,
    /// Encoded value of the neighbor
    pub neighbor_value: f32,
}

/// Recommendation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecommendationStats {
    pub requests: u64,
    pub empty_results: u64,
    pub not_indexed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    requests: AtomicU64,
    empty_results: AtomicU64,
    not_indexed: AtomicU64,
}

/// Derives recommendations from the similarity index
pub struct RecommendationGenerator {
    index: Arc<UserSimilarityIndex>,
    /// (attribute, polarity) in slot order
    attributes: Vec<(String, Polarity)>,
    counters: Counters,
}

impl RecommendationGenerator {
    /// Fails with [`Error::SchemaUndefined`] when the index's encoder has no
    /// schema yet.
    pub fn new(index: Arc<UserSimilarityIndex>) -> Result<Self> {
        let attributes = index
            .encoder()
            .schema()?
            .attributes
            .iter()
            .map(|spec| (spec.name.clone(), spec.polarity))
            .collect();

        Ok(Self {
            index,
            attributes,
            counters: Counters::default(),
        })
    }

    pub fn index(&self) -> &Arc<UserSimilarityIndex> {
        &self.index
    }

    /// Suggestions from up to `k` nearest neighbors of `user_id`.
    ///
    /// Ordered by neighbor (most similar first), then by attribute slot. The
    /// same attribute may appear once per neighbor. An unknown user or a user
    /// without better-scoring neighbors yields an empty list.
    pub fn recommend(&self, user_id: &str, k: usize) -> Vec<Recommendation> {
        self.counters.requests.fetch_add(1, Ordering::Relaxed);

        // One snapshot for the whole request
        let snapshot = self.index.snapshot();

        let neighbors = match snapshot.neighbors(user_id, k) {
            Ok(neighbors) => neighbors,
            Err(Error::UserNotIndexed(_)) => {
                self.counters.not_indexed.fetch_add(1, Ordering::Relaxed);
                self.counters.empty_results.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(user = %user_id, "no recommendations yet: user not indexed");
                return Vec::new();
            }
            Err(e) => {
                self.counters.empty_results.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(user = %user_id, error = %e, "neighbor lookup failed");
                return Vec::new();
            }
        };

        let Some(user_vector) = snapshot.vector(user_id) else {
            self.counters.empty_results.fetch_add(1, Ordering::Relaxed);
            return Vec::new();
        };

        let mut recommendations = Vec::new();
        for neighbor in &neighbors {
            let Some(neighbor_vector) = snapshot.vector_at(neighbor.row) else {
                continue;
            };

            let pairs = user_vector.as_slice().iter().zip(neighbor_vector.as_slice());
            for ((name, polarity), (&mine, &theirs)) in self.attributes.iter().zip(pairs) {
                if polarity.is_improvement(mine, theirs) {
                    recommendations.push(Recommendation {
                        feature: name.clone(),
                        neighbor_id: neighbor.user_id.clone(),
                        similarity_score: neighbor.similarity,
                        improvement_potential: polarity.gain(mine, theirs),
                        user_value: mine,
                        neighbor_value: theirs,
                    });
                }
            }
        }

        if recommendations.is_empty() {
            self.counters.empty_results.fetch_add(1, Ordering::Relaxed);
        }
        tracing::debug!(
            user = %user_id,
            neighbors = neighbors.len(),
            recommendations = recommendations.len(),
            "recommendations computed"
        );

        recommendations
    }

    pub fn stats(&self) -> RecommendationStats {
        RecommendationStats {
            requests: self.counters.requests.load(Ordering::Relaxed),
            empty_results: self.counters.empty_results.load(Ordering::Relaxed),
            not_indexed: self.counters.not_indexed.load(Ordering::Relaxed),
        }
    }
}
