//! # Ecoprint Similarity
//!
//! Cross-user similarity and neighbor-based recommendations.
//!
//! ## Features
//!
//! - **Similarity Index**: Pairwise cosine similarity over all encoded profiles,
//!   published as an immutable snapshot
//! - **Background Rebuilds**: Profile changes coalesce into at most one extra pass
//! - **Recommendations**: Attributes where similar users do better
//! - **Explainability**: Readable sentences and per-request summaries
//!
//! ## Example
//!
//! ```rust
//! use ecoprint_core::{FeatureEncoder, ProfileSchema, UserProfile};
//! use ecoprint_similarity::{RecommendationGenerator, UserSimilarityIndex};
//! use std::sync::Arc;
//!
//! let encoder = Arc::new(FeatureEncoder::new(ProfileSchema::lifestyle()).unwrap());
//! let index = Arc::new(UserSimilarityIndex::new(encoder));
//! index
//!     .rebuild(&[
//!         UserProfile::new("alice").with("diet_type", "Omnivore").with("recycling", "Paper"),
//!         UserProfile::new("bob").with("diet_type", "Vegan").with("recycling", "Paper"),
//!     ])
//!     .unwrap();
//!
//! let generator = RecommendationGenerator::new(index).unwrap();
//! let recs = generator.recommend("alice", 5);
//! assert_eq!(recs[0].feature, "diet_type");
//! assert_eq!(recs[0].neighbor_id, "bob");
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Profiles   │────>│  Encoder    │────>│  Snapshot   │
//! │  (source)   │     │ (profile→v) │     │ (N×N cos)   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!       │                                        │
//!       │              ┌─────────────┐           │
//!       └─────────────>│  Rebuild    │           │
//!                      │   Queue     │           │
//!                      └─────────────┘           │
//!                      ┌─────────────┐           │
//!                      │ Recommender │<──────────┘
//!                      └─────────────┘
//!                             │
//!                      ┌─────────────┐
//!                      │  Explain    │
//!                      └─────────────┘
//! ```

pub mod explain;
pub mod index;
pub mod rebuild;
pub mod recommend;

pub use explain::{Explainer, RecommendationSummary};
pub use index::{IndexSnapshot, Neighbor, UserSimilarityIndex};
pub use rebuild::{ProfileSource, RebuildQueue, RebuildStats};
pub use recommend::{Recommendation, RecommendationGenerator, RecommendationStats};
