//! # Ecoprint
//!
//! A carbon footprint personalization engine.
//!
//! Ecoprint encodes lifestyle questionnaire answers into fixed-length vectors,
//! finds similar users by cosine similarity, suggests the habits where similar
//! users do better, and estimates per-category footprints with random forest
//! models that fall back to reference score tables.
//!
//! ## Quick Start
//!
//! ### As a CLI
//!
//! ```bash
//! cargo install ecoprint
//! ecoprint --profiles users.json --training training.json --model-dir ./models
//! ```
//!
//! ### As a Library
//!
//! ```rust
//! use ecoprint::prelude::*;
//!
//! let engine = Engine::new(EngineConfig::default()).unwrap();
//! let alice = UserProfile::new("alice")
//!     .with("diet_type", "Omnivore")
//!     .with("transportation_mode", "Private car");
//! let bob = UserProfile::new("bob")
//!     .with("diet_type", "Vegetarian")
//!     .with("transportation_mode", "Private car");
//! engine.rebuild(&[alice.clone(), bob]).unwrap();
//!
//! let report = engine.report(&alice, 5).unwrap();
//! assert_eq!(report.recommendations[0].feature, "diet_type");
//! assert_eq!(report.estimate.get(Category::Diet), 3.0);
//! ```
//!
//! ## Crate Structure
//!
//! Ecoprint is composed of several crates:
//!
//! - [`ecoprint-core`](https://docs.rs/ecoprint-core) - Schema, profiles, vocabularies, feature encoding
//! - [`ecoprint-similarity`](https://docs.rs/ecoprint-similarity) - Similarity index, rebuild queue, recommendations
//! - [`ecoprint-model`](https://docs.rs/ecoprint-model) - Category models, rule tables, footprint estimation
//! - [`ecoprint-storage`](https://docs.rs/ecoprint-storage) - Trained model persistence

pub mod engine;

pub use engine::{Engine, EngineStats, FootprintReport};

// Re-export core types
pub use ecoprint_core::{
    AttributeKind, AttributeSpec, AttributeValue, EngineConfig, Error, FeatureEncoder, ForestConfig, Polarity,
    ProfileSchema, Result, UnknownAttributePolicy, UserProfile, Vector,
};

// Re-export similarity
pub use ecoprint_similarity::{
    Explainer, IndexSnapshot, Neighbor, ProfileSource, RebuildQueue, RebuildStats, Recommendation,
    RecommendationGenerator, RecommendationSummary, UserSimilarityIndex,
};

// Re-export models
pub use ecoprint_model::{
    rule_based_tips, Category, CategoryFootprintModel, FootprintEstimate, FootprintEstimator, TrainingSample,
};

// Re-export storage
pub use ecoprint_storage::ModelStore;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        Category, Engine, EngineConfig, Error, FootprintEstimate, FootprintReport, ModelStore, ProfileSchema,
        Recommendation, Result, TrainingSample, UserProfile,
    };
}
