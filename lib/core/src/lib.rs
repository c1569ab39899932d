//! # Ecoprint Core
//!
//! Core library for the Ecoprint personalization engine.
//!
//! This crate provides the data model every other Ecoprint crate agrees on:
//!
//! - [`ProfileSchema`] - Fixed attribute order and per-attribute polarity
//! - [`UserProfile`] - A user's raw lifestyle answers
//! - [`AttributeVocabulary`] - Append-only value-to-code mapping
//! - [`FeatureEncoder`] - Profile to fixed-length [`Vector`] encoding
//! - [`EngineConfig`] - Engine and forest configuration
//!
//! ## Example
//!
//! ```rust
//! use ecoprint_core::{FeatureEncoder, ProfileSchema, UserProfile};
//!
//! let encoder = FeatureEncoder::new(ProfileSchema::lifestyle()).unwrap();
//! let profile = UserProfile::new("u1")
//!     .with("diet_type", "Vegetarian")
//!     .with("transportation_mode", "Public transport");
//!
//! let vector = encoder.encode(&profile).unwrap();
//! assert_eq!(vector.dim(), 14);
//! assert_eq!(vector.get(0), Some(1.0));
//! ```

pub mod config;
pub mod encoder;
pub mod error;
pub mod profile;
pub mod schema;
pub mod vector;
pub mod vocabulary;

/// Scalar dot product and norm kernels
pub mod kernels;

pub use config::{EngineConfig, ForestConfig};
pub use encoder::{EncoderState, FeatureEncoder, NumericScaler, ScaleParams};
pub use error::{Error, Result};
pub use profile::{AttributeValue, UnknownAttributePolicy, UserProfile};
pub use schema::{AttributeKind, AttributeSpec, Polarity, ProfileSchema};
pub use vector::Vector;
pub use vocabulary::{canonical_key, AttributeVocabulary};
