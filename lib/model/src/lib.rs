//! # Ecoprint Model
//!
//! Per-category carbon footprint estimation.
//!
//! - [`CategoryFootprintModel`] - Random forest regressor over encoded profiles
//! - [`FootprintEstimator`] - All categories, with rule-based fallback
//! - [`rules`] - Reference score tables and threshold tips
//!
//! ## Example
//!
//! ```rust
//! use ecoprint_core::{ForestConfig, ProfileSchema, UserProfile};
//! use ecoprint_model::{Category, FootprintEstimator};
//!
//! let estimator = FootprintEstimator::new(ProfileSchema::lifestyle(), ForestConfig::default()).unwrap();
//! let estimate = estimator.estimate(&UserProfile::new("u1").with("diet_type", "Vegan"));
//! assert_eq!(estimate.get(Category::Diet), 1.5);
//! ```

pub mod category;
pub mod estimator;
pub mod forest;
pub mod model;
pub mod rules;

pub use category::Category;
pub use estimator::{CategoryStats, EstimatorStats, FootprintEstimate, FootprintEstimator};
pub use forest::{r_squared, RandomForest, RegressionTree};
pub use model::{CategoryFootprintModel, CategoryModelState, TrainingSample};
pub use rules::{rule_based_tips, rule_footprint};
