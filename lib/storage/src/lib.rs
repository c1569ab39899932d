pub mod models;

pub use models::{ModelStore, StoredModel, FORMAT_VERSION};
