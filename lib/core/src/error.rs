use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Encoder has no schema: attribute order is undefined")]
    SchemaUndefined,

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    #[error("Model unavailable for category {category}: {reason}")]
    ModelUnavailable { category: String, reason: String },

    #[error("User not indexed: {0}")]
    UserNotIndexed(String),

    #[error("Unseen value '{value}' for attribute {attribute}")]
    UnseenCategoryValue { attribute: String, value: String },

    #[error("Index rebuild aborted")]
    RebuildAborted,

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Schema misuse is a programmer error and the only class that must reach
    /// the caller. Everything else degrades to a default or empty result.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::SchemaUndefined | Error::InvalidSchema(_) | Error::UnknownAttribute(_)
        )
    }

    pub fn model_unavailable(category: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::ModelUnavailable {
            category: category.into(),
            reason: reason.into(),
        }
    }
}
