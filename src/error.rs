use crate::provider::ProviderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Profile no longer exists: {0}")]
    ProfileGone(String),
}

impl Error {
    /// True for payload decoding failures, which only skip a single poll cycle.
    pub fn is_parse(&self) -> bool {
        matches!(self, Error::Parse(_) | Error::Json(_) | Error::Yaml(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
