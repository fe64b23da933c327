//! Error types for multiask

use thiserror::Error;

use crate::llm::ProviderId;

#[derive(Error, Debug)]
pub enum FanoutError {
    #[error("Invalid question: {0}")]
    InvalidQuestion(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Provider {0} is not enabled")]
    ProviderNotEnabled(ProviderId),

    #[error("Provider {0} listed more than once")]
    DuplicateProvider(ProviderId),

    #[error("No providers selected for dispatch")]
    NoProviders,

    #[error("No API key configured for {0}")]
    MissingApiKey(ProviderId),

    /// A provider result was merged into the aggregate twice.
    #[error("Internal error: result for {0} merged twice")]
    DuplicateMerge(ProviderId),

    /// The summary was about to be built while providers were still unresolved.
    #[error("Internal error: dispatch finished without results for {0:?}")]
    IncompleteDispatch(Vec<ProviderId>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlWrite(#[from] toml::ser::Error),
}

impl FanoutError {
    /// Protocol violations are programming errors, not provider failures.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            FanoutError::DuplicateMerge(_) | FanoutError::IncompleteDispatch(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FanoutError>;
