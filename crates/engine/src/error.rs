use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("log store error: {0}")]
    Store(#[from] logstore::StoreError),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
