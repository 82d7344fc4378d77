use thiserror::Error;

#[derive(Debug, Error)]
pub enum MaestroError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Knowledge store error: {0}")]
    Knowledge(String),

    #[error("LLM provider error: {0}")]
    Provider(String),

    #[error("Messaging error: {0}")]
    Messaging(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, MaestroError>;
