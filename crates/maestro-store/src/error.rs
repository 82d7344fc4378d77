use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A stated precondition failed. The message is surfaced verbatim to the
    /// LLM as tool output.
    #[error("{0}")]
    Precondition(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn precondition(msg: impl Into<String>) -> Self {
        StoreError::Precondition(msg.into())
    }

    pub fn is_precondition(&self) -> bool {
        matches!(self, StoreError::Precondition(_))
    }
}

impl From<StoreError> for maestro_core::MaestroError {
    fn from(err: StoreError) -> Self {
        maestro_core::MaestroError::Store(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
