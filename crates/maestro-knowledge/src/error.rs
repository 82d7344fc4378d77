use thiserror::Error;

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("knowledge store not found at '{0}'")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON in {path}: {detail}")]
    InvalidJson { path: String, detail: String },

    #[error("{0}")]
    Update(String),
}

pub type Result<T> = std::result::Result<T, KnowledgeError>;
