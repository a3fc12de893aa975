use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Invalid configuration for {field}: {details}")]
    InvalidConfig { field: &'static str, details: String },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
