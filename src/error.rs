use thiserror::Error;

#[derive(Error, Debug)]
pub enum FilingsError {
    #[error("Input file not found or unreadable: {path}: {source}")]
    MissingInput {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Required column '{column}' missing from {path}")]
    MissingColumn { path: String, column: String },

    #[error("Unknown checkpoint label: {0}")]
    UnknownCheckpoint(String),

    #[error("Invalid period label: {0}")]
    InvalidPeriod(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Entity not found in dataset: {0}")]
    UnknownEntity(String),

    #[error("Date calculation error: {0}")]
    DateError(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FilingsError>;
