use thiserror::Error;

/// Archive error types
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// The stream is not an archive, or its directory is malformed.
    #[error("format error: {0}")]
    Format(String),

    /// The directory points past the end of the available bytes.
    #[error("truncated input: {0}")]
    TruncatedInput(String),

    /// Writer used out of order or with inconsistent arguments.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for archive operations
pub type Result<T> = std::result::Result<T, ArchiveError>;
