use thiserror::Error;

/// Main error type for redarc
#[derive(Error, Debug)]
pub enum RedarcError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Decode failure that could not be resolved within the window bound
    #[error("Unable to decode frame after reading {bytes_read} bytes")]
    Format { bytes_read: u64 },
}

/// Convenient Result type using RedarcError
pub type Result<T> = std::result::Result<T, RedarcError>;
