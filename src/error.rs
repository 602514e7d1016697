use thiserror::Error;

/// Main error type for devpipe
#[derive(Debug, Error)]
pub enum DevpipeError {
    // Validation errors
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Path is outside the allowed roots: {0}")]
    PathOutsideRoots(String),

    #[error("Token not found: {0}")]
    TokenNotFound(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid log record: {0}")]
    InvalidRecord(String),

    #[error("File is already being watched: {0}")]
    AlreadyWatched(String),

    // State errors
    #[error("Operation not allowed while capture is active: {0}")]
    CaptureActive(String),

    // Log file errors
    #[error("Failed to open log file: {0}")]
    LogFileError(String),

    #[error("Log rotation failed: {0}")]
    LogRotationError(String),

    // Token store errors
    #[error("Token store error: {0}")]
    TokenStoreError(String),

    // File watcher errors
    #[error("File watcher error: {0}")]
    WatcherError(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid configuration file: {0}")]
    InvalidConfig(String),

    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // IO errors (automatically converted from std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Broad category of a [`DevpipeError`], used by callers to map failures
/// onto their own reporting (e.g. HTTP status codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    State,
    Io,
    Config,
}

impl DevpipeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DevpipeError::InvalidPath(_)
            | DevpipeError::PathOutsideRoots(_)
            | DevpipeError::TokenNotFound(_)
            | DevpipeError::MissingField(_)
            | DevpipeError::InvalidRecord(_)
            | DevpipeError::AlreadyWatched(_) => ErrorKind::Validation,
            DevpipeError::CaptureActive(_) => ErrorKind::State,
            DevpipeError::LogFileError(_)
            | DevpipeError::LogRotationError(_)
            | DevpipeError::TokenStoreError(_)
            | DevpipeError::WatcherError(_)
            | DevpipeError::Io(_) => ErrorKind::Io,
            DevpipeError::ConfigError(_)
            | DevpipeError::InvalidConfig(_)
            | DevpipeError::ConfigValidationError(_) => ErrorKind::Config,
        }
    }
}

/// Result type alias for devpipe operations
pub type Result<T> = std::result::Result<T, DevpipeError>;
