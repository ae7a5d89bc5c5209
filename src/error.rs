use thiserror::Error;

/// Crash guard error types
#[derive(Error, Debug)]
pub enum CrashGuardError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Channel closed: {0}")]
    ChannelClosed(String),
}

/// Result type for crash guard operations
pub type Result<T> = std::result::Result<T, CrashGuardError>;
