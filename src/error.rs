//! Error types for ScaraLink

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// ScaraLink error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No serial endpoint matched the controller signature
    #[error("Controller not found on any serial port")]
    DeviceNotFound,

    /// Endpoint was present but could not be opened
    #[error("Failed to open {port}: {reason}")]
    OpenFailed {
        /// Serial port path
        port: String,
        /// Underlying open error text
        reason: String,
    },

    /// Configuration file parse error
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
