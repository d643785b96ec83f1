//! Startup errors.
//!
//! Anything in here halts the process before the server accepts requests.
//! Per-exchange failures live in [`crate::llm::ExchangeError`] instead.

use thiserror::Error;

/// Fatal error raised while bringing the process up.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The model credential was not supplied.
    #[error(
        "Model API key not found. Set the {0} environment variable (or pass --api-key) and restart."
    )]
    MissingCredential(String),

    /// The model client could not be constructed.
    #[error("Failed to initialize the model client: {0}")]
    ModelInit(String),

    /// Configuration sources could not be loaded or deserialized.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}
