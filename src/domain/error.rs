use thiserror::Error;

/// Top-level error type for the SDK.
#[derive(Error, Debug)]
pub enum VestigError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
