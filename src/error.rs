//! Error types for nb-init.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Certificate generation: {0}")]
    CertificateGeneration(String),

    #[error("Parse: {0}")]
    Parse(String),

    #[error("Config: {0}")]
    Config(String),
}

impl From<rustls::Error> for InitError {
    fn from(e: rustls::Error) -> Self {
        Self::CertificateGeneration(format!("TLS: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, InitError>;
