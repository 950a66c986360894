// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// The primary error type for the `forward-oidc` library.
#[derive(Debug, Error)]
pub enum ForwardOidcError {
    /// A provided URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A required configuration field is missing.
    #[error("A required configuration field is missing: {0}")]
    MissingConfiguration(String),

    /// A configuration value is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The same client id is registered more than once.
    #[error("Duplicate client id in configuration: {0}")]
    DuplicateClient(String),

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Reading or writing key material on disk failed.
    #[error("Key storage error at {path:?}: {source}")]
    KeyStorage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A cryptographic key (PEM, DER, JWK) is malformed or could not be produced.
    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    /// Signing a token failed.
    #[error("Token generation failed: {0}")]
    TokenGenerationError(String),

    /// Errors originating from the `jsonwebtoken` crate during token validation.
    #[error("JWT validation error: {0}")]
    JwtValidation(#[from] jsonwebtoken::errors::Error),

    /// An error occurred during an HTTP request.
    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),
}
