//! Error types for yt-harvest
//!
//! This module provides the error taxonomy used throughout the library:
//! - [`Error`] is the crate-level error returned by configuration, storage and
//!   run-setup code
//! - [`GatewayError`] classifies a single remote call (transient, quota,
//!   malformed, fatal) and carries the terminal credential conditions
//! - [`CredentialError`] describes problems with the credential pool itself

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for yt-harvest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for yt-harvest
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "harvest.batch_size")
        key: Option<String>,
    },

    /// Remote call failed after classification
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Credential pool error
    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Checkpoint persistence failed
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// Batch output could not be written
    #[error("batch output error: {0}")]
    Output(String),

    /// Partition input is missing, unreadable or empty
    #[error("invalid partition input: {0}")]
    InvalidPartition(String),

    /// SQLx database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a configuration error tied to a key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// Classified failure of a single remote call
///
/// The classification drives who handles the failure: the gateway absorbs
/// `QuotaExceeded` by rotating credentials, the batch runner retries
/// `Transient`, skips items on `Malformed`, pauses on `CredentialsExhausted`
/// and aborts on `Fatal` / `NoCredentialsConfigured`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Network, timeout or server-side failure worth retrying
    #[error("transient failure: {0}")]
    Transient(String),

    /// The credential's quota or rate limit was hit
    #[error("quota exceeded on credential {credential}: {reason}")]
    QuotaExceeded {
        /// Ordinal of the credential that was refused
        credential: usize,
        /// Reason reported by the remote API
        reason: String,
    },

    /// Unexpected, empty or undecodable payload
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Anything else (authorization failures, unknown statuses)
    #[error("fatal remote error: {0}")]
    Fatal(String),

    /// Rotation was requested but no credential remains
    #[error("all credentials exhausted")]
    CredentialsExhausted,

    /// The pool never held a usable credential
    #[error("no credentials configured")]
    NoCredentialsConfigured,
}

impl GatewayError {
    /// Whether this failure ends the whole run rather than a single item
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GatewayError::CredentialsExhausted
                | GatewayError::NoCredentialsConfigured
                | GatewayError::Fatal(_)
        )
    }
}

impl From<CredentialError> for GatewayError {
    fn from(error: CredentialError) -> Self {
        match error {
            CredentialError::NoCredentialsConfigured => GatewayError::NoCredentialsConfigured,
            CredentialError::CredentialsExhausted { .. } => GatewayError::CredentialsExhausted,
            other => GatewayError::Fatal(other.to_string()),
        }
    }
}

/// Credential pool errors
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The descriptor source is empty or every descriptor failed to load
    #[error("no credentials configured")]
    NoCredentialsConfigured,

    /// Every descriptor has been used and marked exhausted
    #[error("all {tried} credentials exhausted")]
    CredentialsExhausted {
        /// Number of descriptors the pool held
        tried: usize,
    },

    /// A descriptor file could not be turned into a credential
    #[error("invalid credential descriptor {path}: {reason}")]
    InvalidDescriptor {
        /// Path of the offending descriptor
        path: PathBuf,
        /// Why it was rejected
        reason: String,
    },

    /// The descriptor directory could not be read
    #[error("failed to read credential directory {path}: {source}")]
    Io {
        /// Directory that failed to enumerate
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },
}
