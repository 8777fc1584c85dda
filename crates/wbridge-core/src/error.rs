//! Error types for the worker bridge.
//!
//! The variants follow the bridge's failure taxonomy: protocol desync and
//! registry misuse are fatal, resource lookups have a fallback chain before
//! they surface, and a synchronous timeout is reported to the blocked caller
//! as a call failure.

use thiserror::Error;

/// Main error type for the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    // Shared buffer protocol errors
    #[error("Buffer too short: expected discriminant >= {expected}, found {found}")]
    ProtocolDesync { expected: i32, found: i32 },

    #[error("Span out of range: ptr={ptr} len={len} capacity={capacity}")]
    InvalidSpan { ptr: i32, len: i32, capacity: usize },

    #[error("Control buffer length {len} is invalid: {reason}")]
    InvalidControlLength { len: usize, reason: &'static str },

    #[error("Control slot {index} is out of range for a {slots}-slot buffer")]
    SlotOutOfRange { index: usize, slots: usize },

    #[error("Payload of {len} bytes does not fit a 32-bit slot")]
    PayloadTooLarge { len: usize },

    #[error("Data region allocation of {requested} bytes failed")]
    Allocation { requested: usize },

    #[error("Data region is unavailable after a failed allocation")]
    BufferUnavailable,

    #[error("Malformed {kind} envelope: {message}")]
    MalformedEnvelope { kind: &'static str, message: String },

    // Worker registry errors
    #[error("Worker already exists: {0}")]
    WorkerExists(u32),

    #[error("Worker not found: {0}")]
    WorkerNotFound(u32),

    #[error("Source {0} is not supported from a worker context")]
    UnsupportedSource(u32),

    // Synchronous bridge errors
    #[error("Synchronous call bridge is unavailable")]
    SyncUnavailable,

    #[error("Synchronous call result for source id {id} was not set in time")]
    SyncTimeout { id: u8 },

    #[error("Invalid synchronous source id: {0}")]
    InvalidSourceId(i64),

    #[error("Synchronous call is in state {state}, expected {expected}")]
    InvalidSyncState {
        state: &'static str,
        expected: &'static str,
    },

    // Resource loading errors
    #[error("Failed to fetch '{path}'")]
    ResourceUnavailable { path: String },

    #[error("Resource decoder failed for '{path}': {message}")]
    DecodeFailed { path: String, message: String },

    // Transport errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Transport closed: {0}")]
    TransportClosed(String),

    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BridgeError::Timeout {
                url: err
                    .url()
                    .map(|url| url.to_string())
                    .unwrap_or_else(|| "<unknown>".to_string()),
            }
        } else {
            BridgeError::Network {
                message: err.to_string(),
                cause: Some(err.to_string()),
            }
        }
    }
}

impl From<url::ParseError> for BridgeError {
    fn from(err: url::ParseError) -> Self {
        BridgeError::Config {
            message: format!("invalid URL: {}", err),
        }
    }
}

impl BridgeError {
    /// Shorthand for a malformed envelope error.
    pub fn malformed(kind: &'static str, message: impl Into<String>) -> Self {
        BridgeError::MalformedEnvelope {
            kind,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        BridgeError::Config {
            message: message.into(),
        }
    }

    /// Whether the error means the two sides of a bridge can no longer trust
    /// the shared buffers or the registry.
    ///
    /// Fatal errors are never retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BridgeError::ProtocolDesync { .. }
                | BridgeError::InvalidSpan { .. }
                | BridgeError::SlotOutOfRange { .. }
                | BridgeError::PayloadTooLarge { .. }
                | BridgeError::Allocation { .. }
                | BridgeError::BufferUnavailable
                | BridgeError::MalformedEnvelope { .. }
                | BridgeError::WorkerExists(_)
                | BridgeError::WorkerNotFound(_)
        )
    }
}
