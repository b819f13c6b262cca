//! Error types for the build host RPC transport.

use thiserror::Error;

/// Result alias used throughout the RPC crate.
pub type Result<T> = std::result::Result<T, RpcError>;

/// Errors surfaced by the RPC transport.
///
/// `Remote` means the call crossed the wire and the target method failed;
/// the connection stays healthy. Every other variant is local or fatal to
/// the connection.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("IO error on RPC stream: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame error: {message}")]
    Frame { message: String },

    #[error("Protocol violation: {message}")]
    Protocol { message: String },

    #[error("remote method threw: {message}")]
    Remote {
        message: String,
        /// Error classification reported by the remote side, when it has one.
        kind: Option<String>,
    },

    #[error("connection closed before the call completed")]
    ConnectionClosed,

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },
}
