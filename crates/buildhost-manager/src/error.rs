//! Error types for build host process management.

use crate::kind::BuildHostProcessKind;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the manager crate.
pub type Result<T> = std::result::Result<T, BuildHostError>;

#[derive(Debug, Error)]
pub enum BuildHostError {
    /// The runtime a host kind requires is not installed. This is a
    /// configuration error raised before any RPC traffic, never a
    /// transient fault to retry.
    #[error("the {kind} build host requires '{executable}', which was not found")]
    RuntimeNotFound {
        kind: BuildHostProcessKind,
        executable: String,
    },

    #[error("failed to spawn {kind} build host: {message}")]
    Spawn {
        kind: BuildHostProcessKind,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// The spawned child did not expose a piped standard stream.
    #[error("build host process has no piped {stream}")]
    MissingStdio { stream: &'static str },

    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error(transparent)]
    Rpc(#[from] buildhost_rpc::RpcError),
}
