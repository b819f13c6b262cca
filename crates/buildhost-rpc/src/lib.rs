//! RPC transport between a workspace and its build host processes.
//!
//! A build host is a separate process that loads MSBuild-style project
//! files; the workspace talks to it over the host's stdin/stdout pipes.
//! This crate provides the pieces on both sides of that pipe:
//!
//! - [`DuplexStreamPair`] — the two byte streams of one connection;
//! - length-prefixed JSON framing and wire types ([`protocol`]);
//! - [`RpcServer`] — runs inside the host, dispatching string-named method
//!   calls to registered target objects;
//! - [`RpcClient`] — runs in the workspace, multiplexing many concurrent
//!   calls over the single connection.
//!
//! Exactly one connection exists per spawned process. Calls complete in
//! whatever order the host finishes them; correlation is by request id,
//! never by position.

pub mod cancel;
pub mod client;
pub mod error;
pub mod protocol;
pub mod server;
pub mod stream;
pub mod value;

pub use cancel::{CancellationToken, CancelledError};
pub use client::RpcClient;
pub use error::{Result, RpcError};
pub use server::{MethodHandler, MethodRegistry, RpcServer, RpcTarget, TargetId};
pub use stream::DuplexStreamPair;
pub use value::{FromRpcValue, RpcValue};
