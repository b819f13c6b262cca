//! Duplex stream pair abstraction.
//!
//! One connection owns exactly one pair of unidirectional byte streams.
//! The concrete transport is a child process's stdin/stdout pipes in
//! production and an in-memory duplex in tests; the RPC client and server
//! only ever see the boxed halves.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{ChildStdin, ChildStdout};

/// The two halves of one RPC connection.
///
/// Dropping the pair (or either wrapped half) closes the underlying
/// stream, which the peer's read loop observes as clean EOF.
pub struct DuplexStreamPair {
    pub(crate) reader: Box<dyn AsyncRead + Send + Unpin>,
    pub(crate) writer: Box<dyn AsyncWrite + Send + Unpin>,
}

impl DuplexStreamPair {
    pub fn new(
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    /// Wire a spawned child's standard streams into a pair, from the
    /// parent's point of view: we read the child's stdout and write its
    /// stdin.
    pub fn from_child_stdio(stdin: ChildStdin, stdout: ChildStdout) -> Self {
        Self::new(stdout, stdin)
    }

    /// The pair for the process hosting the RPC server: its own stdin is
    /// the receive stream and its own stdout the send stream. Anything
    /// else written to stdout would corrupt framing, so host logging goes
    /// to stderr.
    pub fn from_process_stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }

    /// Two connected pairs backed by in-memory pipes, for tests.
    pub fn in_memory() -> (Self, Self) {
        let (left, right) = tokio::io::duplex(64 * 1024);
        let (left_read, left_write) = tokio::io::split(left);
        let (right_read, right_write) = tokio::io::split(right);
        (
            Self::new(left_read, left_write),
            Self::new(right_read, right_write),
        )
    }

    pub(crate) fn into_split(
        self,
    ) -> (
        Box<dyn AsyncRead + Send + Unpin>,
        Box<dyn AsyncWrite + Send + Unpin>,
    ) {
        (self.reader, self.writer)
    }
}
