//! Wire protocol types and framing.
//!
//! Each message is a 4-byte big-endian length prefix followed by a UTF-8
//! JSON payload:
//!
//! ```text
//! [u32 BE: len][UTF-8 JSON bytes of len]
//! ```
//!
//! Length-prefixed framing means the receiver never scans for a terminator
//! inside payload text, so argument strings may contain any Unicode scalar
//! value (embedded NUL, CR, LF) without disturbing message boundaries.

use crate::error::{Result, RpcError};
use crate::value::RpcValue;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Upper bound on a single frame. A length prefix beyond this is treated as
/// a corrupted stream rather than an allocation request.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// A method invocation sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Correlation id, unique per outstanding call on the connection.
    pub id: u64,
    /// Target object the method lives on; the first registered target is 0.
    pub target: u32,
    pub method: String,
    #[serde(default)]
    pub params: Vec<RpcValue>,
}

/// The completion of one invocation, sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: u64,
    /// Result value on success; `Null` for void methods.
    #[serde(default)]
    pub value: RpcValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcResponseError>,
}

/// Diagnostic payload of a failed invocation. Only a message (and an
/// optional classification) crosses the boundary; the original error is
/// never reconstructed on the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponseError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl RpcResponse {
    pub fn success(id: u64, value: RpcValue) -> Self {
        Self {
            id,
            value,
            error: None,
        }
    }

    pub fn failure(id: u64, message: String, kind: Option<String>) -> Self {
        Self {
            id,
            value: RpcValue::Null,
            error: Some(RpcResponseError { message, kind }),
        }
    }
}

/// Read a length-prefixed frame from an async reader.
///
/// Returns `None` on clean EOF (peer closed its send half).
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;

    if len > MAX_FRAME_SIZE {
        return Err(RpcError::Frame {
            message: format!("frame size {} exceeds maximum {}", len, MAX_FRAME_SIZE),
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    Ok(Some(payload))
}

/// Write a length-prefixed frame to an async writer.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(RpcError::Frame {
            message: format!(
                "frame size {} exceeds maximum {}",
                payload.len(),
                MAX_FRAME_SIZE
            ),
        });
    }
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Serialize a message into a frame payload.
pub fn encode_message<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(message).map_err(|e| RpcError::Json {
        message: format!("failed to encode message: {}", e),
        source: Some(e),
    })
}

/// Decode a frame payload. An undecodable payload is a protocol violation,
/// fatal to the connection.
pub fn decode_message<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    serde_json::from_slice(payload).map_err(|e| RpcError::Protocol {
        message: format!("malformed message payload: {}", e),
    })
}
