//! RPC client: typed invocation and response correlation.
//!
//! Many calls can be outstanding at once over the single stream pair; the
//! background receive loop matches each response to its pending call by
//! request id, in whatever order responses arrive. Nothing here assumes
//! FIFO completion.

use crate::error::{Result, RpcError};
use crate::protocol::{
    decode_message, encode_message, read_frame, write_frame, RpcRequest, RpcResponse,
};
use crate::server::TargetId;
use crate::stream::DuplexStreamPair;
use crate::value::{FromRpcValue, RpcValue};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

type CallOutcome = std::result::Result<RpcValue, RpcError>;

/// Client-side record of one outstanding request: the completion handle
/// its caller is suspended on. Created on send, removed when the matching
/// response arrives or the connection dies.
type PendingCall = oneshot::Sender<CallOutcome>;

struct ClientShared {
    pending: Mutex<HashMap<u64, PendingCall>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl ClientShared {
    fn lock_pending(&self) -> MutexGuard<'_, HashMap<u64, PendingCall>> {
        // The map is only touched under this lock and the critical
        // sections never panic, but recover from poisoning anyway.
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Resolve every outstanding call with a connection failure so no
    /// caller is left suspended forever.
    fn fail_outstanding(&self) {
        let mut pending = self.lock_pending();
        if !pending.is_empty() {
            debug!(
                "failing {} outstanding calls: connection closed",
                pending.len()
            );
        }
        for (_, sender) in pending.drain() {
            let _ = sender.send(Err(RpcError::ConnectionClosed));
        }
    }
}

/// RPC client for one connection to a build host process.
///
/// Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct RpcClient {
    shared: Arc<ClientShared>,
    request_tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl RpcClient {
    /// Take ownership of the stream pair and start the background writer
    /// and receive loops. The returned client is ready to issue calls.
    pub fn start(stream: DuplexStreamPair) -> Self {
        let (mut reader, mut writer) = stream.into_split();
        let shared = Arc::new(ClientShared {
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        });

        let (request_tx, mut request_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        tokio::spawn(async move {
            while let Some(frame) = request_rx.recv().await {
                if let Err(e) = write_frame(&mut writer, &frame).await {
                    warn!("failed to write request frame: {}", e);
                    break;
                }
            }
        });

        let loop_shared = shared.clone();
        tokio::spawn(async move {
            match Self::receive_loop(&mut reader, &loop_shared).await {
                Ok(()) => debug!("receive stream closed, receive loop exiting"),
                Err(e) => warn!("receive loop terminated: {}", e),
            }
            loop_shared.closed.store(true, Ordering::SeqCst);
            loop_shared.fail_outstanding();
        });

        Self { shared, request_tx }
    }

    async fn receive_loop(
        mut reader: &mut (dyn AsyncRead + Send + Unpin),
        shared: &ClientShared,
    ) -> Result<()> {
        loop {
            let frame = match read_frame(&mut reader).await? {
                Some(frame) => frame,
                None => return Ok(()),
            };

            let response: RpcResponse = decode_message(&frame)?;
            let sender = shared.lock_pending().remove(&response.id);
            let Some(sender) = sender else {
                return Err(RpcError::Protocol {
                    message: format!("response for unknown request id {}", response.id),
                });
            };

            let outcome = match response.error {
                Some(err) => Err(RpcError::Remote {
                    message: err.message,
                    kind: err.kind,
                }),
                None => Ok(response.value),
            };
            // The caller may have given up (e.g. been dropped); that is
            // not an error for the connection.
            let _ = sender.send(outcome);
        }
    }

    /// Invoke a method expecting a typed (non-null) result, or no result
    /// at all for `T = ()`.
    pub async fn invoke<T: FromRpcValue>(
        &self,
        target: TargetId,
        method: &str,
        params: Vec<RpcValue>,
    ) -> Result<T> {
        let value = self.invoke_raw(target, method, params).await?;
        T::from_rpc_value(value)
    }

    /// Invoke a method whose result may legitimately be null. A null
    /// success resolves to `None`, which is distinct from a failed call.
    pub async fn invoke_nullable<T: FromRpcValue>(
        &self,
        target: TargetId,
        method: &str,
        params: Vec<RpcValue>,
    ) -> Result<Option<T>> {
        match self.invoke_raw(target, method, params).await? {
            RpcValue::Null => Ok(None),
            value => Ok(Some(T::from_rpc_value(value)?)),
        }
    }

    async fn invoke_raw(
        &self,
        target: TargetId,
        method: &str,
        params: Vec<RpcValue>,
    ) -> Result<RpcValue> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(RpcError::ConnectionClosed);
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest {
            id,
            target,
            method: method.to_string(),
            params,
        };
        let frame = encode_message(&request)?;

        // Register before sending so the response cannot race the entry.
        let (sender, receiver) = oneshot::channel();
        self.shared.lock_pending().insert(id, sender);

        // Re-check after registration: if the receive loop died in the
        // window above, it may already have drained the table.
        if self.shared.closed.load(Ordering::SeqCst) {
            self.shared.lock_pending().remove(&id);
            return Err(RpcError::ConnectionClosed);
        }

        if self.request_tx.send(frame).is_err() {
            self.shared.lock_pending().remove(&id);
            return Err(RpcError::ConnectionClosed);
        }

        debug!("sent request {}: {} on target {}", id, method, target);

        match receiver.await {
            Ok(outcome) => outcome,
            // Sender dropped without a response: the connection failed.
            Err(_) => Err(RpcError::ConnectionClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::write_frame;

    #[tokio::test]
    async fn test_pending_calls_fail_when_peer_disappears() {
        let (pair, peer) = DuplexStreamPair::in_memory();
        let client = RpcClient::start(pair);

        let call = client.invoke::<String>(0, "Anything", vec![]);
        tokio::pin!(call);

        // Nothing answers, so the call stays pending until the peer goes
        // away entirely.
        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(50), &mut call)
                .await
                .is_err()
        );

        drop(peer);
        let result = call.await;
        assert!(matches!(result, Err(RpcError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_invoke_after_close_fails_fast() {
        let (pair, peer) = DuplexStreamPair::in_memory();
        let client = RpcClient::start(pair);
        drop(peer);

        // Give the receive loop a moment to observe EOF.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let result = client.invoke::<String>(0, "Anything", vec![]).await;
        assert!(matches!(result, Err(RpcError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_unknown_request_id_kills_the_connection() {
        let (pair, peer) = DuplexStreamPair::in_memory();
        let client = RpcClient::start(pair);

        let call = client.invoke::<String>(0, "Anything", vec![]);
        tokio::pin!(call);

        let (_reader, mut writer) = peer.into_split();
        let bogus = RpcResponse::success(99_999, RpcValue::Bool(true));
        write_frame(&mut writer, &encode_message(&bogus).unwrap())
            .await
            .unwrap();

        // The protocol violation fails the outstanding call rather than
        // leaving it suspended.
        let result = call.await;
        assert!(matches!(result, Err(RpcError::ConnectionClosed)));
    }
}
