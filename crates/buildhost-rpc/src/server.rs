//! RPC server: target registry and dispatch loop.
//!
//! Requests are read off the receive stream strictly in arrival order, one
//! frame fully parsed before the next, but each resolved invocation runs in
//! its own spawned task. A long-running method therefore never stalls the
//! loop, and responses are written whenever their invocation completes,
//! independent of arrival order. All response frames funnel through a single
//! writer task so two concurrently-completing calls cannot interleave bytes.
//!
//! # Method resolution
//!
//! Instead of reflecting over a target at call time, `add_target` asks the
//! target to populate a `(method name, arity)` table of invoker closures
//! once, at registration. The wire contract stays string-keyed; resolution
//! after registration is a plain map lookup.

use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::protocol::{
    decode_message, encode_message, read_frame, write_frame, RpcRequest, RpcResponse,
};
use crate::stream::DuplexStreamPair;
use crate::value::RpcValue;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

/// Identifier of a registered target object. The first registered target
/// is 0, and clients address it by that convention.
pub type TargetId = u32;

/// Failure classification written into error responses when the request
/// named a target or method the server does not know.
const RESOLUTION_ERROR_KIND: &str = "MethodResolutionError";
/// Failure classification for errors raised by the target method itself.
const INVOCATION_ERROR_KIND: &str = "InvocationError";

/// An invoker prepared at registration time.
///
/// Synchronous methods return an immediately-ready future; deferred methods
/// suspend inside it; void methods resolve to `RpcValue::Null`.
pub type MethodHandler = Arc<
    dyn Fn(Vec<RpcValue>, CancellationToken) -> BoxFuture<'static, anyhow::Result<RpcValue>>
        + Send
        + Sync,
>;

/// Per-target method table keyed by `(name, arity)`.
#[derive(Default)]
pub struct MethodRegistry {
    methods: HashMap<(String, usize), MethodHandler>,
}

impl MethodRegistry {
    /// Register an invoker under a method name and argument count.
    ///
    /// Name and arity together select the method; registering the same
    /// pair twice replaces the earlier invoker.
    pub fn insert<F>(&mut self, name: &str, arity: usize, handler: F)
    where
        F: Fn(Vec<RpcValue>, CancellationToken) -> BoxFuture<'static, anyhow::Result<RpcValue>>
            + Send
            + Sync
            + 'static,
    {
        self.methods
            .insert((name.to_string(), arity), Arc::new(handler));
    }

    fn resolve(&self, name: &str, arity: usize) -> Option<MethodHandler> {
        self.methods.get(&(name.to_string(), arity)).cloned()
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// A server-side object whose methods are reachable by remote callers.
pub trait RpcTarget: Send + Sync + 'static {
    /// Populate the method table for this target. Handlers capture
    /// `Arc<Self>` clones, so the target outlives the registration call.
    fn register_methods(self: Arc<Self>, methods: &mut MethodRegistry);
}

/// RPC server for one connection.
pub struct RpcServer {
    stream: DuplexStreamPair,
    targets: Vec<MethodRegistry>,
    cancellation: CancellationToken,
}

impl RpcServer {
    pub fn new(stream: DuplexStreamPair) -> Self {
        Self {
            stream,
            targets: Vec::new(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Register a target object, assigning it the next sequential id.
    pub fn add_target(&mut self, target: Arc<dyn RpcTarget>) -> TargetId {
        let mut methods = MethodRegistry::default();
        target.register_methods(&mut methods);
        debug!(
            "registered target {} with {} methods",
            self.targets.len(),
            methods.len()
        );
        self.targets.push(methods);
        (self.targets.len() - 1) as TargetId
    }

    /// Run the dispatch loop until the receive stream closes.
    ///
    /// Invocation failures never terminate the loop; only clean EOF (Ok)
    /// or a fatal frame/codec error (Err) ends it. Invocations still
    /// running when the loop exits are aborted: the connection is over and
    /// their responses have nowhere to go.
    pub async fn run(self) -> Result<()> {
        let RpcServer {
            stream,
            targets,
            cancellation,
        } = self;
        let (mut reader, mut writer) = stream.into_split();
        let targets = Arc::new(targets);

        // Response frames from concurrently-completing invocations are
        // serialized through this channel; the writer task is the only
        // place bytes reach the send stream.
        let (response_tx, mut response_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let writer_task = tokio::spawn(async move {
            while let Some(frame) = response_rx.recv().await {
                if let Err(e) = write_frame(&mut writer, &frame).await {
                    warn!("failed to write response frame: {}", e);
                    break;
                }
            }
        });

        let mut invocations = JoinSet::new();
        let result = Self::dispatch_loop(
            &mut reader,
            &targets,
            &cancellation,
            &response_tx,
            &mut invocations,
        )
        .await;

        invocations.abort_all();
        while invocations.join_next().await.is_some() {}

        drop(response_tx);
        let _ = writer_task.await;
        result
    }

    async fn dispatch_loop(
        mut reader: &mut (dyn AsyncRead + Send + Unpin),
        targets: &Arc<Vec<MethodRegistry>>,
        cancellation: &CancellationToken,
        response_tx: &mpsc::UnboundedSender<Vec<u8>>,
        invocations: &mut JoinSet<()>,
    ) -> Result<()> {
        loop {
            let frame = match read_frame(&mut reader).await? {
                Some(frame) => frame,
                None => {
                    debug!("receive stream closed, dispatch loop exiting");
                    return Ok(());
                }
            };

            let request: RpcRequest = decode_message(&frame)?;
            Self::dispatch(request, targets, cancellation, response_tx, invocations);
        }
    }

    /// Resolve and start one invocation. Never blocks on the invocation
    /// itself; the response is written when the spawned task completes.
    fn dispatch(
        request: RpcRequest,
        targets: &Arc<Vec<MethodRegistry>>,
        cancellation: &CancellationToken,
        response_tx: &mpsc::UnboundedSender<Vec<u8>>,
        invocations: &mut JoinSet<()>,
    ) {
        let arity = request.params.len();
        let resolved = match targets.get(request.target as usize) {
            None => Err(format!("unknown target object {}", request.target)),
            Some(registry) => registry.resolve(&request.method, arity).ok_or_else(|| {
                format!(
                    "target {} has no method {} taking {} arguments",
                    request.target, request.method, arity
                )
            }),
        };

        let handler = match resolved {
            Ok(handler) => handler,
            Err(message) => {
                warn!("request {}: {}", request.id, message);
                let response = RpcResponse::failure(
                    request.id,
                    message,
                    Some(RESOLUTION_ERROR_KIND.to_string()),
                );
                Self::send_response(response_tx, &response);
                return;
            }
        };

        debug!(
            "dispatching request {}: {}/{} on target {}",
            request.id, request.method, arity, request.target
        );

        // The token is cloned from one the server never cancels; see the
        // cancel module.
        let token = cancellation.clone();
        let response_tx = response_tx.clone();
        let id = request.id;
        invocations.spawn(async move {
            let response = match handler(request.params, token).await {
                Ok(value) => RpcResponse::success(id, value),
                Err(e) => {
                    debug!("request {} failed in target method: {:#}", id, e);
                    RpcResponse::failure(id, e.to_string(), Some(INVOCATION_ERROR_KIND.to_string()))
                }
            };
            Self::send_response(&response_tx, &response);
        });
    }

    fn send_response(response_tx: &mpsc::UnboundedSender<Vec<u8>>, response: &RpcResponse) {
        match encode_message(response) {
            // A send error means the writer task is gone because the
            // connection died; the response has nowhere to go.
            Ok(frame) => {
                let _ = response_tx.send(frame);
            }
            Err(e) => error!("failed to encode response {}: {}", response.id, e),
        }
    }
}
