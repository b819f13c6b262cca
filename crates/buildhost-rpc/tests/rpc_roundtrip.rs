//! End-to-end client/server tests over an in-memory stream pair.
//!
//! The targets here stand in for the project-loading logic a real build
//! host registers; they only need named, arity-distinct methods returning
//! the four scalar kinds.

use anyhow::Context;
use buildhost_rpc::{
    DuplexStreamPair, MethodRegistry, RpcClient, RpcError, RpcServer, RpcTarget, RpcValue,
};
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

/// Stand-in for a project-file target: echo/arithmetic/property lookup
/// plus a failing method and a void method with an observable side effect.
#[derive(Default)]
struct ProjectInfoTarget {
    properties: HashMap<String, String>,
    last_note: Mutex<Option<String>>,
}

impl ProjectInfoTarget {
    fn with_property(key: &str, value: &str) -> Self {
        let mut properties = HashMap::new();
        properties.insert(key.to_string(), value.to_string());
        Self {
            properties,
            last_note: Mutex::new(None),
        }
    }
}

impl RpcTarget for ProjectInfoTarget {
    fn register_methods(self: Arc<Self>, methods: &mut MethodRegistry) {
        methods.insert("EchoPath", 1, |mut args, _token| {
            async move { Ok(RpcValue::String(args.remove(0).into_string()?)) }.boxed()
        });

        methods.insert("Concat", 2, |mut args, _token| {
            async move {
                let first = args.remove(0).into_string()?;
                let second = args.remove(0).into_string()?;
                Ok(RpcValue::String(format!("{first}{second}")))
            }
            .boxed()
        });

        methods.insert("Add", 2, |args, _token| {
            async move {
                let a = args[0].as_int().context("first argument must be an int")?;
                let b = args[1].as_int().context("second argument must be an int")?;
                Ok(RpcValue::Int(a + b))
            }
            .boxed()
        });

        let this = self.clone();
        methods.insert("FindProperty", 1, move |mut args, _token| {
            let this = this.clone();
            async move {
                match args.remove(0) {
                    RpcValue::Null => Ok(RpcValue::Null),
                    key => {
                        let key = key.into_string()?;
                        Ok(this.properties.get(&key).cloned().into())
                    }
                }
            }
            .boxed()
        });

        let this = self.clone();
        methods.insert("SetNote", 1, move |mut args, _token| {
            let this = this.clone();
            async move {
                let note = args.remove(0).into_string()?;
                *this.last_note.lock().unwrap() = Some(note);
                Ok(RpcValue::Null)
            }
            .boxed()
        });

        methods.insert("Fail", 1, |mut args, _token| {
            async move {
                let message = args.remove(0).into_string()?;
                Err(anyhow::anyhow!("project load failed: {message}"))
            }
            .boxed()
        });

        methods.insert("TokenIsCancelled", 0, |_args, token| {
            async move { Ok(RpcValue::Bool(token.is_cancelled())) }.boxed()
        });
    }
}

/// Deferred-completion target: each call suspends on a named gate the test
/// releases explicitly, so completion order is fully controlled.
#[derive(Default)]
struct GatedTarget {
    gates: Mutex<HashMap<String, oneshot::Receiver<i64>>>,
}

impl GatedTarget {
    fn arm(&self, name: &str) -> oneshot::Sender<i64> {
        let (sender, receiver) = oneshot::channel();
        self.gates.lock().unwrap().insert(name.to_string(), receiver);
        sender
    }
}

impl RpcTarget for GatedTarget {
    fn register_methods(self: Arc<Self>, methods: &mut MethodRegistry) {
        let this = self.clone();
        methods.insert("WaitFor", 1, move |mut args, _token| {
            let this = this.clone();
            async move {
                let name = args.remove(0).into_string()?;
                let gate = this
                    .gates
                    .lock()
                    .unwrap()
                    .remove(&name)
                    .with_context(|| format!("no gate named {name}"))?;
                let value = gate.await.context("gate sender dropped")?;
                Ok(RpcValue::Int(value))
            }
            .boxed()
        });
    }
}

fn start_host(targets: Vec<Arc<dyn RpcTarget>>) -> RpcClient {
    let (server_pair, client_pair) = DuplexStreamPair::in_memory();
    let mut server = RpcServer::new(server_pair);
    for target in targets {
        server.add_target(target);
    }
    tokio::spawn(server.run());
    RpcClient::start(client_pair)
}

#[tokio::test]
async fn test_echo_roundtrip_preserves_arbitrary_text() {
    let client = start_host(vec![Arc::new(ProjectInfoTarget::default()) as Arc<dyn RpcTarget>]);

    for input in [
        "",
        "\0",
        "line1\r\nline2",
        "C:\\src\\проект\\app.csproj",
        "emoji \u{1F680}\u{1F980} and NUL \0 mixed",
    ] {
        let echoed: String = client
            .invoke(0, "EchoPath", vec![input.into()])
            .await
            .unwrap();
        assert_eq!(echoed, input);
        assert_eq!(echoed.len(), input.len());
    }
}

#[tokio::test]
async fn test_int_and_multi_argument_methods() {
    let client = start_host(vec![Arc::new(ProjectInfoTarget::default()) as Arc<dyn RpcTarget>]);

    let sum: i64 = client
        .invoke(0, "Add", vec![40i64.into(), 2i64.into()])
        .await
        .unwrap();
    assert_eq!(sum, 42);

    let joined: String = client
        .invoke(0, "Concat", vec!["net".into(), "8.0".into()])
        .await
        .unwrap();
    assert_eq!(joined, "net8.0");
}

#[tokio::test]
async fn test_nullable_distinguishes_null_from_failure() {
    let target = Arc::new(ProjectInfoTarget::with_property("Configuration", "Release"));
    let client = start_host(vec![target as Arc<dyn RpcTarget>]);

    let found: Option<String> = client
        .invoke_nullable(0, "FindProperty", vec!["Configuration".into()])
        .await
        .unwrap();
    assert_eq!(found.as_deref(), Some("Release"));

    let missing: Option<String> = client
        .invoke_nullable(0, "FindProperty", vec![RpcValue::Null])
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_void_method_side_effect_visible_after_return() {
    let target = Arc::new(ProjectInfoTarget::default());
    let client = start_host(vec![target.clone() as Arc<dyn RpcTarget>]);

    client
        .invoke::<()>(0, "SetNote", vec!["loaded 3 projects".into()])
        .await
        .unwrap();

    assert_eq!(
        target.last_note.lock().unwrap().as_deref(),
        Some("loaded 3 projects")
    );
}

#[tokio::test]
async fn test_remote_failure_carries_original_message() {
    let client = start_host(vec![Arc::new(ProjectInfoTarget::default()) as Arc<dyn RpcTarget>]);

    let result = client
        .invoke::<String>(0, "Fail", vec!["disk offline".into()])
        .await;

    match result {
        Err(RpcError::Remote { message, kind }) => {
            assert!(message.contains("disk offline"), "message: {message}");
            assert_eq!(kind.as_deref(), Some("InvocationError"));
        }
        other => panic!("Expected Remote error, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_connection_survives_remote_failures() {
    let client = start_host(vec![Arc::new(ProjectInfoTarget::default()) as Arc<dyn RpcTarget>]);

    client
        .invoke::<String>(0, "Fail", vec!["transient".into()])
        .await
        .unwrap_err();

    // The failure was confined to that one call.
    let echoed: String = client
        .invoke(0, "EchoPath", vec!["still alive".into()])
        .await
        .unwrap();
    assert_eq!(echoed, "still alive");
}

#[tokio::test]
async fn test_handler_token_is_never_cancelled() {
    let client = start_host(vec![Arc::new(ProjectInfoTarget::default()) as Arc<dyn RpcTarget>]);

    let cancelled: bool = client.invoke(0, "TokenIsCancelled", vec![]).await.unwrap();
    assert!(!cancelled);
}

#[tokio::test]
async fn test_second_call_may_complete_before_first() {
    let gated = Arc::new(GatedTarget::default());
    let first_gate = gated.arm("first");
    let second_gate = gated.arm("second");
    let client = start_host(vec![gated as Arc<dyn RpcTarget>]);

    let first = client.invoke::<i64>(0, "WaitFor", vec!["first".into()]);
    tokio::pin!(first);
    let second = client.invoke::<i64>(0, "WaitFor", vec!["second".into()]);
    tokio::pin!(second);

    // Both in flight, neither gate released: both callers stay suspended.
    assert!(tokio::time::timeout(Duration::from_millis(50), &mut first)
        .await
        .is_err());
    assert!(tokio::time::timeout(Duration::from_millis(50), &mut second)
        .await
        .is_err());

    // Release the later call first. It must resolve while the earlier
    // call remains suspended.
    second_gate.send(22).unwrap();
    assert_eq!((&mut second).await.unwrap(), 22);
    assert!(tokio::time::timeout(Duration::from_millis(50), &mut first)
        .await
        .is_err());

    first_gate.send(11).unwrap();
    assert_eq!(first.await.unwrap(), 11);
}

#[tokio::test]
async fn test_calls_also_complete_in_issue_order() {
    let gated = Arc::new(GatedTarget::default());
    let first_gate = gated.arm("first");
    let second_gate = gated.arm("second");
    let client = start_host(vec![gated as Arc<dyn RpcTarget>]);

    let first = client.invoke::<i64>(0, "WaitFor", vec!["first".into()]);
    tokio::pin!(first);
    let second = client.invoke::<i64>(0, "WaitFor", vec!["second".into()]);
    tokio::pin!(second);

    first_gate.send(1).unwrap();
    assert_eq!((&mut first).await.unwrap(), 1);
    assert!(tokio::time::timeout(Duration::from_millis(50), &mut second)
        .await
        .is_err());

    second_gate.send(2).unwrap();
    assert_eq!(second.await.unwrap(), 2);
}

#[tokio::test]
async fn test_second_registered_target_addressable_by_id() {
    let info = Arc::new(ProjectInfoTarget::with_property("Platform", "AnyCPU"));
    let gated = Arc::new(GatedTarget::default());
    let client = start_host(vec![gated as Arc<dyn RpcTarget>, info as Arc<dyn RpcTarget>]);

    // The info target was registered second, so it is target 1.
    let found: Option<String> = client
        .invoke_nullable(1, "FindProperty", vec!["Platform".into()])
        .await
        .unwrap();
    assert_eq!(found.as_deref(), Some("AnyCPU"));
}
