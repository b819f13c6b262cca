//! Build host process entry point.
//!
//! Launched by `buildhost-manager` with its stdin and stdout wired to the
//! parent. Stdout carries RPC frames exclusively; all logging goes to
//! stderr, where the parent forwards it into its own logs. The process
//! exits when the parent closes the pipe.

use anyhow::Result;
use buildhost_rpc::{
    DuplexStreamPair, FromRpcValue, MethodRegistry, RpcServer, RpcTarget, RpcValue,
};
use clap::Parser;
use futures::FutureExt;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "buildhost")]
#[command(about = "Out-of-process build host serving project loads over stdio")]
struct Args {
    /// Write an MSBuild binary log to this path
    #[arg(long)]
    binlog: Option<PathBuf>,

    /// Culture name for diagnostics (e.g. en-US)
    #[arg(long)]
    locale: Option<String>,

    /// Global MSBuild property as key=value; may be repeated
    #[arg(long = "property")]
    properties: Vec<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging on stderr; stdout belongs to the RPC stream.
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let properties = parse_properties(&args.properties)?;

    info!("build host starting, pid {}", std::process::id());
    if let Some(ref locale) = args.locale {
        info!("requested locale: {}", locale);
    }
    if let Some(ref binlog) = args.binlog {
        info!("binary log path: {}", binlog.display());
    }

    let controller = Arc::new(BuildHostController::new(properties, args.binlog));
    let mut server = RpcServer::new(DuplexStreamPair::from_process_stdio());
    let controller_id = server.add_target(controller);
    info!("controller registered as target {}", controller_id);

    server.run().await?;
    info!("parent closed the connection, exiting");
    Ok(())
}

/// Parse repeated `--property key=value` arguments into a map.
fn parse_properties(raw: &[String]) -> Result<BTreeMap<String, String>> {
    let mut properties = BTreeMap::new();
    for entry in raw {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("malformed property '{entry}', expected key=value"))?;
        if key.is_empty() {
            anyhow::bail!("malformed property '{entry}', empty key");
        }
        properties.insert(key.to_string(), value.to_string());
    }
    Ok(properties)
}

/// The root target, registered as id 0 by convention. The parent probes
/// it for liveness and asks for the effective global properties before
/// handing off project work.
struct BuildHostController {
    global_properties: BTreeMap<String, String>,
    binary_log_path: Option<PathBuf>,
}

impl BuildHostController {
    fn new(global_properties: BTreeMap<String, String>, binary_log_path: Option<PathBuf>) -> Self {
        Self {
            global_properties,
            binary_log_path,
        }
    }
}

impl RpcTarget for BuildHostController {
    fn register_methods(self: Arc<Self>, methods: &mut MethodRegistry) {
        methods.insert("IsAlive", 0, |_args, _token| {
            async { Ok(RpcValue::Bool(true)) }.boxed()
        });

        let this = self.clone();
        methods.insert("GetGlobalProperty", 1, move |mut args, _token| {
            let this = this.clone();
            async move {
                let name = String::from_rpc_value(args.remove(0))?;
                Ok(this.global_properties.get(&name).cloned().into())
            }
            .boxed()
        });

        let this = self.clone();
        methods.insert("HasBinaryLog", 0, move |_args, _token| {
            let this = this.clone();
            async move { Ok(RpcValue::Bool(this.binary_log_path.is_some())) }.boxed()
        });

        methods.insert("Shutdown", 0, |_args, _token| {
            async {
                // Acknowledge the request; the actual exit happens when the
                // parent closes our stdin and the dispatch loop sees EOF.
                info!("shutdown requested");
                Ok(RpcValue::Null)
            }
            .boxed()
        });
    }
}
