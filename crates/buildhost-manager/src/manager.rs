//! Build host process manager: spawn, connect, reuse.
//!
//! One live host per kind. Launching validates that the required runtime
//! exists before spawning; a missing runtime is a configuration error
//! reported immediately, never retried. The spawned process's stdin and
//! stdout become the RPC connection; its stderr is forwarded line-by-line
//! into our logs.

use crate::descriptor::{create_start_info, BuildHostOptions, ProcessLaunchDescriptor};
use crate::error::{BuildHostError, Result};
use crate::kind::BuildHostProcessKind;
use buildhost_rpc::{DuplexStreamPair, RpcClient};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// How long `shutdown` waits for a host to exit on its own before killing it.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Manages the build host processes for one workspace.
pub struct BuildHostProcessManager {
    options: BuildHostOptions,
    connections: Mutex<HashMap<BuildHostProcessKind, Arc<BuildHostConnection>>>,
}

impl BuildHostProcessManager {
    pub fn new(options: BuildHostOptions) -> Self {
        Self {
            options,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Build the launch descriptor for a host kind without side effects.
    pub fn create_start_info(&self, kind: BuildHostProcessKind) -> ProcessLaunchDescriptor {
        create_start_info(kind, &self.options)
    }

    /// Get the cached connection for a kind, launching a host if none is
    /// live yet. A connection is bound to its kind for its whole lifetime
    /// and never re-purposed; a cached connection whose process has exited
    /// is discarded and a fresh host launched in its place.
    pub async fn get_or_launch(
        &self,
        kind: BuildHostProcessKind,
    ) -> Result<Arc<BuildHostConnection>> {
        let mut connections = self.connections.lock().await;
        if let Some(existing) = connections.get(&kind) {
            if existing.is_alive().await {
                debug!("reusing {} build host", kind);
                return Ok(existing.clone());
            }
            warn!("{} build host exited, discarding its connection", kind);
            connections.remove(&kind);
        }

        let connection = Arc::new(self.launch(kind).await?);
        connections.insert(kind, connection.clone());
        Ok(connection)
    }

    /// Spawn a host of the given kind and return a connected client.
    pub async fn launch(&self, kind: BuildHostProcessKind) -> Result<BuildHostConnection> {
        let descriptor = self.create_start_info(kind);
        ensure_runtime_available(kind, &descriptor.executable)?;

        info!(
            "launching {} build host: {} {:?}",
            kind,
            descriptor.executable.display(),
            descriptor.arguments
        );

        let mut command = Command::new(&descriptor.executable);
        command
            .args(&descriptor.arguments)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = descriptor.working_directory {
            command.current_dir(dir);
        }
        for (key, value) in &descriptor.environment {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|e| BuildHostError::Spawn {
            kind,
            message: e.to_string(),
            source: Some(e),
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or(BuildHostError::MissingStdio { stream: "stdin" })?;
        let stdout = child
            .stdout
            .take()
            .ok_or(BuildHostError::MissingStdio { stream: "stdout" })?;

        // The host logs to stderr (stdout carries frames); surface those
        // lines in our own logs.
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("build host stderr: {}", line);
                }
            });
        }

        let client = RpcClient::start(DuplexStreamPair::from_child_stdio(stdin, stdout));
        Ok(BuildHostConnection {
            kind,
            client,
            child: Mutex::new(child),
        })
    }

    /// Shut down every live host.
    pub async fn shutdown_all(&self) {
        let mut connections = self.connections.lock().await;
        for (kind, connection) in connections.drain() {
            if let Err(e) = connection.shutdown().await {
                warn!("failed to shut down {} build host: {}", kind, e);
            }
        }
    }
}

/// A live host process together with the RPC client wired to it.
pub struct BuildHostConnection {
    kind: BuildHostProcessKind,
    client: RpcClient,
    child: Mutex<Child>,
}

impl BuildHostConnection {
    pub fn kind(&self) -> BuildHostProcessKind {
        self.kind
    }

    pub fn client(&self) -> &RpcClient {
        &self.client
    }

    /// Whether the host process is still running.
    pub async fn is_alive(&self) -> bool {
        let mut child = self.child.lock().await;
        matches!(child.try_wait(), Ok(None))
    }

    /// Wait briefly for the host to exit, then kill it.
    ///
    /// A well-behaved host exits once its stdin closes; the kill is a
    /// backstop for one that does not.
    pub async fn shutdown(&self) -> Result<()> {
        let mut child = self.child.lock().await;
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, child.wait()).await {
            Ok(status) => {
                let status = status.map_err(|e| BuildHostError::Io {
                    message: "wait for build host exit".to_string(),
                    path: None,
                    source: Some(e),
                })?;
                info!("{} build host exited with {}", self.kind, status);
            }
            Err(_) => {
                warn!(
                    "{} build host did not exit within {:?}, killing",
                    self.kind, SHUTDOWN_TIMEOUT
                );
                child.kill().await.map_err(|e| BuildHostError::Io {
                    message: "kill build host".to_string(),
                    path: None,
                    source: Some(e),
                })?;
            }
        }
        Ok(())
    }
}

/// Verify the runtime launcher (or host executable) exists before spawning.
fn ensure_runtime_available(kind: BuildHostProcessKind, executable: &Path) -> Result<()> {
    let found = if executable.components().count() > 1 {
        // An explicit path, e.g. the desktop host executable.
        executable.is_file()
    } else {
        find_in_path(executable).is_some()
    };

    if found {
        Ok(())
    } else {
        Err(BuildHostError::RuntimeNotFound {
            kind,
            executable: executable.to_string_lossy().into_owned(),
        })
    }
}

fn find_in_path(program: &Path) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(program);
        if candidate.is_file() {
            return Some(candidate);
        }
        #[cfg(windows)]
        {
            let with_exe = candidate.with_extension("exe");
            if with_exe.is_file() {
                return Some(with_exe);
            }
        }
    }
    None
}
