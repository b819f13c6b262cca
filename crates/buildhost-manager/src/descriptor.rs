//! Launch descriptor construction.
//!
//! `create_start_info` is a pure function from a host kind plus the
//! manager's options to the executable and argument list that would spawn
//! it. Nothing here touches the process table, so descriptors are safe to
//! build repeatedly (and to assert on in tests).

use crate::kind::BuildHostProcessKind;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File name of the managed build host assembly, launched via `dotnet`
/// or `mono`.
pub const HOST_ASSEMBLY_NAME: &str = "BuildHost.dll";
/// File name of the desktop-framework build host, which runs directly.
pub const HOST_EXECUTABLE_NAME: &str = "BuildHost.exe";

/// Configuration shared by every host the manager launches.
#[derive(Debug, Clone)]
pub struct BuildHostOptions {
    /// Directory holding the build host binaries.
    pub host_directory: PathBuf,
    /// When set, the host writes an MSBuild binary log here.
    pub binary_log_path: Option<PathBuf>,
    /// Global MSBuild properties passed to every host. BTreeMap so the
    /// argument list is deterministic for equal configuration.
    pub global_properties: BTreeMap<String, String>,
    /// Culture name forwarded to the host so its diagnostics match the
    /// caller's locale.
    pub locale: String,
}

impl BuildHostOptions {
    pub fn new(host_directory: impl Into<PathBuf>) -> Self {
        Self {
            host_directory: host_directory.into(),
            binary_log_path: None,
            global_properties: BTreeMap::new(),
            locale: ambient_locale(),
        }
    }

    pub fn with_binary_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.binary_log_path = Some(path.into());
        self
    }

    pub fn with_global_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.global_properties.insert(key.into(), value.into());
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }
}

/// Everything needed to spawn one build host process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessLaunchDescriptor {
    pub executable: PathBuf,
    pub arguments: Vec<String>,
    pub working_directory: Option<PathBuf>,
    pub environment: BTreeMap<String, String>,
}

/// Build the launch descriptor for a host kind.
pub fn create_start_info(
    kind: BuildHostProcessKind,
    options: &BuildHostOptions,
) -> ProcessLaunchDescriptor {
    let host_assembly = options.host_directory.join(HOST_ASSEMBLY_NAME);

    let mut arguments = Vec::new();
    let executable = match kind {
        BuildHostProcessKind::NetCore => {
            // Always roll forward across major runtime versions so the
            // host tolerates SDK version skew on the machine.
            arguments.push("--roll-forward".to_string());
            arguments.push("LatestMajor".to_string());
            arguments.push(path_argument(&host_assembly));
            PathBuf::from("dotnet")
        }
        BuildHostProcessKind::NetFramework => options.host_directory.join(HOST_EXECUTABLE_NAME),
        BuildHostProcessKind::Mono => {
            arguments.push(path_argument(&host_assembly));
            PathBuf::from("mono")
        }
    };

    append_common_arguments(&mut arguments, options);

    ProcessLaunchDescriptor {
        executable,
        arguments,
        working_directory: None,
        environment: BTreeMap::new(),
    }
}

fn append_common_arguments(arguments: &mut Vec<String>, options: &BuildHostOptions) {
    if let Some(ref binlog) = options.binary_log_path {
        arguments.push("--binlog".to_string());
        arguments.push(path_argument(binlog));
    }

    arguments.push("--locale".to_string());
    arguments.push(options.locale.clone());

    // One --property token per pair; the flag is never combined with its
    // value into a single token.
    for (key, value) in &options.global_properties {
        arguments.push("--property".to_string());
        arguments.push(format!("{key}={value}"));
    }
}

fn path_argument(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// The caller's ambient culture name, used as the default `--locale`.
///
/// Reads the usual POSIX locale variables and normalizes entries like
/// `en_US.UTF-8` to `en-US`; `C`/`POSIX` and unset fall back to `en-US`.
pub fn ambient_locale() -> String {
    for var in ["LC_ALL", "LC_MESSAGES", "LANG"] {
        if let Ok(value) = std::env::var(var) {
            if let Some(locale) = normalize_locale(&value) {
                return locale;
            }
        }
    }
    "en-US".to_string()
}

fn normalize_locale(raw: &str) -> Option<String> {
    let base = raw.split('.').next().unwrap_or(raw).trim();
    if base.is_empty() || base == "C" || base == "POSIX" {
        return None;
    }
    Some(base.replace('_', "-"))
}
