//! Build host runtime classification.
//!
//! A project declares, through its file format, which runtime can load it:
//! SDK-style projects need the modern managed runtime, legacy projects need
//! the desktop framework on Windows or Mono elsewhere. The kind is chosen
//! once per project and a host process never changes kind.

use crate::error::{BuildHostError, Result};
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Which runtime a build host process runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildHostProcessKind {
    /// Modern managed runtime (`dotnet` launcher).
    NetCore,
    /// Legacy desktop framework; the host runs as its own executable.
    NetFramework,
    /// Mono runtime (`mono` launcher).
    Mono,
}

impl fmt::Display for BuildHostProcessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildHostProcessKind::NetCore => "NetCore",
            BuildHostProcessKind::NetFramework => "NetFramework",
            BuildHostProcessKind::Mono => "Mono",
        };
        write!(f, "{name}")
    }
}

/// Classify the host kind a project file requires.
///
/// Solution files always go to the modern runtime; project XML is sniffed
/// for the SDK-style shape.
pub fn kind_for_project_file(path: &Path) -> Result<BuildHostProcessKind> {
    if path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("sln"))
    {
        return Ok(BuildHostProcessKind::NetCore);
    }

    let contents = std::fs::read_to_string(path).map_err(|e| BuildHostError::Io {
        message: "read project file".to_string(),
        path: Some(path.to_path_buf()),
        source: Some(e),
    })?;

    let kind = kind_for_project_contents(&contents);
    debug!("classified {} as {}", path.display(), kind);
    Ok(kind)
}

/// Classify from project XML already in memory.
pub fn kind_for_project_contents(contents: &str) -> BuildHostProcessKind {
    if is_sdk_style(contents) {
        BuildHostProcessKind::NetCore
    } else if cfg!(windows) {
        BuildHostProcessKind::NetFramework
    } else {
        // Legacy projects off Windows need Mono's MSBuild.
        BuildHostProcessKind::Mono
    }
}

/// An SDK-style project declares `Sdk=` on its `<Project>` element or an
/// `<Sdk>` child element; legacy projects carry `ToolsVersion` and the
/// full msbuild namespace instead.
fn is_sdk_style(contents: &str) -> bool {
    contents.contains("Sdk=\"") || contents.contains("Sdk='") || contents.contains("<Sdk ")
}
