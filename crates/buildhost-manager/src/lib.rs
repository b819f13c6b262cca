//! Build host process management.
//!
//! Selects the runtime a project's build host must run under, constructs
//! the launch descriptor for it, spawns the process, and wires its
//! standard streams into an RPC client from `buildhost-rpc`.
//!
//! # Example
//!
//! ```rust,ignore
//! use buildhost_manager::{BuildHostOptions, BuildHostProcessManager, kind_for_project_file};
//!
//! # async fn load(path: &std::path::Path) -> buildhost_manager::Result<()> {
//! let options = BuildHostOptions::new("/opt/buildhost")
//!     .with_global_property("Configuration", "Release");
//! let manager = BuildHostProcessManager::new(options);
//!
//! let kind = kind_for_project_file(path)?;
//! let host = manager.get_or_launch(kind).await?;
//! let supported: bool = host
//!     .client()
//!     .invoke(0, "IsProjectFileSupported", vec![path.to_string_lossy().as_ref().into()])
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod descriptor;
pub mod error;
pub mod kind;
pub mod manager;

pub use descriptor::{
    ambient_locale, create_start_info, BuildHostOptions, ProcessLaunchDescriptor,
    HOST_ASSEMBLY_NAME, HOST_EXECUTABLE_NAME,
};
pub use error::{BuildHostError, Result};
pub use kind::{kind_for_project_contents, kind_for_project_file, BuildHostProcessKind};
pub use manager::{BuildHostConnection, BuildHostProcessManager};
