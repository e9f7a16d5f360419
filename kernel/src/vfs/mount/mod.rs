//! Mount driver: one attach or detach of one layer per call.
//!
//! The remote layer is an sshfs mount under the sshfs root; the union layer
//! is a fuse-overlayfs mount under the overlay root with its `upper-` and
//! `work-` siblings. The driver never retries across ports and never
//! combines layers; that is the orchestrator's job.

mod overlay;
pub mod runner;
pub mod scaffold;
mod sshfs;
pub mod unmount;

pub use runner::{CommandOutput, CommandRunner, Invocation, RunError, SystemRunner};
pub use scaffold::Scaffold;
pub use unmount::{UnmountOutcome, UnmountStrategy};

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::infrastructure::config::{OverlaySettings, Settings, SshfsSettings, UnmountSettings};

/// Errors raised by a single attach or detach.
#[derive(Debug, Error)]
pub enum MountError {
    /// The path cannot carry a scaffold (no parent or no name).
    #[error("Invalid mount point: {0}")]
    InvalidMountPoint(PathBuf),
    /// A scaffold or mount directory could not be created.
    #[error("Failed to make directory {path}: {source}")]
    CreateDir {
        /// Directory that could not be created.
        path: PathBuf,
        /// Source error.
        #[source]
        source: std::io::Error,
    },
    /// The pre-flight write into the upper layer failed.
    #[error("Failed to write test file to upper directory {path} - check permissions: {source}")]
    UpperNotWritable {
        /// Upper directory.
        path: PathBuf,
        /// Source error.
        #[source]
        source: std::io::Error,
    },
    /// The remote mount command failed.
    #[error("Failed to mount sshfs {connection} on port {port}: {detail}")]
    RemoteAttach {
        /// `user@host:/dir`.
        connection: String,
        /// Port tried.
        port: u16,
        /// Exit status and diagnostics.
        detail: String,
    },
    /// The remote host rejected the login.
    #[error(
        "Failed to mount sshfs {connection} on port {port} - ensure ssh key authentication is set up for user {user}"
    )]
    Authentication {
        /// `user@host:/dir`.
        connection: String,
        /// Port tried.
        port: u16,
        /// Remote login user.
        user: String,
    },
    /// The remote unmount failed for a reason other than nothing mounted.
    #[error("Failed to unmount sshfs at {path}: {detail}")]
    RemoteDetach {
        /// Remote mount point.
        path: PathBuf,
        /// Exit status and diagnostics.
        detail: String,
    },
    /// The union mount command failed.
    #[error("Failed to mount overlay at {mount}: {detail}")]
    OverlayAttach {
        /// Union mount point.
        mount: PathBuf,
        /// Exit status and diagnostics.
        detail: String,
    },
    /// Normal, forced and lazy unmount all failed.
    #[error("All unmount attempts failed for {mount}: {}", .attempts.join("; "))]
    OverlayDetach {
        /// Union mount point.
        mount: PathBuf,
        /// One entry per strategy tried.
        attempts: Vec<String>,
    },
    /// Unmount succeeded but some scaffold directories remain.
    #[error("Cleanup errors occurred for workspace {name}: {}", .failures.join("; "))]
    Cleanup {
        /// Workspace name.
        name: String,
        /// One entry per directory left behind.
        failures: Vec<String>,
    },
}

/// Attaches and detaches individual layers.
#[derive(Clone)]
pub struct MountDriver {
    runner: Arc<dyn CommandRunner>,
    overlay: OverlaySettings,
    sshfs: SshfsSettings,
    tools: UnmountSettings,
}

impl std::fmt::Debug for MountDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountDriver")
            .field("overlay", &self.overlay)
            .field("sshfs", &self.sshfs)
            .field("tools", &self.tools)
            .finish_non_exhaustive()
    }
}

impl MountDriver {
    /// Creates a driver using the helper programs named in `settings`.
    #[must_use]
    pub fn new(settings: &Settings, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            overlay: settings.overlay.clone(),
            sshfs: settings.sshfs.clone(),
            tools: settings.unmount.clone(),
        }
    }

    /// Runner used for every external command.
    #[must_use]
    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    /// Unmount and listing tools.
    #[must_use]
    pub fn tools(&self) -> &UnmountSettings {
        &self.tools
    }
}

/// Whether anything occupies `path`. A dead FUSE mount fails `stat` with
/// something other than `NotFound`, so it counts as present.
pub(crate) fn occupied(path: &Path) -> bool {
    match fs::symlink_metadata(path) {
        Ok(_) => true,
        Err(e) => e.kind() != ErrorKind::NotFound,
    }
}
