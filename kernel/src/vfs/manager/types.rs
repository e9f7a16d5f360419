//! Types for workspace lifecycle management.
//!
//! This module provides error types and data structures shared by the
//! orchestrator and the discovery query.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

use crate::infrastructure::config::ConfigError;
use crate::vfs::clean::CleanError;
use crate::vfs::discovery::DiscoveryError;
use crate::vfs::mount::scaffold::is_scaffold_name;
use crate::vfs::mount::MountError;
use crate::vfs::policy::PolicyError;

/// Errors that can occur during workspace operations.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// Settings failed validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    /// The workspace name is unusable as a mount point name.
    #[error("Invalid workspace name '{name}': {reason}")]
    InvalidName {
        /// Name that was rejected.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },
    /// A workspace of this name already has a mount point.
    #[error("Workspace '{name}' already exists at {path}")]
    AlreadyExists {
        /// Workspace name.
        name: String,
        /// Existing mount point.
        path: PathBuf,
    },
    /// No workspace of this name is mounted.
    #[error("Workspace '{name}' not found at {path}")]
    NotFound {
        /// Workspace name.
        name: String,
        /// Expected mount point.
        path: PathBuf,
    },
    /// The local repository path is missing or unreadable.
    #[error("Repository path '{path}' is not accessible: {source}")]
    SourceNotFound {
        /// Path that was given.
        path: PathBuf,
        /// Source error.
        #[source]
        source: std::io::Error,
    },
    /// The repository argument resolved to nothing usable.
    #[error("Invalid repository '{0}'")]
    InvalidSource(String),
    /// Every candidate port failed; carries the last port's error.
    #[error("{0}")]
    Mount(#[from] MountError),
    /// The workspace set could not be determined.
    #[error("Failed to query workspaces: {0}")]
    Discovery(#[from] DiscoveryError),
    /// A clean target was refused.
    #[error(transparent)]
    Policy(#[from] PolicyError),
    /// A clean target could not be removed.
    #[error(transparent)]
    Clean(#[from] CleanError),
    /// The operation was interrupted between steps.
    #[error("Operation cancelled")]
    Cancelled {
        /// Steps finished before the interruption.
        processed: usize,
        /// Steps not started.
        remaining: usize,
    },
}

/// A validated workspace name: one non-empty path segment that does not
/// collide with scaffold directories.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkspaceName(String);

impl WorkspaceName {
    /// Validates `name`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::InvalidName`] if the name is empty, is not a
    /// single path segment, or starts with a scaffold prefix.
    pub fn new(name: impl Into<String>) -> Result<Self, WorkspaceError> {
        let name = name.into();
        let reason = if name.is_empty() {
            Some("name is empty")
        } else if name.contains('/') || name.contains('\0') {
            Some("name must be a single path segment")
        } else if !matches!(Path::new(&name).components().next(), Some(Component::Normal(_))) {
            Some("name must not be '.' or '..'")
        } else if is_scaffold_name(&name) {
            Some("names starting with upper-, work- or cow- are reserved")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(WorkspaceError::InvalidName { name, reason }),
            None => Ok(Self(name)),
        }
    }

    /// The name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkspaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<Path> for WorkspaceName {
    fn as_ref(&self) -> &Path {
        Path::new(&self.0)
    }
}

/// Filesystem type reported by the mount table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilesystemKind {
    /// Kernel overlay or fuse-overlayfs.
    Overlay,
    /// sshfs.
    Sshfs,
    /// Anything else, verbatim.
    Other(String),
}

impl FilesystemKind {
    /// Maps a mount-table type such as `fuse.sshfs` to a kind.
    #[must_use]
    pub fn from_fs_type(fs_type: &str) -> Self {
        if fs_type.contains("overlay") {
            Self::Overlay
        } else if fs_type.contains("sshfs") {
            Self::Sshfs
        } else {
            Self::Other(fs_type.to_string())
        }
    }
}

impl fmt::Display for FilesystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overlay => f.write_str("overlay"),
            Self::Sshfs => f.write_str("sshfs"),
            Self::Other(kind) => f.write_str(kind),
        }
    }
}

/// Where the lower layer of a workspace lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// A local directory.
    Local,
    /// An sshfs mount of a remote directory.
    Remote,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::Remote => "remote",
        })
    }
}

/// A workspace as reconstructed from the mount table or directory tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Workspace {
    /// Name; `None` for sshfs mounts surfaced only in verbose listings.
    pub name: Option<String>,
    /// Where the view is mounted.
    pub mount_path: PathBuf,
    /// Filesystem type.
    pub filesystem: FilesystemKind,
    /// Lower layer kind.
    pub source: SourceKind,
    /// Mount point modification time.
    pub created: Option<DateTime<Local>>,
}

/// Which workspaces a delete applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteTarget {
    /// One workspace by name.
    Named(WorkspaceName),
    /// Every discovered workspace.
    All,
}

/// Result of tearing down one workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Workspace name.
    pub name: String,
    /// Logged, non-fatal layer failures.
    pub errors: Vec<String>,
}

impl DeleteOutcome {
    /// Whether both layers came down without error.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Result of a delete, one entry per workspace processed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    /// Workspaces processed, in order.
    pub outcomes: Vec<DeleteOutcome>,
}

impl DeleteReport {
    /// Iterates over every error across all workspaces.
    pub fn errors(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .flat_map(|o| o.errors.iter().map(String::as_str))
    }
}

/// Result of a successful create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedWorkspace {
    /// Workspace name.
    pub name: WorkspaceName,
    /// Where the writable view is mounted.
    pub mount_path: PathBuf,
    /// Remote mount point, if the source is remote.
    pub remote_mount: Option<PathBuf>,
    /// Port the remote layer attached on.
    pub port: Option<u16>,
}

/// Result of cleaning one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanOutcome {
    /// The directory was removed.
    Removed(PathBuf),
    /// Nothing existed at the path.
    Missing(PathBuf),
}
