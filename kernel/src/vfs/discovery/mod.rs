//! Reconstructs the set of existing workspaces.
//!
//! There is no workspace database: the live mount table, or failing that
//! the directory tree under the configured roots, is the record. Results
//! are recomputed on every call.

pub mod mount_table;
pub mod walk;

use chrono::{DateTime, Local};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::infrastructure::config::Settings;
use crate::vfs::manager::types::{FilesystemKind, SourceKind, Workspace};
use crate::vfs::mount::runner::{CommandRunner, Invocation};
use crate::vfs::mount::scaffold::is_scaffold_name;
use mount_table::MountEntry;

/// Errors from workspace discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// A root exists but could not be read.
    #[error("Failed to read workspace root {root}: {source}")]
    Walk {
        /// Root being walked.
        root: PathBuf,
        /// Source error.
        #[source]
        source: walkdir::Error,
    },
}

/// Which listing strategy produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Parsed from the mount listing.
    MountTable,
    /// Walked from the directory tree.
    DirectoryTree,
}

/// Discovery over one pair of roots.
#[derive(Debug, Clone)]
pub struct DiscoveryQuery {
    overlay_root: PathBuf,
    sshfs_root: PathBuf,
    list_program: String,
}

impl DiscoveryQuery {
    /// Creates a query over the roots in `settings`.
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        Self::with_roots(
            settings.overlay_root(),
            settings.sshfs_root(),
            settings.unmount.list.clone(),
        )
    }

    /// Creates a query over explicit roots. Roots are canonicalized when
    /// they exist so they compare equal to mount-table paths.
    #[must_use]
    pub fn with_roots(overlay_root: PathBuf, sshfs_root: PathBuf, list_program: String) -> Self {
        Self {
            overlay_root: dunce::canonicalize(&overlay_root).unwrap_or(overlay_root),
            sshfs_root: dunce::canonicalize(&sshfs_root).unwrap_or(sshfs_root),
            list_program,
        }
    }

    /// Lists workspaces, preferring the mount table and falling back to the
    /// directory tree if the listing command fails.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError`] only if the fallback walk fails.
    #[instrument(skip(self, runner))]
    pub async fn run(
        &self,
        runner: &dyn CommandRunner,
        verbose: bool,
    ) -> Result<(Strategy, Vec<Workspace>), DiscoveryError> {
        let listing = Invocation::new(self.list_program.as_str(), std::iter::empty::<String>());
        match runner.run(&listing).await {
            Ok(out) if out.success() => {
                let found = self.from_table(&out.stdout, verbose);
                debug!(count = found.len(), "Discovered workspaces from mount table");
                Ok((Strategy::MountTable, found))
            }
            Ok(out) => {
                warn!(error = %out.describe(), "Mount listing failed, walking directories instead");
                self.from_tree(verbose).map(|w| (Strategy::DirectoryTree, w))
            }
            Err(e) => {
                warn!(error = %e, "Mount listing failed, walking directories instead");
                self.from_tree(verbose).map(|w| (Strategy::DirectoryTree, w))
            }
        }
    }

    /// Builds workspaces from mount-listing output.
    #[must_use]
    pub fn from_table(&self, listing: &str, verbose: bool) -> Vec<Workspace> {
        let mut overlays: Vec<(String, MountEntry)> = Vec::new();
        let mut remotes: Vec<(String, MountEntry)> = Vec::new();

        for entry in mount_table::parse(listing) {
            let Some(parent) = entry.mount_point.parent() else {
                continue;
            };
            let Some(name) = entry.mount_point.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if is_scaffold_name(name) {
                continue;
            }
            let name = name.to_string();
            if parent == self.overlay_root {
                overlays.push((name, entry));
            } else if parent == self.sshfs_root {
                remotes.push((name, entry));
            }
        }

        let remote_names: BTreeSet<&str> = remotes.iter().map(|(n, _)| n.as_str()).collect();
        let mut workspaces: Vec<Workspace> = overlays
            .iter()
            .map(|(name, entry)| Workspace {
                name: Some(name.clone()),
                mount_path: entry.mount_point.clone(),
                filesystem: FilesystemKind::from_fs_type(&entry.fs_type),
                source: if remote_names.contains(name.as_str()) {
                    SourceKind::Remote
                } else {
                    SourceKind::Local
                },
                created: created_time(&entry.mount_point),
            })
            .collect();

        if verbose {
            workspaces.extend(remotes.into_iter().map(|(_, entry)| Workspace {
                name: None,
                created: created_time(&entry.mount_point),
                filesystem: FilesystemKind::from_fs_type(&entry.fs_type),
                mount_path: entry.mount_point,
                source: SourceKind::Remote,
            }));
        }

        workspaces
    }

    /// Builds workspaces by walking the roots.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::Walk`] if a root exists but is unreadable.
    pub fn from_tree(&self, verbose: bool) -> Result<Vec<Workspace>, DiscoveryError> {
        walk::from_tree(&self.overlay_root, &self.sshfs_root, verbose)
    }

    /// Overlay root being queried.
    #[must_use]
    pub fn overlay_root(&self) -> &Path {
        &self.overlay_root
    }

    /// Sshfs root being queried.
    #[must_use]
    pub fn sshfs_root(&self) -> &Path {
        &self.sshfs_root
    }
}

/// Modification time of a mount point, if it can be read.
pub(crate) fn created_time(path: &Path) -> Option<DateTime<Local>> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Local>::from)
}
