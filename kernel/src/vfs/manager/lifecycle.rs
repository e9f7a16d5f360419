//! Create, delete and list for workspaces.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::naming::generate_name;
use super::types::{
    CleanOutcome, CreatedWorkspace, DeleteOutcome, DeleteReport, DeleteTarget, Workspace,
    WorkspaceError, WorkspaceName,
};
use crate::infrastructure::audit::{log_audit, AuditEvent};
use crate::infrastructure::config::{ConfigError, Settings};
use crate::vfs::clean::overlay_clean;
use crate::vfs::discovery::DiscoveryQuery;
use crate::vfs::mount::runner::CommandRunner;
use crate::vfs::mount::{occupied, MountDriver, MountError};
use crate::vfs::paths::{expand_home, parse_remote, RemoteSpec, RepoSource};
use crate::vfs::policy::CleanPolicy;

/// Manages workspaces under the configured overlay and sshfs roots.
///
/// Holds no workspace state; every call reads the mount table or the
/// directory tree afresh.
pub struct WorkspaceManager {
    settings: Settings,
    overlay_root: PathBuf,
    sshfs_root: PathBuf,
    driver: MountDriver,
    discovery: DiscoveryQuery,
}

impl std::fmt::Debug for WorkspaceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceManager")
            .field("overlay_root", &self.overlay_root)
            .field("sshfs_root", &self.sshfs_root)
            .field("ports", &self.settings.sshfs.ports)
            .field("driver", &self.driver)
            .finish_non_exhaustive()
    }
}

impl WorkspaceManager {
    /// Creates a manager from validated settings.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Config`] if the settings are invalid.
    pub fn new(settings: Settings, runner: Arc<dyn CommandRunner>) -> Result<Self, WorkspaceError> {
        settings.validate()?;
        Ok(Self {
            overlay_root: settings.overlay_root(),
            sshfs_root: settings.sshfs_root(),
            driver: MountDriver::new(&settings, runner),
            discovery: DiscoveryQuery::new(&settings),
            settings,
        })
    }

    /// Where the workspace `name` is exposed.
    #[must_use]
    pub fn overlay_path(&self, name: &WorkspaceName) -> PathBuf {
        self.overlay_root.join(name)
    }

    /// Where the remote layer of `name` is mounted.
    #[must_use]
    pub fn remote_path(&self, name: &WorkspaceName) -> PathBuf {
        self.sshfs_root.join(name)
    }

    /// Mount point of an existing workspace, for entering it.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::NotFound`] if nothing is at the mount point.
    pub fn locate(&self, name: &WorkspaceName) -> Result<PathBuf, WorkspaceError> {
        let path = self.overlay_path(name);
        if path.is_dir() {
            Ok(path)
        } else {
            Err(WorkspaceError::NotFound {
                name: name.to_string(),
                path,
            })
        }
    }

    /// Creates a workspace over `repo`.
    ///
    /// A leading `~` in `repo` is expanded before anything else looks at it.
    /// A remote `repo` is first mounted under the sshfs root, trying each
    /// configured port in order. The union layer then goes on top. A
    /// failure at any point removes everything this call attached.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The name is invalid or already in use
    /// - A local source does not exist
    /// - Every port fails (the last port's error is returned)
    /// - The union mount fails
    /// - `cancel` fires between steps
    #[instrument(skip(self, cancel))]
    pub async fn create(
        &self,
        repo: &str,
        name: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<CreatedWorkspace, WorkspaceError> {
        if repo.trim().is_empty() {
            return Err(WorkspaceError::InvalidSource(repo.to_string()));
        }
        let expanded = expand_home(repo.trim());
        if expanded.as_os_str().is_empty() {
            return Err(WorkspaceError::InvalidSource(repo.to_string()));
        }
        let repo = expanded.to_string_lossy();
        let repo: &str = &repo;
        let name = match name {
            Some(name) => WorkspaceName::new(name)?,
            None => generate_name(repo)?,
        };

        let mount_path = self.overlay_path(&name);
        if occupied(&mount_path) {
            return Err(WorkspaceError::AlreadyExists {
                name: name.to_string(),
                path: mount_path,
            });
        }

        let created = match parse_remote(repo) {
            RepoSource::Local(path) => self.create_local(name, &path, mount_path, cancel).await?,
            RepoSource::Remote(spec) => self.create_remote(name, &spec, mount_path, cancel).await?,
        };

        info!(name = %created.name, mount = %created.mount_path.display(), "Workspace created");
        log_audit(&AuditEvent::WorkspaceCreated {
            name: created.name.to_string(),
            mount_path: created.mount_path.display().to_string(),
            port: created.port,
        });
        Ok(created)
    }

    async fn create_local(
        &self,
        name: WorkspaceName,
        source: &Path,
        mount_path: PathBuf,
        cancel: &CancellationToken,
    ) -> Result<CreatedWorkspace, WorkspaceError> {
        let lower = dunce::canonicalize(source).map_err(|e| WorkspaceError::SourceNotFound {
            path: source.to_path_buf(),
            source: e,
        })?;
        if cancel.is_cancelled() {
            return Err(WorkspaceError::Cancelled {
                processed: 0,
                remaining: 1,
            });
        }

        self.driver.attach_overlay(&lower, &mount_path).await?;
        Ok(CreatedWorkspace {
            name,
            mount_path,
            remote_mount: None,
            port: None,
        })
    }

    async fn create_remote(
        &self,
        name: WorkspaceName,
        spec: &RemoteSpec,
        mount_path: PathBuf,
        cancel: &CancellationToken,
    ) -> Result<CreatedWorkspace, WorkspaceError> {
        if let Some(local) = &spec.local {
            warn!(
                local = %local.display(),
                user_host = %spec.user_host(),
                "Ignoring explicit local path; remote layers always mount under the sshfs root"
            );
        }

        let remote_dir = self.remote_path(&name);
        if occupied(&remote_dir) {
            return Err(WorkspaceError::AlreadyExists {
                name: name.to_string(),
                path: remote_dir,
            });
        }

        let port = self.attach_remote_any(spec, &remote_dir, cancel).await?;

        if cancel.is_cancelled() {
            self.rollback_remote(&name, &remote_dir, "operation cancelled").await;
            return Err(WorkspaceError::Cancelled {
                processed: 1,
                remaining: 1,
            });
        }

        if let Err(e) = self.driver.attach_overlay(&remote_dir, &mount_path).await {
            self.rollback_remote(&name, &remote_dir, &e.to_string()).await;
            return Err(e.into());
        }

        Ok(CreatedWorkspace {
            name,
            mount_path,
            remote_mount: Some(remote_dir),
            port: Some(port),
        })
    }

    /// Tries each configured port until one mounts. Partial state from a
    /// failed port is detached before the next.
    async fn attach_remote_any(
        &self,
        spec: &RemoteSpec,
        remote_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<u16, WorkspaceError> {
        let ports = &self.settings.sshfs.ports;
        let mut last_error: Option<MountError> = None;

        for (i, &port) in ports.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(WorkspaceError::Cancelled {
                    processed: i,
                    remaining: ports.len() - i,
                });
            }

            match self.driver.attach_remote(spec, remote_dir, port).await {
                Ok(()) => return Ok(port),
                Err(e) => {
                    warn!(port, error = %e, "Remote attach failed, trying next port");
                    if let Err(detach) = self.driver.detach_remote(remote_dir).await {
                        warn!(port, error = %detach, "Failed to clear partial remote mount");
                    }
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(e.into()),
            None => Err(ConfigError::InvalidPorts("at least one port is required".into()).into()),
        }
    }

    /// Undoes a remote attach. Failures are logged and never replace the
    /// error that caused the rollback.
    async fn rollback_remote(&self, name: &WorkspaceName, remote_dir: &Path, reason: &str) {
        warn!(name = %name, reason, "Rolling back remote layer");
        if let Err(e) = self.driver.detach_remote(remote_dir).await {
            warn!(name = %name, error = %e, "Rollback of remote layer failed");
        }
        log_audit(&AuditEvent::CreateRolledBack {
            name: name.to_string(),
            reason: reason.to_string(),
        });
    }

    /// Tears down one workspace or all of them.
    ///
    /// Each workspace loses its union layer first, then its remote layer.
    /// Failures are logged and collected in the report; they never stop the
    /// sweep. A workspace with nothing mounted is deleted successfully.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Cancelled`] if `cancel` fires between
    /// workspaces, or [`WorkspaceError::Discovery`] if the sweep cannot
    /// determine what exists.
    #[instrument(skip(self, cancel))]
    pub async fn delete(
        &self,
        target: &DeleteTarget,
        cancel: &CancellationToken,
    ) -> Result<DeleteReport, WorkspaceError> {
        let names = match target {
            DeleteTarget::Named(name) => vec![name.clone()],
            DeleteTarget::All => self
                .list(None, false)
                .await?
                .into_iter()
                .filter_map(|w| w.name)
                .filter_map(|name| match WorkspaceName::new(name.clone()) {
                    Ok(valid) => Some(valid),
                    Err(e) => {
                        warn!(name = %name, error = %e, "Skipping unmanageable mount");
                        None
                    }
                })
                .collect(),
        };

        let total = names.len();
        let mut report = DeleteReport::default();
        for (i, name) in names.iter().enumerate() {
            if cancel.is_cancelled() {
                let remaining = total - i;
                warn!(processed = i, remaining, "Delete cancelled");
                log_audit(&AuditEvent::SweepCancelled {
                    processed: i,
                    remaining,
                });
                return Err(WorkspaceError::Cancelled {
                    processed: i,
                    remaining,
                });
            }
            report.outcomes.push(self.teardown(name).await);
        }

        Ok(report)
    }

    async fn teardown(&self, name: &WorkspaceName) -> DeleteOutcome {
        let mut errors = Vec::new();

        if let Err(e) = self.driver.detach_overlay(&self.overlay_path(name)).await {
            warn!(name = %name, error = %e, "Overlay teardown failed");
            errors.push(e.to_string());
        }
        if let Err(e) = self.driver.detach_remote(&self.remote_path(name)).await {
            warn!(name = %name, error = %e, "Remote teardown failed");
            errors.push(e.to_string());
        }

        if errors.is_empty() {
            info!(name = %name, "Workspace deleted");
        }
        log_audit(&AuditEvent::WorkspaceDeleted {
            name: name.to_string(),
            errors: errors.clone(),
        });

        DeleteOutcome {
            name: name.to_string(),
            errors,
        }
    }

    /// Lists workspaces, optionally filtered.
    ///
    /// Without `verbose` the filter matches the name exactly. With
    /// `verbose` it matches any mount path ending in the filter, and sshfs
    /// mounts without an overlay are included under no name.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Discovery`] if neither the mount table nor
    /// the directory tree can be read.
    pub async fn list(
        &self,
        filter: Option<&str>,
        verbose: bool,
    ) -> Result<Vec<Workspace>, WorkspaceError> {
        let (strategy, found) = self.discovery.run(self.driver.runner(), verbose).await?;
        tracing::debug!(?strategy, count = found.len(), "Discovery finished");

        let Some(filter) = filter else {
            return Ok(found);
        };
        Ok(found
            .into_iter()
            .filter(|w| matches_filter(w, filter, verbose))
            .collect())
    }

    /// Removes a directory inside a workspace, escalating past permission
    /// and whiteout problems.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Policy`] if the path is refused, or
    /// [`WorkspaceError::Clean`] if it survives every removal step.
    #[instrument(skip(self))]
    pub async fn clean(&self, path: &Path, force: bool) -> Result<CleanOutcome, WorkspaceError> {
        let resolved = match CleanPolicy::new(force).validate_path(path) {
            Ok(resolved) => resolved,
            Err(e) => {
                log_audit(&AuditEvent::CleanRefused {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                });
                return Err(e.into());
            }
        };

        if !occupied(&resolved) {
            info!(path = %path.display(), "Path does not exist");
            return Ok(CleanOutcome::Missing(resolved));
        }

        overlay_clean(self.driver.runner(), &resolved).await?;
        info!(path = %resolved.display(), "Cleaned");
        Ok(CleanOutcome::Removed(resolved))
    }

    /// Settings this manager was built with.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

fn matches_filter(workspace: &Workspace, filter: &str, verbose: bool) -> bool {
    if verbose {
        workspace.mount_path.to_string_lossy().ends_with(filter)
    } else {
        workspace.name.as_deref() == Some(filter)
    }
}
