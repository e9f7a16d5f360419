use nix::unistd::{getgid, getuid};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

use super::runner::{CommandOutput, Invocation};
use super::unmount::{escalate, UnmountStrategy};
use super::{occupied, MountDriver, MountError};
use crate::vfs::paths::RemoteSpec;

impl MountDriver {
    /// Mounts `remote` at `local_dir` over one port.
    ///
    /// `local_dir` is created if needed and removed again if this call
    /// created it and the mount fails. The attempt is bounded by the
    /// configured deadline.
    ///
    /// # Errors
    ///
    /// Returns [`MountError::Authentication`] when the diagnostics show a
    /// rejected login, [`MountError::RemoteAttach`] for any other failure.
    #[instrument(skip(self, remote), fields(connection = %remote.connection()))]
    pub async fn attach_remote(
        &self,
        remote: &RemoteSpec,
        local_dir: &Path,
        port: u16,
    ) -> Result<(), MountError> {
        let created = !local_dir.exists();
        fs::create_dir_all(local_dir).map_err(|e| MountError::CreateDir {
            path: local_dir.to_path_buf(),
            source: e,
        })?;

        let invocation = Invocation::new(&self.sshfs.program, self.sshfs_args(remote, local_dir, port))
            .with_timeout(self.sshfs.timeout());

        let failure = match self.runner.run(&invocation).await {
            Ok(out) if out.success() => {
                info!(mount = %local_dir.display(), port, "Mounted sshfs");
                return Ok(());
            }
            Ok(out) => attach_failure(remote, port, &out),
            Err(e) => MountError::RemoteAttach {
                connection: remote.connection(),
                port,
                detail: e.to_string(),
            },
        };

        if created {
            if let Err(e) = fs::remove_dir(local_dir) {
                if e.kind() != ErrorKind::NotFound {
                    warn!(dir = %local_dir.display(), error = %e, "Failed to clean up mount directory");
                }
            }
        }

        Err(failure)
    }

    /// Unmounts the remote layer at `local_dir` and removes the directory.
    ///
    /// A missing directory or an empty mount point is a no-op. The directory
    /// is removed whether or not the unmount worked; removal is
    /// non-recursive so a still-attached remote tree is never deleted.
    ///
    /// # Errors
    ///
    /// Returns [`MountError::RemoteDetach`] if the unmount itself failed.
    #[instrument(skip(self))]
    pub async fn detach_remote(&self, local_dir: &Path) -> Result<(), MountError> {
        if !occupied(local_dir) {
            debug!(dir = %local_dir.display(), "No remote mount point, nothing to detach");
            return Ok(());
        }

        let unmount = escalate(
            self.runner.as_ref(),
            &self.tools,
            local_dir,
            &[UnmountStrategy::Normal],
        )
        .await;

        match fs::remove_dir(local_dir) {
            Ok(()) => debug!(dir = %local_dir.display(), "Removed remote mount point"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(dir = %local_dir.display(), error = %e, "Failed to remove remote mount point"),
        }

        match unmount {
            Ok(_) => {
                info!(dir = %local_dir.display(), "Detached sshfs");
                Ok(())
            }
            Err(failures) => Err(MountError::RemoteDetach {
                path: local_dir.to_path_buf(),
                detail: failures
                    .into_iter()
                    .map(|(_, detail)| detail)
                    .collect::<Vec<_>>()
                    .join("; "),
            }),
        }
    }

    fn sshfs_args(&self, remote: &RemoteSpec, local_dir: &Path, port: u16) -> Vec<String> {
        let mut args = vec![
            remote.connection(),
            local_dir.to_string_lossy().into_owned(),
            "-o".to_string(),
            format!("port={port}"),
            "-o".to_string(),
            permission_mapping(),
        ];
        for option in &self.sshfs.options {
            args.push("-o".to_string());
            args.push(option.clone());
        }
        args
    }
}

/// Maps remote ownership onto the invoking user unless running as root.
fn permission_mapping() -> String {
    let uid = getuid();
    if uid.is_root() {
        "umask=022".to_string()
    } else {
        format!("uid={uid},gid={},umask=022", getgid())
    }
}

fn attach_failure(remote: &RemoteSpec, port: u16, out: &CommandOutput) -> MountError {
    let diagnostics = format!("{}{}", out.stderr, out.stdout);
    if diagnostics.contains("Permission denied") || diagnostics.contains("password") {
        return MountError::Authentication {
            connection: remote.connection(),
            port,
            user: remote.user.clone(),
        };
    }
    MountError::RemoteAttach {
        connection: remote.connection(),
        port,
        detail: out.describe(),
    }
}
