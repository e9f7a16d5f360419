use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

use super::scaffold::Scaffold;
use super::runner::Invocation;
use super::unmount::{escalate, UnmountStrategy};
use super::{occupied, MountDriver, MountError};
use crate::vfs::clean::remove_tree;

impl MountDriver {
    /// Mounts a union view of `lower` at `mount`.
    ///
    /// Creates the mount point and its `upper-`/`work-` siblings, checks the
    /// upper layer is writable before mounting, and removes whatever it
    /// created if any step fails.
    ///
    /// # Errors
    ///
    /// Returns [`MountError::UpperNotWritable`] from the pre-flight check,
    /// [`MountError::OverlayAttach`] if the mount command fails.
    #[instrument(skip(self))]
    pub async fn attach_overlay(&self, lower: &Path, mount: &Path) -> Result<Scaffold, MountError> {
        let scaffold = Scaffold::for_mount(mount)
            .ok_or_else(|| MountError::InvalidMountPoint(mount.to_path_buf()))?;

        let mut created: Vec<PathBuf> = Vec::with_capacity(3);
        for dir in scaffold.dirs() {
            let fresh = !dir.exists();
            if let Err(e) = fs::create_dir_all(dir) {
                self.discard(&created).await;
                return Err(MountError::CreateDir {
                    path: dir.to_path_buf(),
                    source: e,
                });
            }
            if fresh {
                created.push(dir.to_path_buf());
            }
        }

        if let Err(e) = preflight_write(&scaffold) {
            self.discard(&created).await;
            return Err(MountError::UpperNotWritable {
                path: scaffold.upper.clone(),
                source: e,
            });
        }

        let invocation = Invocation::new(
            &self.overlay.program,
            [
                "-o".to_string(),
                self.overlay_options(lower, &scaffold),
                scaffold.mount.to_string_lossy().into_owned(),
            ],
        );

        let detail = match self.runner.run(&invocation).await {
            Ok(out) if out.success() => {
                info!(mount = %scaffold.mount.display(), lower = %lower.display(), "Mounted overlay");
                return Ok(scaffold);
            }
            Ok(out) => out.describe(),
            Err(e) => e.to_string(),
        };

        self.discard(&created).await;
        Err(MountError::OverlayAttach {
            mount: scaffold.mount,
            detail,
        })
    }

    /// Unmounts the union view at `mount` and removes its scaffold.
    ///
    /// Unmount escalates normal, forced, lazy. Directory removal runs
    /// regardless of how the unmount went.
    ///
    /// # Errors
    ///
    /// Returns [`MountError::OverlayDetach`] naming every attempt if no
    /// unmount strategy worked, otherwise [`MountError::Cleanup`] if a
    /// directory could not be removed.
    #[instrument(skip(self))]
    pub async fn detach_overlay(&self, mount: &Path) -> Result<(), MountError> {
        let scaffold = Scaffold::for_mount(mount)
            .ok_or_else(|| MountError::InvalidMountPoint(mount.to_path_buf()))?;

        let unmount = if occupied(&scaffold.mount) {
            escalate(
                self.runner.as_ref(),
                &self.tools,
                &scaffold.mount,
                &UnmountStrategy::ESCALATION,
            )
            .await
            .map(Some)
        } else {
            debug!(mount = %scaffold.mount.display(), "No overlay mount point, skipping unmount");
            Ok(None)
        };

        let mut failures = Vec::new();
        for dir in scaffold.teardown_dirs() {
            if let Err(e) = remove_tree(self.runner.as_ref(), &dir).await {
                warn!(dir = %dir.display(), error = %e, "Failed to remove scaffold directory");
                failures.push(e.to_string());
            }
        }

        match unmount {
            Err(attempts) => Err(MountError::OverlayDetach {
                mount: scaffold.mount.clone(),
                attempts: attempts
                    .into_iter()
                    .map(|(strategy, detail)| format!("{strategy}: {detail}"))
                    .collect(),
            }),
            Ok(_) if !failures.is_empty() => Err(MountError::Cleanup {
                name: scaffold.name().to_string(),
                failures,
            }),
            Ok(_) => {
                info!(mount = %scaffold.mount.display(), "Detached overlay");
                Ok(())
            }
        }
    }

    fn overlay_options(&self, lower: &Path, scaffold: &Scaffold) -> String {
        let mut options = format!(
            "lowerdir={},upperdir={},workdir={}",
            lower.display(),
            scaffold.upper.display(),
            scaffold.work.display()
        );
        match self.overlay.index {
            Some(true) => options.push_str(",index=on"),
            Some(false) => options.push_str(",index=off"),
            None => {}
        }
        options
    }

    async fn discard(&self, dirs: &[PathBuf]) {
        for dir in dirs {
            if let Err(e) = remove_tree(self.runner.as_ref(), dir).await {
                warn!(dir = %dir.display(), error = %e, "Failed to clean up directory");
            }
        }
    }
}

fn preflight_write(scaffold: &Scaffold) -> std::io::Result<()> {
    let sentinel = scaffold.sentinel();
    fs::write(&sentinel, b"test")?;
    if let Err(e) = fs::remove_file(&sentinel) {
        debug!(file = %sentinel.display(), error = %e, "Failed to remove write test file");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::infrastructure::config::Settings;
    use crate::vfs::mount::runner::scripted::ScriptedRunner;
    use crate::vfs::mount::runner::CommandOutput;
    use crate::vfs::mount::{MountDriver, MountError};
    use std::fs;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn driver(runner: &Arc<ScriptedRunner>, index: Option<bool>) -> MountDriver {
        let mut settings = Settings::default();
        settings.overlay.index = index;
        MountDriver::new(&settings, runner.clone())
    }

    #[tokio::test]
    async fn test_attach_builds_scaffold_and_options() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let lower = dir.path().join("repo");
        fs::create_dir(&lower)?;
        let mount = dir.path().join("overlay/ws1");
        let runner = Arc::new(ScriptedRunner::succeeding());

        let scaffold = driver(&runner, Some(false)).attach_overlay(&lower, &mount).await?;

        for d in scaffold.dirs() {
            assert!(d.is_dir(), "{} should exist", d.display());
        }
        assert!(!scaffold.sentinel().exists(), "sentinel removed after pre-flight");

        let calls = runner.calls_to("fuse-overlayfs");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].args[0], "-o");
        assert_eq!(
            calls[0].args[1],
            format!(
                "lowerdir={},upperdir={},workdir={},index=off",
                lower.display(),
                scaffold.upper.display(),
                scaffold.work.display()
            )
        );
        assert_eq!(calls[0].args[2], mount.to_string_lossy());
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_attach_leaves_no_directories() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let mount = dir.path().join("ws1");
        let runner = Arc::new(ScriptedRunner::new(|inv| {
            if inv.program == "fuse-overlayfs" {
                CommandOutput::failed(1, "fuse: device not found")
            } else {
                CommandOutput::ok("")
            }
        }));

        let err = driver(&runner, None)
            .attach_overlay(dir.path(), &mount)
            .await
            .expect_err("mount fails");

        assert!(matches!(err, MountError::OverlayAttach { .. }));
        assert!(!mount.exists());
        assert!(!dir.path().join("upper-ws1").exists());
        assert!(!dir.path().join("work-ws1").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_detach_escalates_and_removes_scaffold() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let mount = dir.path().join("ws1");
        for name in ["ws1", "upper-ws1", "work-ws1"] {
            fs::create_dir(dir.path().join(name))?;
        }
        fs::write(dir.path().join("upper-ws1/edited.txt"), "delta")?;

        let runner = Arc::new(ScriptedRunner::new(|inv| {
            if inv.has_arg("-u") {
                CommandOutput::failed(1, "fusermount: failed to unmount: Device or resource busy")
            } else {
                CommandOutput::ok("")
            }
        }));

        driver(&runner, None).detach_overlay(&mount).await?;

        for name in ["ws1", "upper-ws1", "work-ws1"] {
            assert!(!dir.path().join(name).exists(), "{name} should be gone");
        }
        assert_eq!(runner.calls_to("fusermount").len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_detach_aggregates_failures_but_still_cleans() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let mount = dir.path().join("ws1");
        fs::create_dir(&mount)?;
        fs::create_dir(dir.path().join("work-ws1"))?;
        let runner = Arc::new(ScriptedRunner::new(|inv| {
            if inv.program == "rm" {
                CommandOutput::ok("")
            } else {
                CommandOutput::failed(32, "target is busy")
            }
        }));

        let err = driver(&runner, None)
            .detach_overlay(&mount)
            .await
            .expect_err("all unmounts fail");

        let MountError::OverlayDetach { attempts, .. } = err else {
            panic!("expected aggregated detach error, got {err}");
        };
        assert_eq!(attempts.len(), 3);
        assert!(attempts[0].starts_with("normal"));
        assert!(attempts[2].starts_with("lazy"));
        assert!(!mount.exists());
        assert!(!dir.path().join("work-ws1").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_detach_nothing_present_is_noop() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let runner = Arc::new(ScriptedRunner::succeeding());

        driver(&runner, None).detach_overlay(&dir.path().join("ghost")).await?;

        assert!(runner.calls().is_empty());
        Ok(())
    }
}
