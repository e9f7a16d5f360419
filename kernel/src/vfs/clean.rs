//! Directory removal that copes with what union filesystems leave behind.
//!
//! Upper layers can contain whiteout devices, opaque directories and modes
//! that stop a plain recursive remove. Removal therefore escalates from the
//! structured `remove_dir_all` to shelled-out tools.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::mount::runner::{CommandRunner, Invocation};

/// Errors from directory removal.
#[derive(Debug, Error)]
pub enum CleanError {
    /// Both the structured and the shelled-out remove failed.
    #[error("Failed to remove {path}: {structured}; rm -rf: {fallback}")]
    RemoveFailed {
        /// Directory that could not be removed.
        path: PathBuf,
        /// Error from `remove_dir_all`.
        structured: String,
        /// Error from `rm -rf`.
        fallback: String,
    },
    /// Every escalation step ran and the path is still there.
    #[error("{0} still exists after all removal attempts")]
    StillPresent(PathBuf),
}

/// Removes `path` recursively, falling back to `rm -rf`.
///
/// A path that does not exist is not an error.
///
/// # Errors
///
/// Returns [`CleanError::RemoveFailed`] if neither method removed it.
pub async fn remove_tree(runner: &dyn CommandRunner, path: &Path) -> Result<(), CleanError> {
    let structured = match fs::remove_dir_all(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Removed");
            return Ok(());
        }
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => e,
    };

    debug!(path = %path.display(), error = %structured, "Structured remove failed, using rm -rf");
    let rm = Invocation::new("rm", ["-rf".to_string(), path.to_string_lossy().into_owned()]);
    let fallback = match runner.run(&rm).await {
        Ok(out) if out.success() => return Ok(()),
        Ok(out) => out.describe(),
        Err(e) => e.to_string(),
    };

    Err(CleanError::RemoveFailed {
        path: path.to_path_buf(),
        structured: structured.to_string(),
        fallback,
    })
}

/// Removes a directory from inside a workspace, escalating through
/// progressively blunter methods until it is gone.
///
/// Steps: structured remove; normalize permissions and retry; `find -depth
/// -delete`; delete files then empty directories; a last `remove_dir`.
///
/// # Errors
///
/// Returns [`CleanError::StillPresent`] if the path survives every step.
pub async fn overlay_clean(runner: &dyn CommandRunner, path: &Path) -> Result<(), CleanError> {
    if fs::symlink_metadata(path).is_err() {
        return Ok(());
    }
    let owned = path.to_string_lossy().into_owned();
    let target = owned.as_str();

    if fs::remove_dir_all(path).is_ok() {
        return Ok(());
    }

    info!(path = %path.display(), "Normalizing permissions before retrying removal");
    run_quiet(runner, &["find", target, "-type", "d", "-exec", "chmod", "755", "{}", "+"]).await;
    run_quiet(runner, &["find", target, "-type", "f", "-exec", "chmod", "644", "{}", "+"]).await;
    if fs::remove_dir_all(path).is_ok() {
        return Ok(());
    }

    if run_quiet(runner, &["find", target, "-depth", "-delete"]).await && !exists(path) {
        return Ok(());
    }

    run_quiet(runner, &["find", target, "-type", "f", "-delete"]).await;
    run_quiet(runner, &["find", target, "-type", "d", "-empty", "-delete"]).await;

    let _ = fs::remove_dir(path);

    if exists(path) {
        warn!(path = %path.display(), "Path survived all removal attempts");
        return Err(CleanError::StillPresent(path.to_path_buf()));
    }
    Ok(())
}

fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

async fn run_quiet(runner: &dyn CommandRunner, argv: &[&str]) -> bool {
    let Some((program, args)) = argv.split_first() else {
        return false;
    };
    let invocation = Invocation::new(*program, args.iter().copied());
    match runner.run(&invocation).await {
        Ok(out) => {
            if !out.success() {
                debug!(command = %invocation, error = %out.describe(), "Removal step failed");
            }
            out.success()
        }
        Err(e) => {
            debug!(command = %invocation, error = %e, "Removal step failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::mount::runner::scripted::ScriptedRunner;
    use crate::vfs::mount::runner::{CommandOutput, SystemRunner};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_remove_tree_structured() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let target = dir.path().join("upper-ws1");
        fs::create_dir_all(target.join("a/b"))?;
        fs::write(target.join("a/b/file.txt"), "x")?;

        let runner = ScriptedRunner::succeeding();
        remove_tree(&runner, &target).await?;

        assert!(!target.exists());
        assert!(runner.calls().is_empty(), "no fallback needed");
        Ok(())
    }

    #[tokio::test]
    async fn test_remove_tree_missing_is_ok() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let runner = ScriptedRunner::succeeding();
        remove_tree(&runner, &dir.path().join("absent")).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_remove_tree_reports_both_failures() -> anyhow::Result<()> {
        let dir = tempdir()?;
        // A regular file makes remove_dir_all fail with NotADirectory.
        let target = dir.path().join("not-a-dir");
        fs::write(&target, "x")?;

        let runner = ScriptedRunner::new(|_| CommandOutput::failed(1, "rm: cannot remove"));
        let err = remove_tree(&runner, &target).await.expect_err("both fail");

        assert!(matches!(err, CleanError::RemoveFailed { .. }));
        assert_eq!(runner.calls_to("rm").len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_overlay_clean_removes_nested_tree() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let target = dir.path().join("build");
        fs_extra::dir::create_all(target.join("obj/deep"), false).map_err(|e| anyhow::anyhow!(e))?;
        fs::write(target.join("obj/deep/out.o"), "bin")?;

        overlay_clean(&SystemRunner, &target).await?;
        assert!(!target.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_overlay_clean_missing_path_is_noop() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let runner = ScriptedRunner::succeeding();
        overlay_clean(&runner, &dir.path().join("nothing")).await?;
        assert!(runner.calls().is_empty());
        Ok(())
    }
}
