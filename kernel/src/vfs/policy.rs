//! Guard rails for `clean`.
//!
//! Cleaning escalates to `find -delete`, so the target must be checked before
//! anything runs: system directories are never touched, and absolute paths
//! need an explicit `--force`.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Directories that are refused, together with everything below them.
/// `/` is refused only as itself.
pub const PROTECTED_PATHS: [&str; 12] = [
    "/", "/usr", "/etc", "/var", "/sys", "/proc", "/dev", "/boot", "/lib", "/lib64", "/sbin",
    "/bin",
];

/// Why a clean target was refused.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// An absolute path was given without `--force`.
    #[error("Absolute paths not allowed without --force: {0}")]
    AbsoluteWithoutForce(PathBuf),
    /// The path is, or resolves into, a protected system directory.
    #[error("Cannot clean system directory: {0}")]
    SystemPath(PathBuf),
    /// The path exists but could not be resolved.
    #[error("Invalid path '{path}': {source}")]
    InvalidPath {
        /// Path as given.
        path: PathBuf,
        /// Resolution error.
        #[source]
        source: std::io::Error,
    },
}

/// Decides whether a path may be cleaned.
#[derive(Debug, Clone)]
pub struct CleanPolicy {
    protected: Vec<PathBuf>,
    allow_absolute: bool,
}

impl Default for CleanPolicy {
    fn default() -> Self {
        Self::new(false)
    }
}

impl CleanPolicy {
    /// Creates a policy; `force` permits absolute paths.
    #[must_use]
    pub fn new(force: bool) -> Self {
        Self {
            protected: PROTECTED_PATHS.iter().map(PathBuf::from).collect(),
            allow_absolute: force,
        }
    }

    /// Checks `target` and returns the path to clean.
    ///
    /// Existing paths are canonicalized so that `..` or a symlink cannot
    /// reach a protected directory. A missing path is returned as given; the
    /// caller treats it as a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The path is absolute and `force` was not given
    /// - The path, lexically or after resolution, is a system directory
    /// - The path exists but cannot be canonicalized
    pub fn validate_path(&self, target: &Path) -> Result<PathBuf, PolicyError> {
        if target.is_absolute() && !self.allow_absolute {
            return Err(PolicyError::AbsoluteWithoutForce(target.to_path_buf()));
        }

        let lexical = normalize(target);
        if self.is_protected(&lexical) {
            return Err(PolicyError::SystemPath(lexical));
        }

        if std::fs::symlink_metadata(target).is_err() {
            return Ok(target.to_path_buf());
        }

        let canonical = dunce::canonicalize(target).map_err(|e| PolicyError::InvalidPath {
            path: target.to_path_buf(),
            source: e,
        })?;
        if self.is_protected(&canonical) {
            return Err(PolicyError::SystemPath(canonical));
        }
        Ok(canonical)
    }

    fn is_protected(&self, path: &Path) -> bool {
        if !path.is_absolute() {
            return false;
        }
        self.protected.iter().any(|p| {
            if p.parent().is_none() {
                path == p
            } else {
                path.starts_with(p)
            }
        })
    }
}

/// Collapses `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_system_paths_refused_even_with_force() {
        let policy = CleanPolicy::new(true);
        for path in ["/", "/usr", "/usr/lib/x86_64", "/etc/", "/proc/1", "/bin"] {
            assert!(
                matches!(policy.validate_path(Path::new(path)), Err(PolicyError::SystemPath(_))),
                "{path} should be refused"
            );
        }
    }

    #[test]
    fn test_absolute_needs_force() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let target = dir.path().join("build");
        fs_extra::dir::create_all(&target, false).map_err(|e| anyhow::anyhow!(e))?;

        let strict = CleanPolicy::default();
        assert!(matches!(
            strict.validate_path(&target),
            Err(PolicyError::AbsoluteWithoutForce(_))
        ));

        let forced = CleanPolicy::new(true);
        let resolved = forced.validate_path(&target).map_err(|e| anyhow::anyhow!(e))?;
        assert_eq!(resolved, dunce::canonicalize(&target)?);
        Ok(())
    }

    #[test]
    fn test_parent_traversal_into_system_dir() {
        let policy = CleanPolicy::new(true);
        let tricky = Path::new("/home/../usr/share");
        assert!(matches!(
            policy.validate_path(tricky),
            Err(PolicyError::SystemPath(p)) if p == Path::new("/usr/share")
        ));
    }

    #[test]
    fn test_prefix_is_not_a_parent() {
        let policy = CleanPolicy::new(true);
        // `/binaries` shares a string prefix with `/bin` but is not below it.
        assert!(!policy.is_protected(Path::new("/binaries/out")));
        assert!(policy.is_protected(Path::new("/bin/ls")));
    }

    #[test]
    fn test_missing_relative_path_passes_through() -> anyhow::Result<()> {
        let policy = CleanPolicy::default();
        let path = Path::new("does-not-exist/build");
        assert_eq!(policy.validate_path(path).map_err(|e| anyhow::anyhow!(e))?, path);
        Ok(())
    }
}
