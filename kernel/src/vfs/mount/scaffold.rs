//! Directory naming convention shared by the driver and discovery.
//!
//! A workspace mounted at `<root>/<name>` keeps its writable layer in
//! `<root>/upper-<name>` and the union scratch area in `<root>/work-<name>`.
//! Nothing else records that these belong together.

use std::path::{Path, PathBuf};

/// Prefix of the writable layer directory.
pub const UPPER_PREFIX: &str = "upper-";
/// Prefix of the union scratch directory.
pub const WORK_PREFIX: &str = "work-";
/// Prefix older releases used for the writable layer.
pub const LEGACY_UPPER_PREFIX: &str = "cow-";
/// File written and removed to prove the upper layer is writable.
pub const WRITE_SENTINEL: &str = ".write_test";

/// Whether a directory name is an internal scaffold artifact.
#[must_use]
pub fn is_scaffold_name(name: &str) -> bool {
    [UPPER_PREFIX, WORK_PREFIX, LEGACY_UPPER_PREFIX]
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

/// The three directories backing one union mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scaffold {
    /// Where the merged view is exposed.
    pub mount: PathBuf,
    /// Writable layer.
    pub upper: PathBuf,
    /// Union scratch directory.
    pub work: PathBuf,
}

impl Scaffold {
    /// Derives the scaffold of a mount point. Returns `None` if the path
    /// has no parent or no final segment.
    #[must_use]
    pub fn for_mount(mount: &Path) -> Option<Self> {
        let mount: PathBuf = mount.components().collect();
        let parent = mount.parent()?;
        let name = mount.file_name()?.to_str()?;
        if parent.as_os_str().is_empty() {
            return None;
        }

        Some(Self {
            upper: parent.join(format!("{UPPER_PREFIX}{name}")),
            work: parent.join(format!("{WORK_PREFIX}{name}")),
            mount,
        })
    }

    /// Workspace name (final segment of the mount point).
    #[must_use]
    pub fn name(&self) -> &str {
        self.mount
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    /// Upper directory under the legacy `cow-` prefix.
    #[must_use]
    pub fn legacy_upper(&self) -> PathBuf {
        self.mount.with_file_name(format!("{LEGACY_UPPER_PREFIX}{}", self.name()))
    }

    /// Mount point, upper and work directories, in creation order.
    #[must_use]
    pub fn dirs(&self) -> [&Path; 3] {
        [&self.mount, &self.upper, &self.work]
    }

    /// Directories removed on teardown, mount point first.
    #[must_use]
    pub fn teardown_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.mount.clone(),
            self.work.clone(),
            self.upper.clone(),
            self.legacy_upper(),
        ]
    }

    /// Path of the pre-flight sentinel file.
    #[must_use]
    pub fn sentinel(&self) -> PathBuf {
        self.upper.join(WRITE_SENTINEL)
    }
}
