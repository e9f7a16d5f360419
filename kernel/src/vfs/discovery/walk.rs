//! Directory-tree fallback used when the mount table cannot be read.
//!
//! Every non-scaffold directory one level below a root is taken to be a
//! workspace. Leftover directories from an interrupted delete look the same
//! as live mounts here.

use std::collections::BTreeSet;
use std::path::Path;
use walkdir::WalkDir;

use super::{created_time, DiscoveryError};
use crate::vfs::manager::types::{FilesystemKind, SourceKind, Workspace};
use crate::vfs::mount::scaffold::is_scaffold_name;

/// Names of workspace directories directly below `root`. A missing root
/// yields an empty set.
///
/// # Errors
///
/// Returns [`DiscoveryError::Walk`] if the root exists but cannot be read.
pub fn workspace_dirs(root: &Path) -> Result<BTreeSet<String>, DiscoveryError> {
    if !root.is_dir() {
        return Ok(BTreeSet::new());
    }

    let mut names = BTreeSet::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| DiscoveryError::Walk {
            root: root.to_path_buf(),
            source: e,
        })?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if !is_scaffold_name(name) {
            names.insert(name.to_string());
        }
    }
    Ok(names)
}

/// Builds workspaces from the overlay root, plus anonymous sshfs entries in
/// verbose mode.
///
/// # Errors
///
/// Propagates [`workspace_dirs`] failures.
pub fn from_tree(
    overlay_root: &Path,
    sshfs_root: &Path,
    verbose: bool,
) -> Result<Vec<Workspace>, DiscoveryError> {
    let remote_names = workspace_dirs(sshfs_root)?;
    let mut workspaces: Vec<Workspace> = workspace_dirs(overlay_root)?
        .into_iter()
        .map(|name| {
            let mount_path = overlay_root.join(&name);
            let source = if remote_names.contains(&name) {
                SourceKind::Remote
            } else {
                SourceKind::Local
            };
            Workspace {
                created: created_time(&mount_path),
                name: Some(name),
                mount_path,
                filesystem: FilesystemKind::Overlay,
                source,
            }
        })
        .collect();

    if verbose {
        workspaces.extend(remote_names.into_iter().map(|name| {
            let mount_path = sshfs_root.join(name);
            Workspace {
                name: None,
                created: created_time(&mount_path),
                mount_path,
                filesystem: FilesystemKind::Sshfs,
                source: SourceKind::Remote,
            }
        }));
    }

    Ok(workspaces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_scaffold_dirs_are_filtered() -> anyhow::Result<()> {
        let dir = tempdir()?;
        for name in ["ws1", "upper-ws1", "work-ws1", "cow-old"] {
            fs::create_dir(dir.path().join(name))?;
        }
        fs::write(dir.path().join("stray.txt"), "")?;

        let names = workspace_dirs(dir.path())?;
        assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["ws1"]);
        Ok(())
    }

    #[test]
    fn test_missing_root_is_empty() -> anyhow::Result<()> {
        let dir = tempdir()?;
        assert!(workspace_dirs(&dir.path().join("absent"))?.is_empty());
        Ok(())
    }

    #[test]
    fn test_remote_source_and_verbose_entries() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let overlay = dir.path().join("overlay");
        let sshfs = dir.path().join("sshfs");
        fs::create_dir_all(overlay.join("local-ws"))?;
        fs::create_dir_all(overlay.join("remote-ws"))?;
        fs::create_dir_all(sshfs.join("remote-ws"))?;

        let plain = from_tree(&overlay, &sshfs, false)?;
        assert_eq!(plain.len(), 2);
        assert_eq!(plain[0].name.as_deref(), Some("local-ws"));
        assert_eq!(plain[0].source, SourceKind::Local);
        assert_eq!(plain[1].source, SourceKind::Remote);
        assert!(plain[0].created.is_some());

        let verbose = from_tree(&overlay, &sshfs, true)?;
        assert_eq!(verbose.len(), 3);
        assert_eq!(verbose[2].name, None);
        assert_eq!(verbose[2].filesystem, FilesystemKind::Sshfs);
        assert_eq!(verbose[2].mount_path, sshfs.join("remote-ws"));
        Ok(())
    }
}
