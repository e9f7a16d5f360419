//! Toolchain and root checks for `status`.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::infrastructure::config::Settings;

/// Where one configured helper program resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolStatus {
    /// Role of the program, e.g. `sshfs`.
    pub role: &'static str,
    /// Configured program name or path.
    pub program: String,
    /// Resolved location and size, if found.
    pub found: Option<(PathBuf, u64)>,
    /// Whether any execute bit is set.
    pub executable: bool,
}

/// Whether a configured root exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootStatus {
    /// `overlay` or `sshfs`.
    pub role: &'static str,
    /// Resolved root.
    pub path: PathBuf,
    /// Whether the root is an existing directory.
    pub exists: bool,
}

/// Snapshot of the local toolchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// One entry per helper program.
    pub tools: Vec<ToolStatus>,
    /// One entry per root.
    pub roots: Vec<RootStatus>,
}

impl StatusReport {
    /// Whether every helper resolved to an executable.
    #[must_use]
    pub fn ready(&self) -> bool {
        self.tools.iter().all(|t| t.executable)
    }
}

/// Checks the programs and roots named in `settings` against `PATH`.
#[must_use]
pub fn check(settings: &Settings) -> StatusReport {
    check_with_path(settings, env::var_os("PATH"))
}

fn check_with_path(settings: &Settings, path_var: Option<OsString>) -> StatusReport {
    let tools = [
        ("fuse-overlayfs", &settings.overlay.program),
        ("sshfs", &settings.sshfs.program),
        ("fusermount", &settings.unmount.fusermount),
        ("umount", &settings.unmount.umount),
        ("mount", &settings.unmount.list),
    ]
    .into_iter()
    .map(|(role, program)| {
        let found = resolve(program, path_var.as_ref())
            .and_then(|p| fs::metadata(&p).ok().map(|m| (p, m)));
        ToolStatus {
            role,
            program: program.clone(),
            executable: found
                .as_ref()
                .is_some_and(|(_, m)| m.permissions().mode() & 0o111 != 0),
            found: found.map(|(p, m)| (p, m.len())),
        }
    })
    .collect();

    let roots = [
        ("overlay", settings.overlay_root()),
        ("sshfs", settings.sshfs_root()),
    ]
    .into_iter()
    .map(|(role, path)| RootStatus {
        role,
        exists: path.is_dir(),
        path,
    })
    .collect();

    StatusReport { tools, roots }
}

/// Looks `program` up the way a shell would: as given if it contains a
/// slash, otherwise in each `PATH` entry.
fn resolve(program: &str, path_var: Option<&OsString>) -> Option<PathBuf> {
    if program.contains('/') {
        let path = Path::new(program);
        return path.is_file().then(|| path.to_path_buf());
    }
    env::split_paths(path_var?)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}
