//! Shared test utilities for integration tests.
//!
//! Provides a [`FakeMounts`] command runner that keeps an in-memory mount
//! table and answers `sshfs`, `fuse-overlayfs`, `fusermount`, `umount` and
//! `mount` the way the real tools do, while directories are created and
//! removed on a real temporary filesystem.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use cowspace_kernel::infrastructure::config::Settings;
use cowspace_kernel::vfs::mount::{CommandOutput, CommandRunner, Invocation, RunError};
use cowspace_kernel::vfs::WorkspaceManager;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// One live entry in the fake mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mounted {
    /// Source column of the listing.
    pub source: String,
    /// Filesystem type column.
    pub fs_type: String,
    /// Port the remote mount used, for sshfs entries.
    pub port: Option<u16>,
}

#[derive(Debug, Default)]
struct State {
    table: BTreeMap<PathBuf, Mounted>,
    failing_ports: HashSet<u16>,
    denied_ports: HashSet<u16>,
    overlay_broken: bool,
    busy: HashSet<PathBuf>,
    listing_broken: bool,
    cancel_at: Option<(PathBuf, CancellationToken)>,
}

/// Command runner backed by an in-memory mount table.
#[derive(Debug, Default)]
pub struct FakeMounts {
    state: Mutex<State>,
    log: Mutex<Vec<Invocation>>,
}

impl FakeMounts {
    /// Remote mounts on `port` fail with a connection error.
    pub fn fail_port(&self, port: u16) {
        self.state().failing_ports.insert(port);
    }

    /// Remote mounts on `port` fail with an authentication error.
    pub fn deny_port(&self, port: u16) {
        self.state().denied_ports.insert(port);
    }

    /// Every union mount fails.
    pub fn break_overlay(&self) {
        self.state().overlay_broken = true;
    }

    /// Every unmount strategy fails for `path`.
    pub fn make_busy(&self, path: impl Into<PathBuf>) {
        self.state().busy.insert(path.into());
    }

    /// The mount listing command fails.
    pub fn break_listing(&self) {
        self.state().listing_broken = true;
    }

    /// Cancels `token` when `path` is unmounted, as if a signal arrived
    /// mid-operation.
    pub fn cancel_when_unmounting(&self, path: impl Into<PathBuf>, token: CancellationToken) {
        self.state().cancel_at = Some((path.into(), token));
    }

    /// Pretends `path` is mounted without going through a create.
    pub fn preload(&self, path: impl Into<PathBuf>, source: &str, fs_type: &str) {
        self.state().table.insert(
            path.into(),
            Mounted {
                source: source.to_string(),
                fs_type: fs_type.to_string(),
                port: None,
            },
        );
    }

    /// Snapshot of the mount table.
    pub fn table(&self) -> BTreeMap<PathBuf, Mounted> {
        self.state().table.clone()
    }

    /// Every invocation so far.
    pub fn calls(&self) -> Vec<Invocation> {
        self.log.lock().expect("log lock").clone()
    }

    /// Invocations of `program`, in order.
    pub fn calls_to(&self, program: &str) -> Vec<Invocation> {
        self.calls()
            .into_iter()
            .filter(|c| c.program == program)
            .collect()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("state lock")
    }

    fn answer(&self, inv: &Invocation) -> CommandOutput {
        let mut state = self.state();
        match inv.program.as_str() {
            "sshfs" => {
                let conn = inv.args[0].clone();
                let local = PathBuf::from(&inv.args[1]);
                let port = inv
                    .args
                    .iter()
                    .find_map(|a| a.strip_prefix("port="))
                    .and_then(|p| p.parse::<u16>().ok());
                if !local.is_dir() {
                    return CommandOutput::failed(1, "fuse: bad mount point: No such file or directory");
                }
                if port.is_some_and(|p| state.denied_ports.contains(&p)) {
                    return CommandOutput::failed(1, "dev@build01: Permission denied (publickey).");
                }
                if port.is_some_and(|p| state.failing_ports.contains(&p)) {
                    return CommandOutput::failed(1, "read: Connection reset by peer");
                }
                state.table.insert(
                    local,
                    Mounted {
                        source: conn,
                        fs_type: "fuse.sshfs".into(),
                        port,
                    },
                );
                CommandOutput::ok("")
            }
            "fuse-overlayfs" => {
                let mount = PathBuf::from(inv.args.last().cloned().unwrap_or_default());
                if state.overlay_broken {
                    return CommandOutput::failed(1, "fuse: device not found");
                }
                state.table.insert(
                    mount,
                    Mounted {
                        source: "fuse-overlayfs".into(),
                        fs_type: "fuse.fuse-overlayfs".into(),
                        port: None,
                    },
                );
                CommandOutput::ok("")
            }
            "fusermount" | "umount" => {
                let target = PathBuf::from(inv.args.last().cloned().unwrap_or_default());
                let shown = target.display().to_string();
                if let Some((at, token)) = &state.cancel_at {
                    if *at == target {
                        token.cancel();
                    }
                }
                if state.busy.contains(&target) {
                    return CommandOutput::failed(1, format!("{shown}: Device or resource busy"));
                }
                if state.table.remove(&target).is_none() {
                    return if inv.program == "umount" {
                        CommandOutput::failed(32, format!("umount: {shown}: not mounted."))
                    } else {
                        CommandOutput::failed(
                            1,
                            format!("fusermount: entry for {shown} not found in /etc/mtab"),
                        )
                    };
                }
                CommandOutput::ok("")
            }
            "mount" => {
                if state.listing_broken {
                    return CommandOutput::failed(1, "mount: failed to read mtab");
                }
                let mut listing = String::from("/dev/sda1 on / type ext4 (rw,relatime)\n");
                for (path, m) in &state.table {
                    let escaped = path.display().to_string().replace(' ', "\\040");
                    listing.push_str(&format!(
                        "{} on {escaped} type {} (rw,nosuid,nodev)\n",
                        m.source, m.fs_type
                    ));
                }
                CommandOutput::ok(listing)
            }
            "rm" | "find" => CommandOutput::ok(""),
            other => CommandOutput::failed(127, format!("{other}: command not found")),
        }
    }
}

#[async_trait]
impl CommandRunner for FakeMounts {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, RunError> {
        self.log.lock().expect("log lock").push(invocation.clone());
        Ok(self.answer(invocation))
    }
}

/// Temporary roots, a fake mount table and a manager wired to both.
pub struct TestContext {
    /// Owns the temporary directory.
    pub temp_dir: TempDir,
    /// Canonical temp root.
    pub root: PathBuf,
    /// Fake mount table.
    pub mounts: Arc<FakeMounts>,
    /// Manager under test.
    pub manager: WorkspaceManager,
}

impl TestContext {
    /// Context with the default single port 22.
    pub fn new() -> Result<Self> {
        Self::with_ports(vec![22])
    }

    /// Context trying `ports` in order.
    pub fn with_ports(ports: Vec<u16>) -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let root = std::fs::canonicalize(temp_dir.path())?;
        std::fs::create_dir_all(root.join("overlay"))?;
        std::fs::create_dir_all(root.join("sshfs"))?;

        let mut settings = Settings::default();
        settings.overlay.root = root.join("overlay").display().to_string();
        settings.sshfs.root = root.join("sshfs").display().to_string();
        settings.sshfs.ports = ports;

        let mounts = Arc::new(FakeMounts::default());
        let manager = WorkspaceManager::new(settings, mounts.clone())?;

        Ok(Self {
            temp_dir,
            root,
            mounts,
            manager,
        })
    }

    /// Overlay root.
    pub fn overlay_root(&self) -> PathBuf {
        self.root.join("overlay")
    }

    /// Sshfs root.
    pub fn sshfs_root(&self) -> PathBuf {
        self.root.join("sshfs")
    }

    /// Creates a local repository directory with one file.
    pub fn local_repo(&self, name: &str) -> Result<PathBuf> {
        let repo = self.root.join("repos").join(name);
        std::fs::create_dir_all(&repo)?;
        std::fs::write(repo.join("README.md"), "# test\n")?;
        Ok(repo)
    }

    /// Names of the entries left directly under `dir`.
    pub fn entries(dir: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }
}
