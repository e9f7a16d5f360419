//! Copy-on-write workspaces over local or sshfs-mounted repositories.

/// Directory removal for union filesystem trees.
pub mod clean;
/// Workspace discovery from the mount table or directory tree.
pub mod discovery;
/// Workspace lifecycle orchestration.
pub mod manager;
/// Single-layer attach and detach.
pub mod mount;
/// Repository argument parsing and `~` expansion.
pub mod paths;
/// Path guard for `clean`.
pub mod policy;
/// Toolchain checks.
pub mod status;

pub use manager::{WorkspaceError, WorkspaceManager};
