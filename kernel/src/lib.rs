//! Cowspace Kernel - copy-on-write workspaces.
//!
//! A workspace is a writable union mount over a repository tree. The tree
//! is either a local directory or a remote one mounted over sshfs. No state
//! is kept beyond the mount table and the directories under the configured
//! roots.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Infrastructure components (config, telemetry, audit).
pub mod infrastructure;
/// Workspace mounting, discovery and lifecycle.
pub mod vfs;
