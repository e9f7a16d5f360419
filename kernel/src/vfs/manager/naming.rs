//! Generated workspace names.

use rand::distributions::Alphanumeric;
use rand::Rng;

use super::types::{WorkspaceError, WorkspaceName};
use crate::vfs::mount::scaffold::is_scaffold_name;
use crate::vfs::paths::{parse_remote, repo_base_name, RepoSource};

/// Length of the random suffix.
pub const SUFFIX_LEN: usize = 7;

/// Seven characters drawn uniformly from `[A-Za-z0-9]`.
#[must_use]
pub fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(char::from)
        .collect()
}

/// Prefix put in front of a base name that would read as scaffolding.
pub const COLLISION_PREFIX: &str = "ws-";

/// Derives `<base>-<suffix>` from a repository argument.
///
/// For remote specs the base is taken from the remote directory. A base
/// starting with a scaffold prefix (`cow-tools.git`) becomes
/// `ws-cow-tools` so discovery does not hide the workspace.
///
/// # Errors
///
/// Returns [`WorkspaceError::InvalidName`] if no usable base can be
/// derived, e.g. for `/`.
pub fn generate_name(repo: &str) -> Result<WorkspaceName, WorkspaceError> {
    let mut base = match parse_remote(repo) {
        RepoSource::Remote(spec) => repo_base_name(&spec.dir),
        RepoSource::Local(_) => repo_base_name(repo),
    };
    if is_scaffold_name(&base) {
        base.insert_str(0, COLLISION_PREFIX);
    }
    WorkspaceName::new(format!("{base}-{}", random_suffix()))
}
