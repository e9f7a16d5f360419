//! Path resolution for user-supplied repository locations.
//!
//! Turns `~`-prefixed paths into absolute ones and splits `user@host:/path`
//! remote specs from plain local paths.

use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;

/// A repository location as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoSource {
    /// A local directory; no remote layer is needed.
    Local(PathBuf),
    /// A remote directory reachable over sshfs.
    Remote(RemoteSpec),
}

/// Parsed `user@host:/remote/dir[:/local/dir]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSpec {
    /// Login user.
    pub user: String,
    /// Remote host.
    pub host: String,
    /// Directory on the remote host.
    pub dir: String,
    /// Explicit local mirror path (four-part form only).
    pub local: Option<PathBuf>,
}

impl RemoteSpec {
    /// Connection string handed to the remote mount command.
    #[must_use]
    pub fn connection(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.dir)
    }

    /// `user:host` pair, as reported for the four-part form.
    #[must_use]
    pub fn user_host(&self) -> String {
        format!("{}:{}", self.user, self.host)
    }
}

fn three_part() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([^@]+)@([^:]+):([^:]+)$").expect("static regex"))
}

fn four_part() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([^@]+)@([^:]+):([^:]+):([^:]+)$").expect("static regex"))
}

/// Replaces a leading `~` with the invoking user's home directory.
///
/// Paths without a leading `~` are returned unchanged. If the home
/// directory cannot be determined the result is an empty path, so callers
/// fail closed instead of writing relative to the working directory.
#[must_use]
pub fn expand_home(path: &str) -> PathBuf {
    let Some(rest) = path.strip_prefix('~') else {
        return PathBuf::from(path);
    };

    match dirs::home_dir() {
        Some(home) => home.join(rest.trim_start_matches('/')),
        None => PathBuf::new(),
    }
}

/// Splits a repository argument into its remote and local parts.
///
/// Anything that is not `user@host:/dir` or `user@host:/dir:/local` is a
/// local path and passes through untouched.
#[must_use]
pub fn parse_remote(spec: &str) -> RepoSource {
    if let Some(caps) = four_part().captures(spec) {
        return RepoSource::Remote(RemoteSpec {
            user: caps[1].to_string(),
            host: caps[2].to_string(),
            dir: caps[3].to_string(),
            local: Some(PathBuf::from(&caps[4])),
        });
    }

    if let Some(caps) = three_part().captures(spec) {
        return RepoSource::Remote(RemoteSpec {
            user: caps[1].to_string(),
            host: caps[2].to_string(),
            dir: caps[3].to_string(),
            local: None,
        });
    }

    RepoSource::Local(PathBuf::from(spec))
}

/// Last path segment of a repository argument, without a `.git` suffix.
///
/// Works for local paths, URLs and remote specs alike.
#[must_use]
pub fn repo_base_name(repo: &str) -> String {
    let trimmed = repo.trim_end_matches('/');
    let last = trimmed
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(trimmed);
    last.strip_suffix(".git").unwrap_or(last).to_string()
}
