//! Remote layer configuration.

use serde::Deserialize;
use std::time::Duration;

/// Default directory holding remote mounts, one per workspace.
pub const DEFAULT_ROOT: &str = "/mnt/cowspace/sshfs";

/// Default deadline for a single remote attach attempt.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Settings for the sshfs (remote) layer.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SshfsSettings {
    /// Directory whose direct children are remote mount points.
    pub root: String,
    /// Network mount helper.
    pub program: String,
    /// Option strings, each passed verbatim after its own `-o`.
    pub options: Vec<String>,
    /// Candidate ports, tried in order during create.
    pub ports: Vec<u16>,
    /// Deadline for one attach attempt, in seconds.
    pub timeout_secs: u64,
}

impl SshfsSettings {
    /// Deadline for one attach attempt.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for SshfsSettings {
    fn default() -> Self {
        Self {
            root: DEFAULT_ROOT.to_string(),
            program: "sshfs".to_string(),
            options: vec![
                "allow_other,default_permissions,follow_symlinks".to_string(),
                "cache=yes,kernel_cache,compression=no,cache_timeout=115200".to_string(),
                "StrictHostKeyChecking=no,UserKnownHostsFile=/dev/null".to_string(),
                "ConnectTimeout=10,ServerAliveInterval=15,ServerAliveCountMax=3".to_string(),
            ],
            ports: vec![22],
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}
