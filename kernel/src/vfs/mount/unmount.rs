//! Escalating unmount.

use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

use super::runner::{CommandOutput, CommandRunner, Invocation};
use crate::infrastructure::config::UnmountSettings;

/// One way of detaching a mount, from least to most forceful.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmountStrategy {
    /// `fusermount -u`
    Normal,
    /// `fusermount -uz`
    Forced,
    /// `umount -l`
    Lazy,
}

impl UnmountStrategy {
    /// Order in which strategies are tried.
    pub const ESCALATION: [Self; 3] = [Self::Normal, Self::Forced, Self::Lazy];

    /// Command implementing this strategy for `target`.
    #[must_use]
    pub fn invocation(self, tools: &UnmountSettings, target: &Path) -> Invocation {
        let target = target.to_string_lossy().into_owned();
        match self {
            Self::Normal => Invocation::new(tools.fusermount.as_str(), ["-u".to_string(), target]),
            Self::Forced => Invocation::new(tools.fusermount.as_str(), ["-uz".to_string(), target]),
            Self::Lazy => Invocation::new(tools.umount.as_str(), ["-l".to_string(), target]),
        }
    }
}

impl fmt::Display for UnmountStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Normal => "normal",
            Self::Forced => "forced",
            Self::Lazy => "lazy",
        })
    }
}

/// How a detach ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmountOutcome {
    /// The strategy that succeeded.
    Unmounted(UnmountStrategy),
    /// The tool reported nothing mounted at the target.
    NotMounted,
}

/// Whether a failed unmount only means there was nothing to unmount.
#[must_use]
pub fn is_not_mounted(output: &CommandOutput) -> bool {
    let stderr = output.stderr.to_ascii_lowercase();
    ["not mounted", "not found in /etc/mtab", "no mount point specified"]
        .iter()
        .any(|needle| stderr.contains(needle))
}

/// Tries `strategies` in order, stopping at the first that detaches
/// `target` or reports it as not mounted.
///
/// # Errors
///
/// Returns every failed attempt, in order, if none succeeded.
pub async fn escalate(
    runner: &dyn CommandRunner,
    tools: &UnmountSettings,
    target: &Path,
    strategies: &[UnmountStrategy],
) -> Result<UnmountOutcome, Vec<(UnmountStrategy, String)>> {
    let mut failures = Vec::with_capacity(strategies.len());

    for &strategy in strategies {
        let invocation = strategy.invocation(tools, target);
        match runner.run(&invocation).await {
            Ok(out) if out.success() => {
                debug!(target = %target.display(), %strategy, "Unmounted");
                return Ok(UnmountOutcome::Unmounted(strategy));
            }
            Ok(out) if is_not_mounted(&out) => {
                debug!(target = %target.display(), "Nothing mounted");
                return Ok(UnmountOutcome::NotMounted);
            }
            Ok(out) => {
                warn!(target = %target.display(), %strategy, error = %out.describe(), "Unmount attempt failed");
                failures.push((strategy, out.describe()));
            }
            Err(e) => {
                warn!(target = %target.display(), %strategy, error = %e, "Unmount attempt failed");
                failures.push((strategy, e.to_string()));
            }
        }
    }

    Err(failures)
}
