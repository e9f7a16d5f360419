//! Process execution for external mount tools.
//!
//! Every helper the driver shells out to (sshfs, fuse-overlayfs, fusermount,
//! umount, mount, rm, find) goes through [`CommandRunner`], so the lifecycle
//! logic can be exercised without touching the kernel mount table.

use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// A single external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program name or path.
    pub program: String,
    /// Arguments, not including the program.
    pub args: Vec<String>,
    /// Kill the process if it runs longer than this.
    pub timeout: Option<Duration>,
}

impl Invocation {
    /// Creates an invocation without a deadline.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            timeout: None,
        }
    }

    /// Bounds the invocation by `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Whether any argument equals `arg`.
    #[must_use]
    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when terminated by a signal.
    pub code: Option<i32>,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

impl CommandOutput {
    /// A zero exit with the given stdout.
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A non-zero exit with the given stderr.
    #[must_use]
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Whether the process exited with status zero.
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Exit code and trimmed stderr, for error messages.
    #[must_use]
    pub fn describe(&self) -> String {
        let status = self
            .code
            .map_or_else(|| "killed by signal".to_string(), |c| format!("exit status {c}"));
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            status
        } else {
            format!("{status}: {stderr}")
        }
    }
}

/// Failure to obtain any exit status at all.
#[derive(Debug, Error)]
pub enum RunError {
    /// The program could not be started.
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Source error.
        #[source]
        source: std::io::Error,
    },
    /// The deadline elapsed; the process was killed.
    #[error("'{program}' did not finish within {after:?}")]
    TimedOut {
        /// Program that hung.
        program: String,
        /// Deadline that elapsed.
        after: Duration,
    },
}

/// Runs external commands.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `invocation` to completion and captures its output.
    ///
    /// # Errors
    ///
    /// Returns an error only if the process could not be started or hit its
    /// deadline; a non-zero exit is reported through [`CommandOutput`].
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, RunError>;
}

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, RunError> {
        debug!(command = %invocation, "Running");

        let child = tokio::process::Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RunError::Spawn {
                program: invocation.program.clone(),
                source: e,
            })?;

        let output = match invocation.timeout {
            Some(after) => tokio::time::timeout(after, child.wait_with_output())
                .await
                .map_err(|_| RunError::TimedOut {
                    program: invocation.program.clone(),
                    after,
                })?,
            None => child.wait_with_output().await,
        }
        .map_err(|e| RunError::Spawn {
            program: invocation.program.clone(),
            source: e,
        })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
