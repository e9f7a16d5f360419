//! Command-line surface of the `cowspace` binary.
//!
//! Parsing is clap derive; each subcommand maps onto one
//! [`WorkspaceManager`] call and prints its result to stdout. Diagnostics go
//! through `tracing` on stderr.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use cowspace_kernel::infrastructure::config::Settings;
use cowspace_kernel::vfs::manager::{
    CleanOutcome, DeleteTarget, Workspace, WorkspaceError, WorkspaceManager, WorkspaceName,
};
use cowspace_kernel::vfs::status;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Shell used when `$SHELL` is unset.
const FALLBACK_SHELL: &str = "/bin/bash";

/// Copy-on-write workspaces over local or remote repositories.
#[derive(Parser, Debug)]
#[command(name = "cowspace")]
#[command(version)]
#[command(about = "Copy-on-write workspaces over local or remote repositories")]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Configuration file (default: ~/.cowspace/config.yaml).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a workspace from a local path or user@host:/path.
    Create {
        /// Repository path or remote spec.
        repo: String,
        /// Workspace name (default: <repo>-<random>).
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Delete a workspace, or all of them.
    Delete {
        /// Workspace name.
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        name: Option<String>,
        /// Delete every workspace.
        #[arg(short, long)]
        all: bool,
    },
    /// List workspaces.
    List {
        /// Workspace name, or mount path suffix with --verbose.
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        name: Option<String>,
        /// List every workspace.
        #[arg(short, long)]
        all: bool,
        /// Match on mount path suffix and include bare sshfs mounts.
        #[arg(short, long)]
        verbose: bool,
    },
    /// Open a shell inside a workspace.
    Run {
        /// Workspace name; prompted for when omitted.
        name: Option<String>,
    },
    /// Show toolchain status.
    Status,
    /// Remove directories using overlay-aware methods.
    Clean {
        /// Directories to remove.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Allow absolute paths.
        #[arg(short, long)]
        force: bool,
    },
}

/// Prints the toolchain report.
pub fn status(settings: &Settings) -> ExitCode {
    let report = status::check(settings);

    for tool in &report.tools {
        println!("{}:", tool.role);
        match &tool.found {
            Some((path, size)) => {
                println!("  Installed: yes {} ({size} bytes)", path.display());
                println!(
                    "  Executable: {}",
                    if tool.executable { "yes" } else { "no (not executable)" }
                );
            }
            None => println!("  Installed: no ({} not found on PATH)", tool.program),
        }
    }
    for root in &report.roots {
        println!(
            "{} root: {} ({})",
            root.role,
            root.path.display(),
            if root.exists { "present" } else { "missing" }
        );
    }

    ExitCode::SUCCESS
}

/// Runs a workspace subcommand.
pub async fn run(
    manager: &WorkspaceManager,
    command: Command,
    cancel: &CancellationToken,
) -> ExitCode {
    match command {
        Command::Create { repo, name } => create(manager, &repo, name.as_deref(), cancel).await,
        Command::Delete { name, all } => delete(manager, name, all, cancel).await,
        Command::List { name, all, verbose } => {
            let filter = if all { None } else { name.as_deref() };
            list(manager, filter, verbose).await
        }
        Command::Clean { paths, force } => clean(manager, &paths, force).await,
        Command::Run { name } => enter(manager, name).await,
        Command::Status => status(manager.settings()),
    }
}

async fn create(
    manager: &WorkspaceManager,
    repo: &str,
    name: Option<&str>,
    cancel: &CancellationToken,
) -> ExitCode {
    match manager.create(repo, name, cancel).await {
        Ok(created) => {
            println!(
                "Workspace {} created at {}",
                created.name,
                created.mount_path.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

async fn delete(
    manager: &WorkspaceManager,
    name: Option<String>,
    all: bool,
    cancel: &CancellationToken,
) -> ExitCode {
    let target = match (all, name) {
        (true, _) => DeleteTarget::All,
        (false, Some(name)) => match WorkspaceName::new(name) {
            Ok(name) => DeleteTarget::Named(name),
            Err(e) => return fail(&e),
        },
        (false, None) => {
            eprintln!("Please specify a workspace name");
            return ExitCode::FAILURE;
        }
    };

    match manager.delete(&target, cancel).await {
        Ok(report) => {
            for outcome in &report.outcomes {
                for error in &outcome.errors {
                    println!("{error}");
                }
                println!("Deleted {}", outcome.name);
            }
            ExitCode::SUCCESS
        }
        Err(WorkspaceError::Cancelled {
            processed,
            remaining,
        }) if all => {
            println!(
                "Operation cancelled: {processed} workspace(s) deleted, {remaining} left untouched"
            );
            ExitCode::FAILURE
        }
        Err(e) => fail(&e),
    }
}

async fn list(manager: &WorkspaceManager, filter: Option<&str>, verbose: bool) -> ExitCode {
    match manager.list(filter, verbose).await {
        Ok(found) if found.is_empty() => {
            println!("No workspaces found");
            ExitCode::SUCCESS
        }
        Ok(found) => {
            print!("{}", render_table(&found));
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

async fn clean(manager: &WorkspaceManager, paths: &[PathBuf], force: bool) -> ExitCode {
    for path in paths {
        match manager.clean(path, force).await {
            Ok(CleanOutcome::Removed(p)) => println!("Successfully cleaned: {}", p.display()),
            Ok(CleanOutcome::Missing(p)) => println!("Path does not exist: {}", p.display()),
            Err(e) => {
                eprintln!("Error cleaning {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}

/// Runs the user's shell with the workspace mount as working directory.
///
/// The shell owns the terminal until it exits, so interrupts reach it
/// directly and the session is not torn down on cancellation.
async fn enter(manager: &WorkspaceManager, name: Option<String>) -> ExitCode {
    let name = match name {
        Some(name) => name,
        None => match choose(manager).await {
            Ok(Some(name)) => name,
            Ok(None) => {
                println!("Operation cancelled");
                return ExitCode::FAILURE;
            }
            Err(e) => {
                eprintln!("{e:#}");
                return ExitCode::FAILURE;
            }
        },
    };
    let name = match WorkspaceName::new(name) {
        Ok(name) => name,
        Err(e) => return fail(&e),
    };
    let mount = match manager.locate(&name) {
        Ok(mount) => mount,
        Err(e) => return fail(&e),
    };

    println!("Workspace {name} at {}", mount.display());
    println!("Type exit when done");
    info!(name = %name, mount = %mount.display(), "Entering workspace");

    let mut shell = shell_command(std::env::var_os("SHELL"), &name, &mount);
    match shell.status().await {
        Ok(status) => {
            println!("Left workspace {name}");
            match status.code() {
                Some(0) => ExitCode::SUCCESS,
                Some(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
                None => {
                    debug!(%status, "Shell terminated by signal");
                    ExitCode::FAILURE
                }
            }
        }
        Err(e) => {
            eprintln!("Failed to start shell: {e}");
            ExitCode::FAILURE
        }
    }
}

fn shell_command(
    shell: Option<OsString>,
    name: &WorkspaceName,
    mount: &Path,
) -> tokio::process::Command {
    let program = shell
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| OsString::from(FALLBACK_SHELL));
    let mut command = tokio::process::Command::new(program);
    command
        .current_dir(mount)
        .env("COWSPACE_WORKSPACE", name.as_str());
    command
}

/// Prompts for one of the discovered workspaces. `None` means the user
/// backed out.
async fn choose(manager: &WorkspaceManager) -> anyhow::Result<Option<String>> {
    let names: Vec<String> = manager
        .list(None, false)
        .await?
        .into_iter()
        .filter_map(|w| w.name)
        .collect();
    if names.is_empty() {
        anyhow::bail!("No workspaces found. Create one first with 'cowspace create'");
    }

    for (i, name) in names.iter().enumerate() {
        println!("  {}) {name}", i + 1);
    }
    let prompt = format!("Select a workspace [1-{}]: ", names.len());
    let answer = tokio::task::spawn_blocking(move || -> anyhow::Result<Option<String>> {
        let mut rl: Editor<(), DefaultHistory> =
            Editor::new().map_err(|e| anyhow::anyhow!("Failed to open prompt: {e}"))?;
        match rl.readline(&prompt) {
            Ok(line) => Ok(Some(line)),
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => Ok(None),
            Err(e) => Err(anyhow::anyhow!("Failed to read selection: {e}")),
        }
    })
    .await??;

    let Some(answer) = answer else {
        return Ok(None);
    };
    match pick(&names, &answer) {
        Some(name) => Ok(Some(name.to_string())),
        None => anyhow::bail!("No workspace matches '{}'", answer.trim()),
    }
}

/// Resolves a prompt answer: a 1-based index into `names`, or a name.
fn pick<'a>(names: &'a [String], answer: &str) -> Option<&'a str> {
    let answer = answer.trim();
    if let Ok(index) = answer.parse::<usize>() {
        return index
            .checked_sub(1)
            .and_then(|i| names.get(i))
            .map(String::as_str);
    }
    names.iter().map(String::as_str).find(|n| *n == answer)
}

fn fail(error: &WorkspaceError) -> ExitCode {
    if matches!(error, WorkspaceError::Cancelled { .. }) {
        println!("Operation cancelled");
    } else {
        eprintln!("{error}");
    }
    ExitCode::FAILURE
}

fn render_table(workspaces: &[Workspace]) -> String {
    const HEADER: [&str; 5] = ["NAME", "MOUNT", "FILESYSTEM", "SOURCE", "CREATED"];

    let rows: Vec<[String; 5]> = workspaces
        .iter()
        .map(|w| {
            [
                w.name.clone().unwrap_or_else(|| "-".to_string()),
                w.mount_path.display().to_string(),
                w.filesystem.to_string(),
                w.source.to_string(),
                w.created
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
            ]
        })
        .collect();

    let mut widths = HEADER.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let mut push_row = |cells: &[&str]| {
        let line: Vec<String> = cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect();
        out.push_str(line.join("  ").trim_end());
        out.push('\n');
    };
    push_row(&HEADER);
    for row in &rows {
        push_row(&row.each_ref().map(String::as_str));
    }
    out
}
