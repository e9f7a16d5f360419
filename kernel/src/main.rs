//! `cowspace` binary: loads settings, installs logging and a signal
//! listener, then runs one subcommand.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use cowspace_kernel::infrastructure::{config::Settings, telemetry::TelemetryBuilder};
use cowspace_kernel::vfs::mount::SystemRunner;
use cowspace_kernel::vfs::WorkspaceManager;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod cli;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = TelemetryBuilder::new("cowspace", env!("CARGO_PKG_VERSION"))
        .with_settings(&settings.telemetry)
        .init()
    {
        eprintln!("{e:#}");
        return ExitCode::FAILURE;
    }

    if matches!(cli.command, Command::Status) {
        return cli::status(&settings);
    }

    let manager = match WorkspaceManager::new(settings, Arc::new(SystemRunner)) {
        Ok(manager) => manager,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    cli::run(&manager, cli.command, &cancel).await
}

/// Cancels `token` on Ctrl-C or SIGTERM. The running operation notices at
/// its next checkpoint.
async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Signal received, cancelling");
    token.cancel();
}
