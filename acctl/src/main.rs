use acctl::config::{Args, Command};
use acctl::{Application, config::Config, devdb, telemetry};
use clap::Parser;
use std::process::ExitCode;

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Parse CLI args
    let args = Args::parse();

    // Load configuration
    let config = Config::load(&args)?;
    config.validate()?;

    // If --validate flag is set, exit successfully after config validation
    if args.validate {
        println!("Configuration is valid.");
        return Ok(ExitCode::SUCCESS);
    }

    telemetry::init_telemetry(telemetry::DEFAULT_FILTER)?;

    tracing::debug!("{:?}", args);

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            Application::new(config).await?.serve(shutdown_signal()).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Db { command } => {
            let mut stdout = std::io::stdout().lock();
            let healthy = devdb::commands::run(&config, &command, &mut stdout).await?;
            Ok(if healthy { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
    }
}
