// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cadence daemon (cadenced)
//!
//! Evaluates program triggers on a timer and delivers the resulting
//! messages until SIGINT or SIGTERM.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::path::PathBuf;
use std::process::ExitCode;

use cadence_daemon::{check, startup, Config, LifecycleError};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(
    name = "cadenced",
    version,
    about = "Evaluate program triggers and deliver the resulting messages"
)]
struct Cli {
    /// Validate CONFIG and its seed file, then exit
    #[arg(long)]
    check: bool,

    /// TOML configuration file; defaults apply when omitted
    config: Option<PathBuf>,
}

fn load_config(path: Option<&PathBuf>) -> Result<Config, LifecycleError> {
    match path {
        Some(path) => Ok(Config::load(path)?),
        None => Ok(Config::default()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = if cli.check {
        load_config(cli.config.as_ref()).and_then(|config| {
            check(&config)?;
            println!("configuration ok");
            Ok(())
        })
    } else {
        run(cli.config.as_ref()).await
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("cadenced: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(path: Option<&PathBuf>) -> Result<(), LifecycleError> {
    let config = load_config(path)?;
    let _log_guard = setup_logging(&config)?;

    let daemon = match startup(&config).await {
        Ok(daemon) => daemon,
        Err(e) => {
            error!(error = %e, "failed to start daemon");
            return Err(e);
        }
    };

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    // Signal ready for a supervising process
    println!("READY");

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }

    daemon.shutdown().await
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let (writer, guard) = match &config.log_path {
        Some(path) => {
            let dir = match path.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
                _ => PathBuf::from("."),
            };
            std::fs::create_dir_all(&dir)?;
            let file_name = path.file_name().ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("log_path {} has no file name", path.display()),
                )
            })?;
            tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name))
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer))
        .init();

    Ok(guard)
}
