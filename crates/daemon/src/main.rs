// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subrelay Daemon (srd)
//!
//! Background process that runs the subtitle pipeline: ingress adapters,
//! orchestrator, download and translation workers, all over the durable
//! bus and job store under one state directory.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use sr_daemon::lifecycle::{self, Config};
use sr_engine::{StubLlmGateway, StubProviderGateway};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("srd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("srd {}", env!("CARGO_PKG_VERSION"));
                println!("Subrelay Daemon - subtitle acquisition and translation pipeline");
                println!();
                println!("USAGE:");
                println!("    srd");
                println!();
                println!("Configuration is read from $SR_CONFIG, or subrelay.toml in the");
                println!("state directory ($SR_STATE_DIR, default platform state dir).");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: srd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;
    std::fs::create_dir_all(&config.state_dir)?;
    let _log_guard = setup_logging(&config)?;

    info!("starting subrelay daemon");

    // Provider and LLM clients plug in behind the gateway seams; without
    // concrete clients configured, stubs make the pipeline fail jobs
    // visibly instead of hanging.
    let provider = Arc::new(StubProviderGateway);
    let llm = Arc::new(StubLlmGateway);

    let daemon = match lifecycle::startup(config, provider, llm).await {
        Ok(daemon) => daemon,
        Err(lifecycle::LifecycleError::LockFailed(path)) => {
            eprintln!("error: another srd instance holds the lock at {}", path.display());
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = sigterm.recv() => info!("SIGTERM received"),
        _ = sigint.recv() => info!("SIGINT received"),
    }

    daemon.shutdown().await;
    Ok(())
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, std::io::Error> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init() {
        warn!(error = %e, "tracing already initialized");
    }
    Ok(guard)
}
