// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fleet Daemon (fleetd)
//!
//! Background process that owns the queue, bridges, and workflow engine.
//!
//! Architecture:
//! - Listener task: spawned task handling socket I/O (the API adapter)
//! - Engine loops: scheduler, monitor, cleaner, bridges, health collector

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use fleet_daemon::lifecycle::{self, Config};
use fleet_daemon::{env, listener};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("fleetd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("fleetd {}", env!("CARGO_PKG_VERSION"));
                println!("Fleet Daemon - orchestrates terminal-bound agents");
                println!();
                println!("USAGE:");
                println!("    fleetd");
                println!();
                println!("The daemon is typically started by the `fleet` CLI and should not");
                println!("be invoked directly. It listens on a Unix socket for commands");
                println!("from `fleet`.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: fleetd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;
    std::fs::create_dir_all(&config.state_dir)?;
    let _log_guard = setup_logging(&config)?;

    info!(version = env!("CARGO_PKG_VERSION"), "starting fleetd");

    let startup = match lifecycle::startup(&config).await {
        Ok(startup) => startup,
        Err(e) => {
            error!(error = %e, "startup failed");
            eprintln!("fleetd: {}", e);
            std::process::exit(3);
        }
    };
    let mut daemon = startup.daemon;
    let socket = startup.listener;

    // READY marker for the CLI's spawn-and-wait
    println!("READY");

    let ctx = listener::ApiContext {
        queue: Arc::clone(&daemon.queue),
        engine: Arc::clone(&daemon.engine),
        collector: daemon.collector.clone(),
        breakers: daemon.breakers.clone(),
        driver: daemon.driver.clone(),
        roster: daemon.roster.clone(),
        start_time: daemon.start_time,
        shutdown_tx: daemon.shutdown_signal(),
        restart_bulkhead: fleet_engine::Bulkhead::new("session-restarts", 2, 4),
    };
    let listener_task = tokio::spawn(listener::run(socket, ctx, daemon.shutdown_rx()));

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut shutdown_rx = daemon.shutdown_rx();

    tokio::select! {
        _ = sigterm.recv() => info!("SIGTERM received"),
        _ = sigint.recv() => info!("SIGINT received"),
        _ = shutdown_rx.changed() => info!("shutdown requested over the socket"),
    }

    daemon.shutdown().await?;
    let _ = listener_task.await;
    info!("fleetd stopped");
    Ok(())
}

/// Configure tracing per LOG_LEVEL / LOG_FORMAT, writing to the daemon log.
fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, Box<dyn std::error::Error>> {
    use tracing_subscriber::EnvFilter;

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    let filter = EnvFilter::try_new(env::log_level()).unwrap_or_else(|_| EnvFilter::new("info"));

    if env::log_format() == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .init();
    }

    Ok(guard)
}
