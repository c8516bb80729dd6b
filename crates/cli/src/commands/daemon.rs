// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `fleet start|stop|status`

use crate::client::{expect_ok, DaemonClient};
use crate::daemon_process;
use crate::exit_error::CliError;
use crate::output::{print_json, OutputFormat};
use crate::table;
use fleet_core::format_elapsed_ms;
use fleet_daemon::protocol::{Request, Response};

pub async fn start(_output: OutputFormat) -> Result<(), CliError> {
    // idempotent: a running daemon answers the ping
    if let Ok(mut client) = DaemonClient::connect().await {
        if client.request_with_timeout(&Request::Ping).await.is_ok() {
            println!("daemon already running");
            return Ok(());
        }
    }

    daemon_process::spawn_and_wait().await?;
    println!("daemon started");
    Ok(())
}

pub async fn stop(_output: OutputFormat) -> Result<(), CliError> {
    let mut client = DaemonClient::connect().await?;
    expect_ok(client.request_with_timeout(&Request::Shutdown).await?)?;
    println!("daemon stopping");
    Ok(())
}

pub async fn status(output: OutputFormat) -> Result<(), CliError> {
    let mut client = DaemonClient::connect().await?;
    let response = expect_ok(client.request_with_timeout(&Request::Status).await?)?;
    let Response::Status { report } = response else {
        return Err(CliError::unhealthy("unexpected response to Status"));
    };

    if output == OutputFormat::Json {
        print_json(&report);
        return Ok(());
    }

    println!(
        "fleetd {}  up {}  health: {}",
        report.version,
        format_elapsed_ms(report.uptime_ms),
        report.health
    );
    println!(
        "tasks: {} processing, {} delayed",
        report.processing, report.delayed
    );

    let rows: Vec<Vec<String>> = report
        .agents
        .iter()
        .map(|a| {
            let depth = report
                .queues
                .iter()
                .find(|q| q.agent == a.id)
                .map(|q| q.depth)
                .unwrap_or(0);
            vec![
                a.id.clone(),
                a.status.clone(),
                depth.to_string(),
                a.current_task_id.clone().unwrap_or_default(),
            ]
        })
        .collect();
    print!("{}", table::render(&["agent", "status", "queued", "task"], &rows));

    if !report.breakers.is_empty() {
        let rows: Vec<Vec<String>> = report
            .breakers
            .iter()
            .map(|(scope, state)| vec![scope.clone(), state.clone()])
            .collect();
        print!("{}", table::render(&["breaker", "state"], &rows));
    }

    // a degraded orchestrator still reports, but exits unhealthy
    if report.health == "unhealthy" {
        return Err(CliError::unhealthy("one or more subsystems are unhealthy"));
    }
    Ok(())
}
