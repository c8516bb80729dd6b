// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `fleet agent list|restart`

use crate::client::{expect_ok, DaemonClient};
use crate::exit_error::CliError;
use crate::output::{print_json, OutputFormat};
use crate::table;
use clap::{Args, Subcommand};
use fleet_core::format_elapsed_ms;
use fleet_daemon::protocol::{Request, Response};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Args)]
pub struct AgentArgs {
    #[command(subcommand)]
    command: AgentCommands,
}

#[derive(Subcommand)]
enum AgentCommands {
    /// List agents and their records
    List,
    /// Kill and recreate an agent's session
    Restart {
        /// Agent id
        id: String,
    },
}

pub async fn run(args: AgentArgs, output: OutputFormat) -> Result<(), CliError> {
    match args.command {
        AgentCommands::List => list(output).await,
        AgentCommands::Restart { id } => restart(&id).await,
    }
}

async fn list(output: OutputFormat) -> Result<(), CliError> {
    let mut client = DaemonClient::connect().await?;
    let response = expect_ok(client.request_with_timeout(&Request::AgentList).await?)?;
    let Response::Agents { agents } = response else {
        return Err(CliError::unhealthy("unexpected response to AgentList"));
    };

    if output == OutputFormat::Json {
        print_json(&agents);
        return Ok(());
    }

    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let rows: Vec<Vec<String>> = agents
        .iter()
        .map(|a| {
            let beat = if a.last_heartbeat_ms == 0 {
                "never".to_string()
            } else {
                format!("{} ago", format_elapsed_ms(now_ms.saturating_sub(a.last_heartbeat_ms)))
            };
            vec![
                a.id.clone(),
                a.session.clone(),
                a.status.clone(),
                a.load.to_string(),
                beat,
                a.capabilities.join(","),
            ]
        })
        .collect();
    print!(
        "{}",
        table::render(
            &["agent", "session", "status", "load", "heartbeat", "capabilities"],
            &rows
        )
    );
    Ok(())
}

async fn restart(id: &str) -> Result<(), CliError> {
    let mut client = DaemonClient::connect().await?;
    expect_ok(
        client
            .request_with_timeout(&Request::AgentRestart { id: id.to_string() })
            .await?,
    )?;
    println!("restarted {}", id);
    Ok(())
}
