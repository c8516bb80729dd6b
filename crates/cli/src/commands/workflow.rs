// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `fleet workflow define|execute|status|cancel`

use crate::client::{expect_ok, DaemonClient};
use crate::exit_error::CliError;
use crate::output::{print_json, OutputFormat};
use crate::table;
use clap::{Args, Subcommand};
use fleet_core::workflow::WorkflowSpec;
use fleet_daemon::protocol::{Request, Response};
use std::path::PathBuf;

#[derive(Args)]
pub struct WorkflowArgs {
    #[command(subcommand)]
    command: WorkflowCommands,
}

#[derive(Subcommand)]
enum WorkflowCommands {
    /// Validate and register a workflow from a JSON file
    Define {
        /// Path to the workflow spec (JSON), or - for stdin
        file: PathBuf,
    },
    /// Start a run of a defined workflow
    Execute {
        /// Workflow id returned by define
        id: String,
        /// Initial context parameters (key=value, repeatable)
        #[arg(long = "param", value_parser = parse_key_value)]
        params: Vec<(String, String)>,
    },
    /// Show one execution
    Status {
        /// Execution id
        id: String,
    },
    /// Cancel an execution
    Cancel {
        /// Execution id
        id: String,
    },
}

/// Parse a key=value pair for --param.
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", s))
}

pub async fn run(args: WorkflowArgs, output: OutputFormat) -> Result<(), CliError> {
    match args.command {
        WorkflowCommands::Define { file } => define(&file).await,
        WorkflowCommands::Execute { id, params } => execute(&id, params).await,
        WorkflowCommands::Status { id } => status(&id, output).await,
        WorkflowCommands::Cancel { id } => cancel(&id).await,
    }
}

fn read_spec(file: &PathBuf) -> Result<WorkflowSpec, CliError> {
    let text = if file.as_os_str() == "-" {
        use std::io::Read as _;
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| CliError::caller(format!("reading stdin: {}", e)))?;
        buf
    } else {
        std::fs::read_to_string(file)
            .map_err(|e| CliError::caller(format!("reading {}: {}", file.display(), e)))?
    };
    serde_json::from_str(&text).map_err(|e| CliError::caller(format!("invalid workflow: {}", e)))
}

async fn define(file: &PathBuf) -> Result<(), CliError> {
    let spec = read_spec(file)?;
    let mut client = DaemonClient::connect().await?;
    let response = expect_ok(
        client
            .request_with_timeout(&Request::WorkflowDefine { spec })
            .await?,
    )?;
    let Response::WorkflowDefined { id } = response else {
        return Err(CliError::unhealthy("unexpected response to WorkflowDefine"));
    };
    println!("{}", id);
    Ok(())
}

async fn execute(id: &str, params: Vec<(String, String)>) -> Result<(), CliError> {
    let mut client = DaemonClient::connect().await?;
    let response = expect_ok(
        client
            .request_with_timeout(&Request::WorkflowExecute {
                workflow_id: id.to_string(),
                params: params.into_iter().collect(),
            })
            .await?,
    )?;
    let Response::ExecutionStarted { id } = response else {
        return Err(CliError::unhealthy("unexpected response to WorkflowExecute"));
    };
    println!("{}", id);
    Ok(())
}

async fn status(id: &str, output: OutputFormat) -> Result<(), CliError> {
    let mut client = DaemonClient::connect().await?;
    let response = expect_ok(
        client
            .request_with_timeout(&Request::WorkflowStatus {
                execution_id: id.to_string(),
            })
            .await?,
    )?;
    let Response::Execution { execution } = response else {
        return Err(CliError::unhealthy("unexpected response to WorkflowStatus"));
    };

    if output == OutputFormat::Json {
        print_json(&execution);
        return Ok(());
    }

    println!(
        "execution {} (workflow {}): {}",
        execution.id, execution.workflow_id, execution.status
    );
    let rows: Vec<Vec<String>> = execution
        .steps
        .iter()
        .map(|s| {
            vec![
                s.id.clone(),
                s.agent.clone(),
                s.state.clone(),
                s.task_id.clone().unwrap_or_default(),
                s.error.clone().unwrap_or_default(),
            ]
        })
        .collect();
    print!(
        "{}",
        table::render(&["step", "agent", "state", "task", "error"], &rows)
    );
    Ok(())
}

async fn cancel(id: &str) -> Result<(), CliError> {
    let mut client = DaemonClient::connect().await?;
    expect_ok(
        client
            .request_with_timeout(&Request::WorkflowCancel {
                execution_id: id.to_string(),
            })
            .await?,
    )?;
    println!("cancelled {}", id);
    Ok(())
}
