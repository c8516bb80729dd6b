// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `fleet task submit|status|cancel`

use crate::client::{expect_ok, DaemonClient};
use crate::exit_error::CliError;
use crate::output::{print_json, OutputFormat};
use clap::{Args, Subcommand};
use fleet_core::{Priority, TaskCommand, TaskConfig, TaskId};
use fleet_daemon::protocol::{Request, Response};

#[derive(Args)]
pub struct TaskArgs {
    #[command(subcommand)]
    command: TaskCommands,
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Submit a task to an agent
    Submit {
        /// Target agent id
        agent: String,
        /// Shell command line to run on the agent
        command: String,
        /// Human-readable task name
        #[arg(long)]
        name: Option<String>,
        /// Priority: critical|high|normal|low|background
        #[arg(long, default_value = "normal")]
        priority: String,
        /// Timeout budget in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Retry budget on failure
        #[arg(long)]
        max_retries: Option<u32>,
        /// Task ids this task depends on (repeatable)
        #[arg(long = "after")]
        after: Vec<String>,
        /// Deliver as a free-form prompt instead of a shell line
        #[arg(long)]
        prompt: bool,
        /// Wait for the terminal result and print it
        #[arg(long)]
        wait: bool,
    },
    /// Show one task
    Status {
        /// Task id
        id: String,
    },
    /// Cancel a task
    Cancel {
        /// Task id
        id: String,
    },
}

pub async fn run(args: TaskArgs, output: OutputFormat) -> Result<(), CliError> {
    match args.command {
        TaskCommands::Submit {
            agent,
            command,
            name,
            priority,
            timeout,
            max_retries,
            after,
            prompt,
            wait,
        } => {
            let priority: Priority = priority
                .parse()
                .map_err(|e: String| CliError::caller(e))?;
            let task_command = if prompt {
                TaskCommand::Prompt { text: command }
            } else {
                TaskCommand::Shell { line: command }
            };

            let mut config = TaskConfig::new(
                name.unwrap_or_else(|| "cli-task".to_string()),
                agent.as_str(),
                task_command,
            );
            config.priority = priority;
            if let Some(timeout) = timeout {
                config.timeout_seconds = timeout;
            }
            if let Some(max_retries) = max_retries {
                config.max_retries = max_retries;
            }
            config.dependencies = after.into_iter().map(TaskId::new).collect();

            submit(config, output, wait).await
        }
        TaskCommands::Status { id } => status(&id, output).await,
        TaskCommands::Cancel { id } => cancel(&id).await,
    }
}

async fn submit(config: TaskConfig, output: OutputFormat, wait: bool) -> Result<(), CliError> {
    let mut client = DaemonClient::connect().await?;
    let response = expect_ok(
        client
            .request_with_timeout(&Request::TaskSubmit { config })
            .await?,
    )?;
    let Response::TaskSubmitted { id } = response else {
        return Err(CliError::unhealthy("unexpected response to TaskSubmit"));
    };
    println!("{}", id);

    if !wait {
        return Ok(());
    }

    // poll until the task settles; long outcomes arrive via status
    loop {
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        let response = expect_ok(
            client
                .request_with_timeout(&Request::TaskStatus { id: id.clone() })
                .await?,
        )?;
        let Response::Task { task } = response else {
            return Err(CliError::unhealthy("unexpected response to TaskStatus"));
        };
        match task.state.as_str() {
            "completed" => {
                if let Some(result) = &task.result {
                    println!("{}", result);
                }
                return Ok(());
            }
            "failed" | "cancelled" | "skipped" => {
                return Err(CliError::caller(format!(
                    "task {} {}: {}",
                    task.id,
                    task.state,
                    task.error.unwrap_or_default()
                )));
            }
            _ => {
                if output == OutputFormat::Table {
                    eprintln!("  {} ...", task.state);
                }
            }
        }
    }
}

async fn status(id: &str, output: OutputFormat) -> Result<(), CliError> {
    let mut client = DaemonClient::connect().await?;
    let response = expect_ok(
        client
            .request_with_timeout(&Request::TaskStatus { id: id.to_string() })
            .await?,
    )?;
    let Response::Task { task } = response else {
        return Err(CliError::unhealthy("unexpected response to TaskStatus"));
    };

    if output == OutputFormat::Json {
        print_json(&task);
        return Ok(());
    }

    println!("task {} ({})", task.id, task.name);
    println!("  agent:    {}", task.agent);
    println!("  state:    {}", task.state);
    println!("  priority: {}", task.priority);
    println!("  retries:  {}/{}", task.retry_count, task.max_retries);
    if !task.dependencies.is_empty() {
        println!("  after:    {}", task.dependencies.join(", "));
    }
    if let Some(result) = &task.result {
        println!("  result:   {}", result);
    }
    if let Some(error) = &task.error {
        println!("  error:    {}", error);
    }
    Ok(())
}

async fn cancel(id: &str) -> Result<(), CliError> {
    let mut client = DaemonClient::connect().await?;
    expect_ok(
        client
            .request_with_timeout(&Request::TaskCancel { id: id.to_string() })
            .await?,
    )?;
    println!("cancelled {}", id);
    Ok(())
}
