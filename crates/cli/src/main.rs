// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! fleet - Fleet orchestrator CLI

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;
mod commands;
mod daemon_process;
mod exit_error;
mod output;
mod table;

use clap::{Parser, Subcommand};
use commands::{agent, daemon, events, task, workflow};
use exit_error::CliError;
use output::OutputFormat;

#[derive(Parser)]
#[command(
    name = "fleet",
    version,
    about = "Fleet - orchestrate a fleet of terminal-bound agents"
)]
struct Cli {
    /// Output format
    #[arg(
        short = 'o',
        long = "output",
        value_enum,
        default_value_t,
        global = true
    )]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon
    Start,
    /// Stop the daemon
    Stop,
    /// Show daemon status
    Status,
    /// Agent management
    Agent(agent::AgentArgs),
    /// Task management
    Task(task::TaskArgs),
    /// Workflow management
    Workflow(workflow::WorkflowArgs),
    /// Follow the live event stream
    Events {
        /// Event-name pattern, e.g. 'task:*' (default: everything)
        pattern: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Start => daemon::start(cli.output).await,
        Commands::Stop => daemon::stop(cli.output).await,
        Commands::Status => daemon::status(cli.output).await,
        Commands::Agent(args) => agent::run(args, cli.output).await,
        Commands::Task(args) => task::run(args, cli.output).await,
        Commands::Workflow(args) => workflow::run(args, cli.output).await,
        Commands::Events { pattern } => events::run(pattern, cli.output).await,
    };

    match result {
        Ok(()) => {}
        Err(e) => {
            eprintln!("fleet: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}
