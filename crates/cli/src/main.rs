// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ds - dev-sessions CLI

mod commands;
mod output;

use clap::{Parser, Subcommand};
use commands::{gateway, session};
use std::process::ExitCode;

/// Exit code for a wait that reached its deadline, mirroring timeout(1).
pub(crate) const EXIT_TIMEOUT: u8 = 124;

#[derive(Parser)]
#[command(
    name = "ds",
    version,
    about = "dev-sessions - a multiplexer for long-lived coding-agent sessions"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new agent session
    Create(session::CreateArgs),
    /// Send a message to a session
    Send(session::SendArgs),
    /// Kill a session and remove it from the registry
    Kill {
        /// Session handle
        handle: String,
    },
    /// List sessions
    List {
        /// Print full records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the most recent assistant message(s)
    LastMessage {
        /// Session handle
        handle: String,
        /// How many trailing messages to print
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
    /// Show what the session is currently doing
    Status {
        /// Session handle
        handle: String,
    },
    /// Print a session's full registry record as JSON
    Inspect {
        /// Session handle
        handle: String,
    },
    /// Wait for the session's current turn to finish
    Wait {
        /// Session handle
        handle: String,
        /// Deadline in seconds
        #[arg(long, default_value_t = 600)]
        timeout: u64,
        /// Poll interval in seconds
        #[arg(long, default_value_t = 2)]
        interval: u64,
    },
    /// Run or inspect the host-side HTTP gateway
    Gateway {
        #[command(subcommand)]
        command: gateway::GatewayCommands,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    };
    ExitCode::from(code)
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    match cli.command {
        Commands::Create(args) => session::create(args).await,
        Commands::Send(args) => session::send(args).await,
        Commands::Kill { handle } => session::kill(&handle).await,
        Commands::List { json } => session::list(json).await,
        Commands::LastMessage { handle, count } => session::last_message(&handle, count).await,
        Commands::Status { handle } => session::status(&handle).await,
        Commands::Inspect { handle } => session::inspect(&handle).await,
        Commands::Wait {
            handle,
            timeout,
            interval,
        } => session::wait(&handle, timeout, interval).await,
        Commands::Gateway { command } => gateway::run(command).await,
    }
}
