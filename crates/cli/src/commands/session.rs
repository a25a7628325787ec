// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session commands: create, send, kill, list, status, wait,
//! last-message.

use crate::output;
use crate::EXIT_TIMEOUT;
use anyhow::Context;
use clap::{Args, ValueEnum};
use ds_core::{LaunchMode, SessionKind, WaitParams};
use ds_engine::{CreateSessionOptions, SessionService};
use std::path::PathBuf;

/// Which agent CLI backs the session.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliKind {
    Claude,
    Codex,
}

impl From<CliKind> for SessionKind {
    fn from(value: CliKind) -> Self {
        match value {
            CliKind::Claude => SessionKind::Claude,
            CliKind::Codex => SessionKind::Codex,
        }
    }
}

/// Launch flavor for tmux-backed sessions.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Interactive,
    SkipPermissions,
    Container,
    Daemon,
}

impl From<ModeArg> for LaunchMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Interactive => LaunchMode::Interactive,
            ModeArg::SkipPermissions => LaunchMode::SkipPermissions,
            ModeArg::Container => LaunchMode::Container,
            ModeArg::Daemon => LaunchMode::Daemon,
        }
    }
}

#[derive(Args)]
pub struct CreateArgs {
    /// Workspace directory the agent runs in
    #[arg(long)]
    pub path: PathBuf,

    /// Agent CLI to drive
    #[arg(long, value_enum, default_value_t = CliKind::Claude)]
    pub cli: CliKind,

    /// Launch mode (defaults per CLI kind)
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Free-form description shown in listings
    #[arg(long)]
    pub description: Option<String>,

    /// Model override (codex only)
    #[arg(long)]
    pub model: Option<String>,
}

#[derive(Args)]
pub struct SendArgs {
    /// Session handle
    pub handle: String,

    /// Message text
    #[arg(long, conflicts_with = "file")]
    pub message: Option<String>,

    /// Read the message from a file instead
    #[arg(long)]
    pub file: Option<PathBuf>,
}

pub async fn create(args: CreateArgs) -> anyhow::Result<u8> {
    let service = ds_gateway::service_from_env();
    let record = service
        .create_session(CreateSessionOptions {
            workspace_path: args.path,
            kind: args.cli.into(),
            mode: args.mode.map(Into::into),
            description: args.description,
            model: args.model,
        })
        .await?;
    println!("{}", record.handle);
    Ok(0)
}

pub async fn send(args: SendArgs) -> anyhow::Result<u8> {
    let text = match (args.message, args.file) {
        (Some(text), None) => text,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read message file {}", path.display()))?,
        _ => anyhow::bail!("exactly one of --message or --file is required"),
    };

    let service = ds_gateway::service_from_env();
    service.send_message(&args.handle, &text).await?;
    Ok(0)
}

pub async fn kill(handle: &str) -> anyhow::Result<u8> {
    let service = ds_gateway::service_from_env();
    service.kill_session(handle).await?;
    println!("killed {handle}");
    Ok(0)
}

pub async fn list(json: bool) -> anyhow::Result<u8> {
    let service = ds_gateway::service_from_env();
    let sessions = service.list_sessions().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
    } else {
        print!("{}", output::render_session_table(&sessions));
    }
    Ok(0)
}

pub async fn last_message(handle: &str, count: usize) -> anyhow::Result<u8> {
    if count == 0 {
        anyhow::bail!("--count must be at least 1");
    }
    let service = ds_gateway::service_from_env();
    let blocks = service.get_last_messages(handle, count).await?;
    for block in blocks {
        println!("{block}");
    }
    Ok(0)
}

pub async fn status(handle: &str) -> anyhow::Result<u8> {
    let service = ds_gateway::service_from_env();
    let state = service.get_session_status(handle).await?;
    println!("{state}");
    Ok(0)
}

pub async fn inspect(handle: &str) -> anyhow::Result<u8> {
    let service = ds_gateway::service_from_env();
    let record = service.inspect_session(handle).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(0)
}

pub async fn wait(handle: &str, timeout: u64, interval: u64) -> anyhow::Result<u8> {
    if timeout == 0 || interval == 0 {
        anyhow::bail!("--timeout and --interval must be positive");
    }
    let service = ds_gateway::service_from_env();
    let result = service
        .wait_for_session(handle, WaitParams::from_secs(timeout, interval))
        .await?;

    if result.timed_out {
        eprintln!("timed out after {}ms", result.elapsed_ms);
        return Ok(EXIT_TIMEOUT);
    }
    if let Some(error) = result.error {
        anyhow::bail!(error);
    }
    if let Some(text) = result.assistant_text {
        println!("{text}");
    } else {
        println!("completed in {}", ds_core::format_elapsed_ms(result.elapsed_ms));
    }
    Ok(0)
}
