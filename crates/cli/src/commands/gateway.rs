// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway commands: run the host-side relay, check its health.

use clap::Subcommand;
use ds_engine::SessionManager;
use ds_gateway::GatewayServer;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[derive(Subcommand)]
pub enum GatewayCommands {
    /// Run the gateway server in the foreground
    Run {
        /// Port to bind on loopback (default from DEV_SESSIONS_GATEWAY_PORT)
        #[arg(long)]
        port: Option<u16>,

        /// Append logs to ~/.dev-sessions/gateway.log instead of stderr
        #[arg(long)]
        log_file: bool,
    },
    /// Check whether a gateway is answering on the configured port
    Status {
        #[arg(long)]
        port: Option<u16>,
    },
}

pub async fn run(command: GatewayCommands) -> anyhow::Result<u8> {
    match command {
        GatewayCommands::Run { port, log_file } => serve(port, log_file).await,
        GatewayCommands::Status { port } => status(port).await,
    }
}

fn init_tracing(log_file: bool) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if log_file {
        let path = ds_core::gateway_log_path();
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path);
        match file {
            Ok(file) => {
                let (writer, guard) = tracing_appender::non_blocking(file);
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(writer)
                    .with_ansi(false)
                    .init();
                return Some(guard);
            }
            Err(e) => {
                eprintln!("warn: cannot open {}: {e}; logging to stderr", path.display());
            }
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    None
}

async fn serve(port: Option<u16>, log_file: bool) -> anyhow::Result<u8> {
    let _guard = init_tracing(log_file);
    let port = port.unwrap_or_else(ds_gateway::gateway_port);

    let manager = Arc::new(SessionManager::with_default_backends());
    let (addr, task) = GatewayServer::new(manager).bind(port).await?;
    println!("gateway listening on http://{addr}");

    task.await?;
    Ok(0)
}

async fn status(port: Option<u16>) -> anyhow::Result<u8> {
    let port = port.unwrap_or_else(ds_gateway::gateway_port);
    match health_check(port).await {
        Ok(body) if body.contains("healthy") => {
            println!("gateway on port {port}: healthy");
            Ok(0)
        }
        Ok(body) => {
            println!("gateway on port {port}: unexpected response: {body}");
            Ok(1)
        }
        Err(e) => {
            println!("gateway on port {port}: unreachable ({e})");
            Ok(1)
        }
    }
}

async fn health_check(port: u16) -> std::io::Result<String> {
    let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port)).await?;
    stream
        .write_all(b"GET /health HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n")
        .await?;
    let mut response = String::new();
    stream.read_to_string(&mut response).await?;
    Ok(response)
}
