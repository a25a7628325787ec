// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The gateway HTTP server: a thin command relay onto the session
//! service, bound to loopback only. No authentication by design; the
//! boundary is the loopback interface.

use crate::http::{self, Request};
use ds_core::{LaunchMode, SessionError, SessionKind, WaitParams};
use ds_engine::{CreateSessionOptions, SessionService};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// HTTP relay over a session service.
#[derive(Clone)]
pub struct GatewayServer {
    service: Arc<dyn SessionService>,
}

impl GatewayServer {
    pub fn new(service: Arc<dyn SessionService>) -> Self {
        Self { service }
    }

    /// Bind to `127.0.0.1:port` (0 picks a free port) and serve in a
    /// background task. Returns the bound address and the task handle.
    pub async fn bind(self, port: u16) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let addr = listener.local_addr()?;
        tracing::info!(%addr, "gateway listening");

        let handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        let server = self.clone();
                        tokio::spawn(async move {
                            server.handle_connection(stream).await;
                            tracing::trace!(%peer, "connection done");
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                }
            }
        });
        Ok((addr, handle))
    }

    async fn handle_connection(&self, mut stream: TcpStream) {
        let Some(request) = http::read_request(&mut stream).await else {
            return;
        };

        let (status, body) = self.route(&request).await;
        http::write_json(&mut stream, status, &body).await;
    }

    async fn route(&self, request: &Request) -> (u16, Value) {
        let result = match (request.method.as_str(), request.path.as_str()) {
            ("POST", "/create") => self.create(request).await,
            ("POST", "/send") => self.send(request).await,
            ("POST", "/kill") => self.kill(request).await,
            ("GET", "/list") => self.list().await,
            ("GET", "/status") => self.status(request).await,
            ("GET", "/wait") => self.wait(request).await,
            ("GET", "/last-message") => self.last_message(request).await,
            ("GET", "/logs") => self.logs(request).await,
            ("GET", "/inspect") => self.inspect(request).await,
            ("GET", "/health") => return (200, json!({"status": "healthy"})),
            _ => {
                return (
                    404,
                    json!({"ok": false, "error": format!("no such endpoint: {} {}", request.method, request.path)}),
                )
            }
        };

        match result {
            Ok(body) => (200, body),
            Err(SessionError::Validation(message)) => {
                (400, json!({"ok": false, "error": message}))
            }
            Err(error) => (500, json!({"ok": false, "error": error.to_string()})),
        }
    }

    async fn create(&self, request: &Request) -> Result<Value, SessionError> {
        let body = parse_body(&request.body)?;
        let path = body
            .get("path")
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| SessionError::Validation("path is required".into()))?;

        let kind = match body.get("cli").and_then(Value::as_str) {
            None | Some("claude") => SessionKind::Claude,
            Some("codex") => SessionKind::Codex,
            Some(other) => {
                return Err(SessionError::Validation(format!("unknown cli: {other}")))
            }
        };
        let mode = match body.get("mode").and_then(Value::as_str) {
            None => None,
            Some(raw) => Some(parse_mode(raw)?),
        };

        let record = self
            .service
            .create_session(CreateSessionOptions {
                workspace_path: PathBuf::from(path),
                kind,
                mode,
                description: body
                    .get("description")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                model: body.get("model").and_then(Value::as_str).map(str::to_string),
            })
            .await?;

        Ok(json!({
            "ok": true,
            "sessionId": record.handle,
            "session": serde_json::to_value(&record).map_err(protocol_err)?,
        }))
    }

    async fn send(&self, request: &Request) -> Result<Value, SessionError> {
        let body = parse_body(&request.body)?;
        let session_id = required_str(&body, "sessionId")?;
        let message = body.get("message").and_then(Value::as_str);
        let file = body.get("file").and_then(Value::as_str);

        let text = match (message, file) {
            (Some(text), None) => text.to_string(),
            (None, Some(path)) => std::fs::read_to_string(path).map_err(|e| {
                SessionError::Validation(format!("cannot read message file {path}: {e}"))
            })?,
            _ => {
                return Err(SessionError::Validation(
                    "exactly one of message or file is required".into(),
                ))
            }
        };

        self.service.send_message(&session_id, &text).await?;
        Ok(json!({"ok": true}))
    }

    async fn kill(&self, request: &Request) -> Result<Value, SessionError> {
        let body = parse_body(&request.body)?;
        let session_id = required_str(&body, "sessionId")?;
        self.service.kill_session(&session_id).await?;
        Ok(json!({"ok": true}))
    }

    async fn list(&self) -> Result<Value, SessionError> {
        let sessions = self.service.list_sessions().await?;
        Ok(json!({
            "ok": true,
            "sessions": serde_json::to_value(&sessions).map_err(protocol_err)?,
        }))
    }

    async fn status(&self, request: &Request) -> Result<Value, SessionError> {
        let id = required_query(request, "id")?;
        let status = self.service.get_session_status(&id).await?;
        Ok(json!({"ok": true, "status": status}))
    }

    async fn wait(&self, request: &Request) -> Result<Value, SessionError> {
        let id = required_query(request, "id")?;
        let timeout = positive_query(request, "timeout", 600)?;
        let interval = positive_query(request, "interval", 2)?;

        let result = self
            .service
            .wait_for_session(&id, WaitParams::from_secs(timeout, interval))
            .await?;
        Ok(json!({
            "ok": true,
            "waitResult": serde_json::to_value(&result).map_err(protocol_err)?,
        }))
    }

    async fn last_message(&self, request: &Request) -> Result<Value, SessionError> {
        let id = required_query(request, "id")?;
        let n = positive_query(request, "n", 1)? as usize;
        let blocks = self.service.get_last_messages(&id, n).await?;
        Ok(json!({"ok": true, "blocks": blocks}))
    }

    async fn logs(&self, request: &Request) -> Result<Value, SessionError> {
        let id = required_query(request, "id")?;
        let logs = self.service.get_logs(&id).await?;
        Ok(json!({
            "ok": true,
            "logs": serde_json::to_value(&logs).map_err(protocol_err)?,
        }))
    }

    async fn inspect(&self, request: &Request) -> Result<Value, SessionError> {
        let id = required_query(request, "id")?;
        let record = self.service.inspect_session(&id).await?;
        Ok(json!({
            "ok": true,
            "session": serde_json::to_value(&record).map_err(protocol_err)?,
        }))
    }
}

fn protocol_err(e: serde_json::Error) -> SessionError {
    SessionError::Protocol(e.to_string())
}

fn parse_body(body: &str) -> Result<Value, SessionError> {
    if body.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(body)
        .map_err(|e| SessionError::Validation(format!("request body is not valid JSON: {e}")))
}

fn parse_mode(raw: &str) -> Result<LaunchMode, SessionError> {
    serde_json::from_value::<LaunchMode>(Value::String(raw.to_string()))
        .map_err(|_| SessionError::Validation(format!("unknown mode: {raw}")))
}

fn required_str(body: &Value, field: &str) -> Result<String, SessionError> {
    body.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SessionError::Validation(format!("{field} is required")))
}

fn required_query(request: &Request, name: &str) -> Result<String, SessionError> {
    request
        .query
        .get(name)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| SessionError::Validation(format!("query parameter {name} is required")))
}

fn positive_query(request: &Request, name: &str, default: u64) -> Result<u64, SessionError> {
    match request.query.get(name) {
        None => Ok(default),
        Some(raw) => match raw.parse::<u64>() {
            Ok(v) if v > 0 => Ok(v),
            _ => Err(SessionError::Validation(format!(
                "query parameter {name} must be a positive integer"
            ))),
        },
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
