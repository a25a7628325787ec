// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Drop-in session service for sandboxed callers: every operation is
//! relayed over HTTP to the host-side gateway, with container paths
//! rewritten to host paths on the way out.

use crate::http::{self, urlencode};
use async_trait::async_trait;
use ds_adapters::TurnEntry;
use ds_core::{
    ConversationState, SessionError, SessionRecord, WaitParams, WaitResult,
};
use ds_engine::{CreateSessionOptions, SessionService};
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

/// HTTP client implementing the session-service surface against the
/// gateway server.
pub struct GatewayClient {
    /// Full URL as configured, for error messages.
    url: String,
    /// `host:port` extracted from the URL.
    authority: String,
}

impl GatewayClient {
    /// Client for `DEV_SESSIONS_GATEWAY_URL`.
    pub fn from_env() -> Self {
        Self::new(&crate::env::gateway_url())
    }

    pub fn new(url: &str) -> Self {
        let authority = url
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .split('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Self {
            url: url.trim_end_matches('/').to_string(),
            authority,
        }
    }

    async fn get(&self, path_and_query: &str) -> Result<Value, SessionError> {
        let request = format!(
            "GET {path_and_query} HTTP/1.1\r\nhost: {}\r\nconnection: close\r\n\r\n",
            self.authority
        );
        self.exchange(&request).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, SessionError> {
        let payload = body.to_string();
        let request = format!(
            "POST {path} HTTP/1.1\r\nhost: {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{payload}",
            self.authority,
            payload.len()
        );
        self.exchange(&request).await
    }

    async fn exchange(&self, request: &str) -> Result<Value, SessionError> {
        let mut stream = TcpStream::connect(&self.authority).await.map_err(|e| {
            SessionError::Transport(format!(
                "could not reach the dev-sessions gateway at {} ({e}); start it on the host with `ds gateway run`",
                self.url
            ))
        })?;
        stream
            .write_all(request.as_bytes())
            .await
            .map_err(|e| SessionError::Transport(format!("gateway write failed: {e}")))?;

        let (status, body) = http::read_response(&mut stream)
            .await
            .map_err(|e| SessionError::Transport(format!("gateway read failed: {e}")))?;

        let parsed: Value = serde_json::from_str(&body).map_err(|e| {
            SessionError::Protocol(format!("gateway returned invalid JSON ({status}): {e}"))
        })?;

        if status == 200 {
            return Ok(parsed);
        }
        let message = parsed
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("gateway error")
            .to_string();
        Err(match status {
            400 => SessionError::Validation(message),
            _ if message.starts_with("session not found") => {
                SessionError::NotFound(message.trim_start_matches("session not found: ").to_string())
            }
            _ => SessionError::Backend(message),
        })
    }
}

fn field<T: serde::de::DeserializeOwned>(value: &Value, name: &str) -> Result<T, SessionError> {
    let inner = value
        .get(name)
        .cloned()
        .ok_or_else(|| SessionError::Protocol(format!("gateway response missing {name}")))?;
    serde_json::from_value(inner)
        .map_err(|e| SessionError::Protocol(format!("gateway response field {name}: {e}")))
}

#[async_trait]
impl SessionService for GatewayClient {
    async fn create_session(
        &self,
        opts: CreateSessionOptions,
    ) -> Result<SessionRecord, SessionError> {
        let path = crate::env::translate_workspace_path(&opts.workspace_path);
        let mut body = json!({
            "path": path,
            "cli": opts.kind,
        });
        if let Some(mode) = opts.mode {
            body["mode"] = json!(mode);
        }
        if let Some(description) = &opts.description {
            body["description"] = json!(description);
        }
        if let Some(model) = &opts.model {
            body["model"] = json!(model);
        }
        let response = self.post("/create", &body).await?;
        field(&response, "session")
    }

    async fn send_message(&self, handle: &str, text: &str) -> Result<(), SessionError> {
        self.post("/send", &json!({"sessionId": handle, "message": text}))
            .await?;
        Ok(())
    }

    async fn kill_session(&self, handle: &str) -> Result<(), SessionError> {
        self.post("/kill", &json!({"sessionId": handle})).await?;
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionRecord>, SessionError> {
        let response = self.get("/list").await?;
        field(&response, "sessions")
    }

    async fn get_session_status(
        &self,
        handle: &str,
    ) -> Result<ConversationState, SessionError> {
        let response = self
            .get(&format!("/status?id={}", urlencode(handle)))
            .await?;
        field(&response, "status")
    }

    async fn wait_for_session(
        &self,
        handle: &str,
        params: WaitParams,
    ) -> Result<WaitResult, SessionError> {
        let response = self
            .get(&format!(
                "/wait?id={}&timeout={}&interval={}",
                urlencode(handle),
                params.timeout.as_secs().max(1),
                params.poll_interval.as_secs().max(1),
            ))
            .await?;
        field(&response, "waitResult")
    }

    async fn get_last_messages(
        &self,
        handle: &str,
        n: usize,
    ) -> Result<Vec<String>, SessionError> {
        let response = self
            .get(&format!("/last-message?id={}&n={n}", urlencode(handle)))
            .await?;
        field(&response, "blocks")
    }

    async fn get_logs(&self, handle: &str) -> Result<Vec<TurnEntry>, SessionError> {
        let response = self.get(&format!("/logs?id={}", urlencode(handle))).await?;
        field(&response, "logs")
    }

    async fn inspect_session(&self, handle: &str) -> Result<SessionRecord, SessionError> {
        let response = self
            .get(&format!("/inspect?id={}", urlencode(handle)))
            .await?;
        field(&response, "session")
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
