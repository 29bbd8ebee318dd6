// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Mutex};

/// A newline-delimited JSON-RPC 2.0 client talking to a server over a child
/// process's stdin/stdout — the same framing MCP's stdio transport uses.
/// Spawned with `Stdio::null()` for anything unused and `kill_on_drop(true)`
/// so a dropped connection can't leave an orphaned server running.
pub struct RpcClient {
    child: Mutex<Child>,
    stdin_tx: mpsc::UnboundedSender<String>,
    next_id: AtomicI64,
    pending: Arc<Mutex<HashMap<i64, oneshot::Sender<Value>>>>,
}

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("failed to spawn MCP server '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("MCP server closed its stdout before responding")]
    ConnectionClosed,
    #[error("MCP server returned an error: {0}")]
    Remote(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl RpcClient {
    pub async fn spawn(command: &str, args: &[String], env: &HashMap<String, String>) -> Result<Self, RpcError> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| RpcError::Spawn {
            command: command.to_string(),
            source: e,
        })?;

        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");

        let (stdin_tx, mut stdin_rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(line) = stdin_rx.recv().await {
                if stdin.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if stdin.write_all(b"\n").await.is_err() {
                    break;
                }
                let _ = stdin.flush().await;
            }
        });

        let pending: Arc<Mutex<HashMap<i64, oneshot::Sender<Value>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let pump_pending = pending.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                let Ok(value) = serde_json::from_str::<Value>(&line) else {
                    continue;
                };
                let Some(id) = value.get("id").and_then(Value::as_i64) else {
                    continue;
                };
                if let Some(tx) = pump_pending.lock().await.remove(&id) {
                    let _ = tx.send(value);
                }
            }
        });

        Ok(Self {
            child: Mutex::new(child),
            stdin_tx,
            next_id: AtomicI64::new(1),
            pending,
        })
    }

    /// Sends a JSON-RPC request and awaits its matching response by id.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        self.stdin_tx
            .send(request.to_string())
            .map_err(|_| RpcError::ConnectionClosed)?;

        let response = rx.await.map_err(|_| RpcError::ConnectionClosed)?;
        if let Some(error) = response.get("error") {
            return Err(RpcError::Remote(error.to_string()));
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Sends a one-way notification (no response expected), e.g.
    /// `notifications/initialized`.
    pub fn notify(&self, method: &str, params: Value) -> Result<(), RpcError> {
        let notification = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });
        self.stdin_tx
            .send(notification.to_string())
            .map_err(|_| RpcError::ConnectionClosed)
    }

    pub async fn shutdown(&self) {
        let mut child = self.child.lock().await;
        let _ = child.start_kill();
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Minimal fake MCP server: echoes back `{"result": params}` for every
    /// request it reads, one line at a time.
    const FAKE_SERVER_SCRIPT: &str = r#"
while IFS= read -r line; do
  id=$(echo "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
  echo "{\"jsonrpc\":\"2.0\",\"id\":$id,\"result\":{\"ok\":true}}"
done
"#;

    #[tokio::test]
    async fn call_round_trips_through_fake_server() {
        let client = RpcClient::spawn(
            "bash",
            &["-c".to_string(), FAKE_SERVER_SCRIPT.to_string()],
            &HashMap::new(),
        )
        .await
        .unwrap();

        let result = client.call("ping", json!({})).await.unwrap();
        assert_eq!(result, json!({"ok": true}));
        client.shutdown().await;
    }

    #[tokio::test]
    async fn spawn_nonexistent_command_errors() {
        let result = RpcClient::spawn("definitely-not-a-real-binary-xyz", &[], &HashMap::new()).await;
        assert!(result.is_err());
    }
}
