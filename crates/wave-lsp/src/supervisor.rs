// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::BufReader;
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::time::timeout;
use tracing::{info, warn};
use wave_config::{LspServerConfig, LspSettings};

use crate::framing::{read_message, write_message};

#[derive(Debug, thiserror::Error)]
pub enum LspError {
    #[error("no LSP server configured for language '{0}'")]
    UnconfiguredLanguage(String),
    #[error("LSP server for '{0}' did not respond to initialize within {1}s")]
    StartupTimeout(String, u64),
    #[error("failed to spawn LSP server for '{language}': {source}")]
    Spawn {
        language: String,
        #[source]
        source: std::io::Error,
    },
    #[error("LSP server connection closed")]
    ConnectionClosed,
    #[error("LSP server returned an error: {0}")]
    Remote(String),
}

/// One running language server: its process handle (kept alive for
/// `kill_on_drop`), the outstanding-request table, and an async sender for
/// framed writes to its stdin.
struct Server {
    child: Child,
    next_id: AtomicI64,
    pending: Arc<Mutex<HashMap<i64, oneshot::Sender<Value>>>>,
    writer: Arc<Mutex<tokio::process::ChildStdin>>,
    opened_documents: std::collections::HashSet<String>,
}

/// Per-language LSP client supervisor: register → spawn → initialize →
/// didOpen → query (call hierarchy, etc.), grounded stylistically on the
/// teacher's GDB supervisor state-machine (`sven_tools::builtin::gdb::state`)
/// — a shared session struct holding `Option<Child>` plus connection state,
/// cleared explicitly on shutdown rather than relying on `Drop` alone.
pub struct LspSupervisor {
    configs: LspSettings,
    servers: HashMap<String, Server>,
}

impl LspSupervisor {
    pub fn new(configs: LspSettings) -> Self {
        Self {
            configs,
            servers: HashMap::new(),
        }
    }

    /// Resolves a file path to its configured language via
    /// `extensionToLanguage`.
    pub fn language_for_path(&self, path: &Path) -> Option<String> {
        let ext = path.extension()?.to_str()?;
        self.configs
            .values()
            .find_map(|cfg| cfg.extension_to_language.get(ext).cloned())
    }

    /// Starts the server for `language` if it isn't already running, and
    /// completes the `initialize`/`initialized` handshake.
    pub async fn ensure_started(&mut self, language: &str) -> Result<(), LspError> {
        if self.servers.contains_key(language) {
            return Ok(());
        }
        let config = self
            .configs
            .get(language)
            .cloned()
            .ok_or_else(|| LspError::UnconfiguredLanguage(language.to_string()))?;

        let server = spawn_and_initialize(language, &config).await?;
        self.servers.insert(language.to_string(), server);
        info!(language, "LSP server initialized");
        Ok(())
    }

    /// Sends `textDocument/didOpen` for `path`, starting the server first if
    /// needed. A document is opened at most once per server session.
    pub async fn did_open(&mut self, language: &str, path: &Path, text: &str) -> Result<(), LspError> {
        self.ensure_started(language).await?;
        let uri = format!("file://{}", path.display());
        let server = self.servers.get_mut(language).expect("just started");
        if server.opened_documents.contains(&uri) {
            return Ok(());
        }
        let params = json!({
            "textDocument": {
                "uri": uri,
                "languageId": language,
                "version": 1,
                "text": text,
            }
        });
        notify(server, "textDocument/didOpen", params).await?;
        server.opened_documents.insert(uri);
        Ok(())
    }

    /// Runs `textDocument/prepareCallHierarchy` followed by
    /// `callHierarchy/incomingCalls` for the symbol at `line`/`character`
    /// (0-indexed, per LSP convention) in `path`.
    pub async fn incoming_calls(
        &mut self,
        language: &str,
        path: &Path,
        line: u32,
        character: u32,
    ) -> Result<Value, LspError> {
        self.ensure_started(language).await?;
        let uri = format!("file://{}", path.display());
        let server = self.servers.get(language).expect("just started");

        let items = call(
            server,
            "textDocument/prepareCallHierarchy",
            json!({
                "textDocument": {"uri": uri},
                "position": {"line": line, "character": character},
            }),
        )
        .await?;

        let Some(item) = items.as_array().and_then(|a| a.first()) else {
            return Ok(json!([]));
        };

        call(
            server,
            "callHierarchy/incomingCalls",
            json!({"item": item}),
        )
        .await
    }

    /// Shuts down one server with the LSP `shutdown`/`exit` sequence,
    /// falling back to killing the process if it doesn't respond within its
    /// configured `shutdown_timeout_secs`.
    pub async fn shutdown(&mut self, language: &str) {
        let Some(server) = self.servers.remove(language) else {
            return;
        };
        let shutdown_timeout = self
            .configs
            .get(language)
            .map(|c| c.shutdown_timeout_secs)
            .unwrap_or(5);

        let result = timeout(
            Duration::from_secs(shutdown_timeout),
            call(&server, "shutdown", Value::Null),
        )
        .await;
        if result.is_err() {
            warn!(language, "LSP server shutdown request timed out, killing");
        } else {
            let _ = notify(&server, "exit", Value::Null).await;
        }
        let mut child = server.child;
        let _ = child.start_kill();
    }

    pub async fn shutdown_all(&mut self) {
        let languages: Vec<String> = self.servers.keys().cloned().collect();
        for language in languages {
            self.shutdown(&language).await;
        }
    }
}

async fn spawn_and_initialize(language: &str, config: &LspServerConfig) -> Result<Server, LspError> {
    let mut cmd = Command::new(&config.command);
    cmd.args(&config.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| LspError::Spawn {
        language: language.to_string(),
        source: e,
    })?;

    let stdin = child.stdin.take().expect("piped stdin");
    let stdout = child.stdout.take().expect("piped stdout");

    let pending: Arc<Mutex<HashMap<i64, oneshot::Sender<Value>>>> = Arc::new(Mutex::new(HashMap::new()));
    let pump_pending = pending.clone();
    tokio::spawn(async move {
        let mut reader = BufReader::new(stdout);
        loop {
            match read_message(&mut reader).await {
                Ok(Some(message)) => {
                    let Some(id) = message.get("id").and_then(Value::as_i64) else {
                        continue;
                    };
                    if let Some(tx) = pump_pending.lock().await.remove(&id) {
                        let _ = tx.send(message);
                    }
                }
                _ => break,
            }
        }
    });

    let server = Server {
        child,
        next_id: AtomicI64::new(1),
        pending,
        writer: Arc::new(Mutex::new(stdin)),
        opened_documents: std::collections::HashSet::new(),
    };

    let init_result = timeout(
        Duration::from_secs(config.startup_timeout_secs),
        call(
            &server,
            "initialize",
            json!({
                "processId": std::process::id(),
                "rootUri": Value::Null,
                "capabilities": {},
            }),
        ),
    )
    .await
    .map_err(|_| LspError::StartupTimeout(language.to_string(), config.startup_timeout_secs))??;
    let _ = init_result;

    notify(&server, "initialized", json!({})).await?;

    Ok(server)
}

async fn call(server: &Server, method: &str, params: Value) -> Result<Value, LspError> {
    let id = server.next_id.fetch_add(1, Ordering::SeqCst);
    let message = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});

    let (tx, rx) = oneshot::channel();
    server.pending.lock().await.insert(id, tx);

    {
        let mut writer = server.writer.lock().await;
        write_message(&mut *writer, &message)
            .await
            .map_err(|_| LspError::ConnectionClosed)?;
    }

    let response = rx.await.map_err(|_| LspError::ConnectionClosed)?;
    if let Some(error) = response.get("error") {
        return Err(LspError::Remote(error.to_string()));
    }
    Ok(response.get("result").cloned().unwrap_or(Value::Null))
}

async fn notify(server: &Server, method: &str, params: Value) -> Result<(), LspError> {
    let message = json!({"jsonrpc": "2.0", "method": method, "params": params});
    let mut writer = server.writer.lock().await;
    write_message(&mut *writer, &message)
        .await
        .map_err(|_| LspError::ConnectionClosed)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fake_config(script: &str) -> LspServerConfig {
        LspServerConfig {
            command: "bash".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            extension_to_language: HashMap::from([("rs".to_string(), "rust".to_string())]),
            startup_timeout_secs: 5,
            shutdown_timeout_secs: 2,
        }
    }

    /// A fake server that replies to initialize, didOpen is ignored
    /// (notification, no response expected), and any other request gets an
    /// empty result.
    const FAKE_SERVER: &str = r#"
read_frame() {
  IFS= read -r header
  len=$(echo "$header" | sed -n 's/Content-Length: \([0-9]*\).*/\1/p')
  read -r blank
  dd bs=1 count="$len" 2>/dev/null
}
while body=$(read_frame); do
  [ -z "$body" ] && break
  id=$(echo "$body" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
  if [ -z "$id" ]; then continue; fi
  result='{"jsonrpc":"2.0","id":'"$id"',"result":{}}'
  printf 'Content-Length: %d\r\n\r\n%s' "${#result}" "$result"
done
"#;

    #[tokio::test]
    async fn ensure_started_unconfigured_language_errors() {
        let mut sup = LspSupervisor::new(LspSettings::new());
        let result = sup.ensure_started("rust").await;
        assert!(matches!(result, Err(LspError::UnconfiguredLanguage(_))));
    }

    #[tokio::test]
    async fn ensure_started_spawns_and_initializes() {
        let mut settings = LspSettings::new();
        settings.insert("rust".to_string(), fake_config(FAKE_SERVER));
        let mut sup = LspSupervisor::new(settings);
        let result = sup.ensure_started("rust").await;
        assert!(result.is_ok());
        sup.shutdown_all().await;
    }

    #[tokio::test]
    async fn language_for_path_resolves_by_extension() {
        let mut settings = LspSettings::new();
        settings.insert("rust".to_string(), fake_config(FAKE_SERVER));
        let sup = LspSupervisor::new(settings);
        let lang = sup.language_for_path(&PathBuf::from("src/main.rs"));
        assert_eq!(lang.as_deref(), Some("rust"));
    }

    #[tokio::test]
    async fn did_open_is_idempotent_per_document() {
        let mut settings = LspSettings::new();
        settings.insert("rust".to_string(), fake_config(FAKE_SERVER));
        let mut sup = LspSupervisor::new(settings);
        let path = PathBuf::from("/tmp/fake.rs");
        sup.did_open("rust", &path, "fn main() {}").await.unwrap();
        sup.did_open("rust", &path, "fn main() {}").await.unwrap();
        sup.shutdown_all().await;
    }
}
