// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::process::Stdio;
use std::time::Duration;

use regex::Regex;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};
use wave_config::{HookGroupConfig, HooksConfig};

/// A single hook's result after exit-code interpretation: 0 = silent pass,
/// 1 = advisory, 2 = blocking; anything else is treated as advisory with
/// the raw exit code surfaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    Proceed,
    /// Exit code 1: stderr is surfaced to the transcript but execution
    /// continues.
    Advise { message: String },
    /// Exit code 2: execution must stop; stderr is the reason shown to the
    /// user/model.
    Block { reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("hook command '{command}' timed out after {timeout_secs}s")]
    Timeout { command: String, timeout_secs: u64 },
    #[error("failed to spawn hook command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

const DEFAULT_HOOK_TIMEOUT_SECS: u64 = 60;

/// Runs the hook groups registered for one event, matching each group's
/// optional `matcher` regex against `matcher_input` (typically a tool
/// name), and interpreting exit codes as above. Hook subprocesses get
/// `Stdio::null()` for stdin they don't need and `kill_on_drop(true)` so an
/// aborted turn can't leave hook processes running.
pub struct HookManager {
    hooks: HooksConfig,
}

impl HookManager {
    pub fn new(hooks: HooksConfig) -> Self {
        Self { hooks }
    }

    /// Runs every hook group for `event` whose matcher (if any) matches
    /// `matcher_input`, all concurrently, and folds their outcomes: the
    /// first `Block` found wins (short-circuits further reporting to the
    /// caller, though already-spawned commands are still awaited so none
    /// are left running), otherwise all `Advise` messages are collected.
    pub async fn run(
        &self,
        event: &str,
        matcher_input: Option<&str>,
        payload: &Value,
    ) -> Result<HookOutcome, HookError> {
        let Some(groups) = self.hooks.get(event) else {
            return Ok(HookOutcome::Proceed);
        };

        let mut handles = Vec::new();
        for group in groups {
            if !group_matches(group, matcher_input) {
                continue;
            }
            for spec in &group.hooks {
                let command = spec.command.clone();
                let timeout_secs = spec.timeout.unwrap_or(DEFAULT_HOOK_TIMEOUT_SECS);
                let stdin_payload = payload.to_string();
                handles.push(tokio::spawn(async move {
                    run_one(&command, timeout_secs, &stdin_payload).await
                }));
            }
        }

        let mut advisories = Vec::new();
        for handle in handles {
            let result = handle.await.expect("hook task panicked");
            match result? {
                HookOutcome::Proceed => {}
                HookOutcome::Advise { message } => advisories.push(message),
                HookOutcome::Block { reason } => return Ok(HookOutcome::Block { reason }),
            }
        }

        if advisories.is_empty() {
            Ok(HookOutcome::Proceed)
        } else {
            Ok(HookOutcome::Advise {
                message: advisories.join("\n"),
            })
        }
    }
}

fn group_matches(group: &HookGroupConfig, matcher_input: Option<&str>) -> bool {
    match (&group.matcher, matcher_input) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(pattern), Some(input)) => Regex::new(pattern)
            .map(|re| re.is_match(input))
            .unwrap_or(false),
    }
}

async fn run_one(
    command: &str,
    timeout_secs: u64,
    stdin_payload: &str,
) -> Result<HookOutcome, HookError> {
    let mut cmd = Command::new("bash");
    cmd.arg("-c")
        .arg(command)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(command, "spawning hook");

    let mut child = cmd.mapped_spawn(command)?;

    if let Some(mut stdin) = child.stdin.take() {
        let _ = stdin.write_all(stdin_payload.as_bytes()).await;
    }

    let output = match timeout(Duration::from_secs(timeout_secs), child.wait_with_output()).await {
        Ok(res) => res.map_err(|e| HookError::Spawn {
            command: command.to_string(),
            source: e,
        })?,
        Err(_) => {
            return Err(HookError::Timeout {
                command: command.to_string(),
                timeout_secs,
            })
        }
    };

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    match output.status.code() {
        Some(0) | None => Ok(HookOutcome::Proceed),
        Some(1) => {
            warn!(command, stderr, "hook returned advisory exit code 1");
            Ok(HookOutcome::Advise {
                message: if stderr.is_empty() {
                    format!("hook '{command}' returned 1")
                } else {
                    stderr
                },
            })
        }
        Some(2) => Ok(HookOutcome::Block {
            reason: if stderr.is_empty() {
                format!("hook '{command}' blocked this action")
            } else {
                stderr
            },
        }),
        Some(code) => Ok(HookOutcome::Advise {
            message: format!("hook '{command}' exited with code {code}: {stderr}"),
        }),
    }
}

/// Small helper trait so `run_one` reads linearly; `Command::spawn` only
/// needs the command string for the error variant.
trait MappedSpawn {
    fn mapped_spawn(&mut self, command: &str) -> Result<tokio::process::Child, HookError>;
}

impl MappedSpawn for Command {
    fn mapped_spawn(&mut self, command: &str) -> Result<tokio::process::Child, HookError> {
        self.spawn().map_err(|e| HookError::Spawn {
            command: command.to_string(),
            source: e,
        })
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use wave_config::HookSpec;

    fn hooks_with(event: &str, matcher: Option<&str>, command: &str) -> HooksConfig {
        let mut map = HashMap::new();
        map.insert(
            event.to_string(),
            vec![HookGroupConfig {
                matcher: matcher.map(str::to_string),
                hooks: vec![HookSpec {
                    r#type: "command".into(),
                    command: command.into(),
                    timeout: Some(5),
                }],
            }],
        );
        map
    }

    #[tokio::test]
    async fn unknown_event_proceeds() {
        let manager = HookManager::new(HooksConfig::default());
        let outcome = manager.run("Stop", None, &json!({})).await.unwrap();
        assert_eq!(outcome, HookOutcome::Proceed);
    }

    #[tokio::test]
    async fn exit_zero_proceeds() {
        let manager = HookManager::new(hooks_with("PreToolUse", None, "exit 0"));
        let outcome = manager.run("PreToolUse", None, &json!({})).await.unwrap();
        assert_eq!(outcome, HookOutcome::Proceed);
    }

    #[tokio::test]
    async fn exit_one_is_advisory() {
        let manager = HookManager::new(hooks_with("PreToolUse", None, "echo warn >&2; exit 1"));
        let outcome = manager.run("PreToolUse", None, &json!({})).await.unwrap();
        assert!(matches!(outcome, HookOutcome::Advise { .. }));
    }

    #[tokio::test]
    async fn exit_two_blocks() {
        let manager = HookManager::new(hooks_with("PreToolUse", None, "echo nope >&2; exit 2"));
        let outcome = manager.run("PreToolUse", None, &json!({})).await.unwrap();
        match outcome {
            HookOutcome::Block { reason } => assert_eq!(reason, "nope"),
            other => panic!("expected Block, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn matcher_filters_by_tool_name() {
        let manager = HookManager::new(hooks_with("PreToolUse", Some("^bash$"), "exit 2"));
        let matched = manager.run("PreToolUse", Some("bash"), &json!({})).await.unwrap();
        assert!(matches!(matched, HookOutcome::Block { .. }));

        let unmatched = manager
            .run("PreToolUse", Some("read_file"), &json!({}))
            .await
            .unwrap();
        assert_eq!(unmatched, HookOutcome::Proceed);
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let manager = HookManager::new({
            let mut map = HashMap::new();
            map.insert(
                "PreToolUse".to_string(),
                vec![HookGroupConfig {
                    matcher: None,
                    hooks: vec![HookSpec {
                        r#type: "command".into(),
                        command: "sleep 5".into(),
                        timeout: Some(1),
                    }],
                }],
            );
            map
        });
        let result = manager.run("PreToolUse", None, &json!({})).await;
        assert!(result.is_err());
    }
}
