// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
#[cfg(unix)]
use libc;
use serde_json::{json, Value};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::policy::ApprovalPolicy;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};

const OUTPUT_LIMIT_BYTES: usize = 20_000;
const HEAD_LINES: usize = 60;
const TAIL_LINES: usize = 40;

/// Built-in tool that runs a shell command. This is the primitive
/// `PermissionManager`'s Bash-command decomposition reasons about — each
/// invocation is a single `command` string, never a script.
pub struct BashTool {
    pub timeout_secs: u64,
}

impl Default for BashTool {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Executes a shell command and returns stdout + stderr.\n\
         Output over ~20 KB is truncated to the first 60 and last 40 lines.\n\
         Prefer read_file/grep/glob/edit_file for file operations instead of\n\
         cat/grep/find/sed — they're cheaper and the output shape is predictable."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "The shell command to execute" },
                "workdir": { "type": "string", "description": "Working directory (optional, defaults to cwd)" },
                "timeout_secs": { "type": "integer", "description": "Execution timeout in seconds (optional)" }
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Ask
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::HeadTail
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let command = match call.args.get("command").and_then(|v| v.as_str()) {
            Some(c) => c.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'command'"),
        };
        let workdir = call
            .args
            .get("workdir")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let timeout = call
            .args
            .get("timeout_secs")
            .and_then(|v| v.as_u64())
            .unwrap_or(self.timeout_secs);

        debug!(cmd = %command, "executing bash tool");

        let mut cmd = Command::new("bash");
        cmd.arg("-c").arg(&command);
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }
        if let Some(wd) = &workdir {
            cmd.current_dir(wd);
        }

        let result =
            tokio::time::timeout(std::time::Duration::from_secs(timeout), cmd.output()).await;

        match result {
            Ok(Ok(output)) => {
                let mut content = String::new();
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);

                if !stdout.is_empty() {
                    content.push_str(&head_tail_truncate(&stdout));
                }
                if !stderr.is_empty() {
                    if !content.is_empty() {
                        content.push('\n');
                    }
                    content.push_str("[stderr]\n");
                    content.push_str(&head_tail_truncate(&stderr));
                }
                if content.is_empty() {
                    content = format!("[exit {}]", output.status.code().unwrap_or(-1));
                }

                let code = output.status.code().unwrap_or(-1);
                if code == 0 {
                    ToolOutput::ok(&call.id, content)
                } else {
                    ToolOutput::err(&call.id, format!("[exit {code}]\n{content}"))
                }
            }
            Ok(Err(e)) => ToolOutput::err(&call.id, format!("spawn error: {e}")),
            Err(_) => ToolOutput::err(&call.id, format!("timeout after {timeout}s")),
        }
    }
}

/// Truncate `s` to fit within [`OUTPUT_LIMIT_BYTES`], keeping the first
/// [`HEAD_LINES`] and last [`TAIL_LINES`] lines so both the command preamble
/// and the final result (errors, summaries) stay visible.
pub(crate) fn head_tail_truncate(s: &str) -> String {
    if s.len() <= OUTPUT_LIMIT_BYTES {
        return s.to_string();
    }

    let lines: Vec<&str> = s.lines().collect();
    let total = lines.len();

    if total <= HEAD_LINES + TAIL_LINES {
        return s.chars().take(OUTPUT_LIMIT_BYTES).collect();
    }

    let head = lines[..HEAD_LINES].join("\n");
    let tail = lines[total - TAIL_LINES..].join("\n");
    format!(
        "{head}\n...[{} lines omitted]...\n{tail}",
        total - HEAD_LINES - TAIL_LINES
    )
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tool::ToolCall;

    fn call(args: Value) -> ToolCall {
        ToolCall {
            id: "b1".into(),
            name: "bash".into(),
            args,
        }
    }

    #[tokio::test]
    async fn echo_succeeds() {
        let out = BashTool::default()
            .execute(&call(json!({"command": "echo hello"})))
            .await;
        assert!(!out.is_error, "{}", out.content);
        assert!(out.content.contains("hello"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_error() {
        let out = BashTool::default()
            .execute(&call(json!({"command": "exit 7"})))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("exit 7"));
    }

    #[tokio::test]
    async fn missing_command_is_error() {
        let out = BashTool::default().execute(&call(json!({}))).await;
        assert!(out.is_error);
        assert!(out.content.contains("missing required parameter 'command'"));
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let out = BashTool::default()
            .execute(&call(json!({"command": "sleep 5", "timeout_secs": 1})))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("timeout"));
    }

    #[test]
    fn short_output_is_not_truncated() {
        assert_eq!(head_tail_truncate("short"), "short");
    }

    #[test]
    fn long_output_keeps_head_and_tail() {
        let body: String = (0..500).map(|i| format!("line{i}\n")).collect();
        let long = "x".repeat(OUTPUT_LIMIT_BYTES) + &body;
        let out = head_tail_truncate(&long);
        assert!(out.contains("omitted"));
    }
}
