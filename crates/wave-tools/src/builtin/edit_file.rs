// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use wave_config::AgentMode;

use crate::policy::ApprovalPolicy;
use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Replaces an exact, unique occurrence of old_str with new_str in an existing file.\n\
         old_str must match the file content exactly, including whitespace, and must appear\n\
         exactly once — ambiguous or missing matches are returned as errors, not guessed at."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Absolute or relative path to the file" },
                "old_str": { "type": "string", "description": "Exact text to replace" },
                "new_str": { "type": "string", "description": "Replacement text" }
            },
            "required": ["path", "old_str", "new_str"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Ask
    }

    fn modes(&self) -> &[AgentMode] {
        &[AgentMode::Default, AgentMode::AcceptEdits, AgentMode::BypassPermissions]
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = match call.args.get("path").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'path'"),
        };
        let old_str = match call.args.get("old_str").and_then(|v| v.as_str()) {
            Some(s) => s,
            None => return ToolOutput::err(&call.id, "missing required parameter 'old_str'"),
        };
        let new_str = match call.args.get("new_str").and_then(|v| v.as_str()) {
            Some(s) => s,
            None => return ToolOutput::err(&call.id, "missing required parameter 'new_str'"),
        };

        debug!(path = %path, "edit_file tool");

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(&call.id, format!("read error: {e}")),
        };

        let occurrences = content.matches(old_str).count();
        if occurrences == 0 {
            return ToolOutput::err(&call.id, "old_str not found in file");
        }
        if occurrences > 1 {
            return ToolOutput::err(
                &call.id,
                format!("old_str is ambiguous: matched {occurrences} times, expected exactly 1"),
            );
        }

        let updated = content.replacen(old_str, new_str, 1);
        match tokio::fs::write(&path, &updated).await {
            Ok(_) => ToolOutput::ok(&call.id, format!("edited {path}")),
            Err(e) => ToolOutput::err(&call.id, format!("write error: {e}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
