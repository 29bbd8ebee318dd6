// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;
use walkdir::WalkDir;

use wave_config::AgentMode;

use crate::policy::ApprovalPolicy;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};

const SKIP_DIRS: &[&str] = &[".git", "target", "node_modules"];

pub struct GrepTool;

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Regex search over file contents. path defaults to the current directory;\n\
         .git/target/node_modules are always skipped. Returns at most `limit` matches\n\
         as path:line:text, in directory-walk order."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Regular expression to search for" },
                "path": { "type": "string", "description": "File or directory to search (default: current directory)" },
                "limit": { "type": "integer", "description": "Maximum number of matches to return (default 100)" }
            },
            "required": ["pattern"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    fn modes(&self) -> &[AgentMode] {
        &[
            AgentMode::Default,
            AgentMode::AcceptEdits,
            AgentMode::BypassPermissions,
            AgentMode::Plan,
        ]
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::MatchList
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let pattern = match call.args.get("pattern").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'pattern'"),
        };
        let path = call
            .args
            .get("path")
            .and_then(|v| v.as_str())
            .unwrap_or(".")
            .to_string();
        let limit = call
            .args
            .get("limit")
            .and_then(|v| v.as_u64())
            .unwrap_or(100) as usize;

        debug!(pattern = %pattern, path = %path, "grep tool");

        let re = match Regex::new(&pattern) {
            Ok(r) => r,
            Err(e) => return ToolOutput::err(&call.id, format!("invalid pattern: {e}")),
        };

        let call_id = call.id.clone();
        let matches = tokio::task::spawn_blocking(move || search(&re, &path, limit)).await;
        match matches {
            Ok(Ok(lines)) => {
                if lines.is_empty() {
                    ToolOutput::ok(call_id, "no matches")
                } else {
                    ToolOutput::ok(call_id, lines.join("\n"))
                }
            }
            Ok(Err(e)) => ToolOutput::err(call_id, e),
            Err(e) => ToolOutput::err(call_id, format!("search task panicked: {e}")),
        }
    }
}

fn search(re: &Regex, path: &str, limit: usize) -> Result<Vec<String>, String> {
    let root = std::path::Path::new(path);
    if !root.exists() {
        return Err(format!("path not found: {path}"));
    }

    let mut out = Vec::new();
    let walker = WalkDir::new(root).into_iter().filter_entry(|e| {
        e.file_name()
            .to_str()
            .map(|n| !SKIP_DIRS.contains(&n))
            .unwrap_or(true)
    });

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(text) = std::fs::read_to_string(entry.path()) else {
            continue;
        };
        for (i, line) in text.lines().enumerate() {
            if re.is_match(line) {
                out.push(format!("{}:{}:{}", entry.path().display(), i + 1, line));
                if out.len() >= limit {
                    return Ok(out);
                }
            }
        }
    }
    Ok(out)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tool::ToolCall;

    fn call(args: Value) -> ToolCall {
        ToolCall {
            id: "g1".into(),
            name: "grep".into(),
            args,
        }
    }

    fn tmp_dir_with(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            std::fs::write(dir.path().join(name), content).unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn finds_matching_lines() {
        let dir = tmp_dir_with(&[("a.txt", "hello\nworld\n")]);
        let out = GrepTool
            .execute(&call(json!({"pattern": "wor.d", "path": dir.path().to_str().unwrap()})))
            .await;
        assert!(!out.is_error, "{}", out.content);
        assert!(out.content.contains("world"));
    }

    #[tokio::test]
    async fn no_matches_reports_cleanly() {
        let dir = tmp_dir_with(&[("a.txt", "hello\n")]);
        let out = GrepTool
            .execute(&call(json!({"pattern": "zzz", "path": dir.path().to_str().unwrap()})))
            .await;
        assert!(!out.is_error);
        assert_eq!(out.content, "no matches");
    }

    #[tokio::test]
    async fn invalid_pattern_is_error() {
        let out = GrepTool
            .execute(&call(json!({"pattern": "(unclosed"})))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("invalid pattern"));
    }

    #[tokio::test]
    async fn missing_pattern_is_error() {
        let out = GrepTool.execute(&call(json!({}))).await;
        assert!(out.is_error);
        assert!(out.content.contains("missing required parameter 'pattern'"));
    }
}
