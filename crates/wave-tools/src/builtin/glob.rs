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
use crate::tool::{Tool, ToolCall, ToolOutput};

const SKIP_DIRS: &[&str] = &[".git", "target", "node_modules"];

pub struct GlobTool;

/// Convert a shell glob (`*`, `?`) to an anchored [`Regex`] matched against
/// the filename only — path prefixes in the pattern are stripped, since the
/// recursive walk already handles directory traversal.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let name_part = pattern.rsplit('/').next().unwrap_or(pattern);
    let mut re = String::from("^");
    for ch in name_part.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Finds files matching a filename glob (*, ?) recursively under root.\n\
         .git/target/node_modules are always skipped. Results are sorted by\n\
         modification time, newest first, capped at max_results (default 100)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Filename glob, e.g. '*.rs'" },
                "root": { "type": "string", "description": "Root directory to search from (default: current directory)" },
                "max_results": { "type": "integer", "description": "Maximum number of results (default 100)" }
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

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let pattern = match call.args.get("pattern").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'pattern'"),
        };
        let root = call
            .args
            .get("root")
            .and_then(|v| v.as_str())
            .unwrap_or(".")
            .to_string();
        let max_results = call
            .args
            .get("max_results")
            .and_then(|v| v.as_u64())
            .unwrap_or(100) as usize;

        debug!(pattern = %pattern, root = %root, "glob tool");

        let re = match glob_to_regex(&pattern) {
            Some(r) => r,
            None => return ToolOutput::err(&call.id, "invalid glob pattern"),
        };

        let call_id = call.id.clone();
        let found =
            tokio::task::spawn_blocking(move || search(&re, &root, max_results)).await;
        match found {
            Ok(Ok(paths)) if paths.is_empty() => ToolOutput::ok(call_id, "no matches"),
            Ok(Ok(paths)) => ToolOutput::ok(call_id, paths.join("\n")),
            Ok(Err(e)) => ToolOutput::err(call_id, e),
            Err(e) => ToolOutput::err(call_id, format!("search task panicked: {e}")),
        }
    }
}

fn search(re: &Regex, root: &str, max_results: usize) -> Result<Vec<String>, String> {
    let root_path = std::path::Path::new(root);
    if !root_path.exists() {
        return Err(format!("root not found: {root}"));
    }

    let mut hits: Vec<(std::path::PathBuf, std::time::SystemTime)> = Vec::new();
    let walker = WalkDir::new(root_path).into_iter().filter_entry(|e| {
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
        let name = entry.file_name().to_string_lossy();
        if re.is_match(&name) {
            let mtime = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            hits.push((entry.into_path(), mtime));
        }
    }

    hits.sort_by(|a, b| b.1.cmp(&a.1));
    hits.truncate(max_results);
    Ok(hits
        .into_iter()
        .map(|(p, _)| p.display().to_string())
        .collect())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
