// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use wave_config::{AgentMode, ToolsConfig};
use wave_tools::ApprovalPolicy;

use crate::rule::{decompose_bash, expand_bash_rule, Rule};
use crate::safezone::SafeZone;

pub type PermissionMode = AgentMode;

/// Everything a caller needs to render a permission prompt or make an
/// automated decision: which tool, which concrete argument it resolves to,
/// and whether a persistent-allow offer even makes sense for it.
#[derive(Debug, Clone)]
pub struct PermissionContext {
    pub tool_name: String,
    /// The canonical argument this call would be checked/recorded against —
    /// a file path for file tools, the raw command for `Bash`.
    pub arg: String,
    pub call_args: Value,
    pub mode: PermissionMode,
    /// `true` when a persistent "always allow" choice should be hidden from
    /// the prompt (e.g. `BypassPermissions` mode already allows everything,
    /// so offering to persist a redundant rule would be noise).
    pub hide_persistent_option: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionDecision {
    Allow,
    Deny { reason: String },
    /// User approved for just this call; no rule is recorded.
    AllowOnce,
    /// User approved and asked for the expanded rule to be persisted.
    AllowAlways { rule: Rule },
}

pub type AskCallback = Arc<dyn Fn(&PermissionContext) -> PermissionDecision + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum PermissionError {
    #[error("tool '{0}' is not available in the current mode")]
    ModeRestricted(String),
    #[error("path '{0}' is outside the permitted working directories")]
    OutsideSafeZone(String),
    #[error("denied: {0}")]
    Denied(String),
    #[error("no interactive callback registered to ask about '{0}'")]
    NoCallback(String),
}

/// Central decision pipeline: mode gating, safe-zone containment, and the
/// persistent/temporary rule table, generalizing
/// `wave_tools::ApprovalPolicy`'s three-way (Auto/Ask/Deny) split into a
/// stateful manager that can learn new rules at runtime.
pub struct PermissionManager {
    mode: Mutex<PermissionMode>,
    safe_zone: SafeZone,
    deny_patterns: Vec<regex::Regex>,
    persistent_rules: Mutex<Vec<Rule>>,
    session_rules: Mutex<Vec<Rule>>,
    /// Rules installed for the duration of one top-level `AIManager.send`
    /// call (its `allowed_rules` option), distinct from `session_rules`
    /// (which accumulates "always allow" decisions for the process
    /// lifetime). The caller installs these at recursion depth 0 and clears
    /// them on every exit path.
    temp_rules: Mutex<Vec<Rule>>,
    ask: Option<AskCallback>,
    /// The plan file Plan mode's Edit/Delete exception applies to (spec rule
    /// 2: "allow Edit/Delete of the configured plan file"). `None` means no
    /// plan file is configured, so the exception never fires.
    plan_file_path: Option<PathBuf>,
}

impl PermissionManager {
    pub fn new(mode: PermissionMode, cwd: impl AsRef<std::path::Path>, tools: &ToolsConfig) -> Self {
        let safe_zone = SafeZone::new(cwd, &tools.additional_directories);
        let deny_patterns = tools
            .deny_patterns
            .iter()
            .filter_map(|p| glob_to_regex(p))
            .collect();
        Self {
            mode: Mutex::new(mode),
            safe_zone,
            deny_patterns,
            persistent_rules: Mutex::new(Vec::new()),
            session_rules: Mutex::new(Vec::new()),
            temp_rules: Mutex::new(Vec::new()),
            ask: None,
            plan_file_path: None,
        }
    }

    pub fn with_ask_callback(mut self, ask: AskCallback) -> Self {
        self.ask = Some(ask);
        self
    }

    pub fn with_plan_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.plan_file_path = Some(path.into());
        self
    }

    pub fn set_mode(&self, mode: PermissionMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn mode(&self) -> PermissionMode {
        *self.mode.lock().unwrap()
    }

    pub fn load_persistent_rules(&self, rules: Vec<Rule>) {
        *self.persistent_rules.lock().unwrap() = rules;
    }

    /// Installs rules for the duration of one top-level turn. Callers must
    /// pair this with [`Self::clear_temporary_rules`] on every exit path
    /// (success, error, or abort), since these are not otherwise bounded.
    pub fn install_temporary_rules(&self, rules: Vec<Rule>) {
        self.temp_rules.lock().unwrap().extend(rules);
    }

    pub fn clear_temporary_rules(&self) {
        self.temp_rules.lock().unwrap().clear();
    }

    /// Builds the [`PermissionContext`] that would be used to ask about this
    /// invocation, without making a decision — callers that want to render a
    /// prompt call this first, then feed the context to the registered
    /// callback (or to [`Self::check`], which does both).
    pub fn create_context(&self, tool_name: &str, call_args: &Value) -> PermissionContext {
        let arg = canonical_arg(tool_name, call_args);
        let mode = self.mode();
        PermissionContext {
            tool_name: tool_name.to_string(),
            arg,
            call_args: call_args.clone(),
            mode,
            hide_persistent_option: mode == PermissionMode::BypassPermissions,
        }
    }

    /// Decides whether a tool call may run. `default_policy` is the tool's
    /// own [`ApprovalPolicy`] (from its `Tool::default_policy()`), consulted
    /// only after mode/safe-zone/deny checks and rule-table lookups have all
    /// failed to produce an answer.
    pub fn check(
        &self,
        tool_name: &str,
        call_args: &Value,
        modes: &[PermissionMode],
        default_policy: ApprovalPolicy,
        touched_path: Option<&std::path::Path>,
    ) -> Result<(), PermissionError> {
        let mode = self.mode();
        let arg = canonical_arg(tool_name, call_args);

        // Deny patterns are a hard backstop that applies regardless of mode,
        // including bypassPermissions — they exist precisely to catch
        // commands no mode should ever auto-allow.
        if tool_name == "bash" || tool_name == "Bash" {
            for primitive in decompose_bash(&arg) {
                if self.deny_patterns.iter().any(|re| re.is_match(&primitive)) {
                    return Err(PermissionError::Denied(format!(
                        "command matches a deny pattern: {primitive}"
                    )));
                }
            }
        } else if self.deny_patterns.iter().any(|re| re.is_match(&arg)) {
            return Err(PermissionError::Denied(format!(
                "argument matches a deny pattern: {arg}"
            )));
        }

        // Rule 1: bypassPermissions allows everything else, unconditionally
        // and before any mode-gate or safe-zone check runs.
        if mode == PermissionMode::BypassPermissions {
            return Ok(());
        }

        // Rule 2: in plan mode, Edit/Delete tools are denied outright except
        // against the one configured plan file, which is allowed even though
        // the tool's own `modes()` list never includes `Plan`.
        if mode == PermissionMode::Plan && is_edit_tool(tool_name) {
            let allowed = touched_path
                .zip(self.plan_file_path.as_deref())
                .is_some_and(|(path, plan_path)| path == plan_path);
            return if allowed {
                Ok(())
            } else {
                Err(PermissionError::Denied(
                    "only the designated plan file may be edited in plan mode".to_string(),
                ))
            };
        }

        if !modes.contains(&mode) {
            return Err(PermissionError::ModeRestricted(tool_name.to_string()));
        }

        if let Some(path) = touched_path {
            if !self.safe_zone.contains(path) {
                return Err(PermissionError::OutsideSafeZone(
                    path.display().to_string(),
                ));
            }
        }

        if self.rule_allows(tool_name, &arg) {
            return Ok(());
        }

        match default_policy {
            ApprovalPolicy::Deny => Err(PermissionError::Denied(format!(
                "{tool_name} is denied by policy"
            ))),
            ApprovalPolicy::Auto => Ok(()),
            ApprovalPolicy::Ask => {
                if mode == PermissionMode::AcceptEdits && is_edit_tool(tool_name) {
                    return Ok(());
                }
                self.ask_and_record(tool_name, call_args)
            }
        }
    }

    fn rule_allows(&self, tool_name: &str, arg: &str) -> bool {
        self.persistent_rules
            .lock()
            .unwrap()
            .iter()
            .chain(self.session_rules.lock().unwrap().iter())
            .chain(self.temp_rules.lock().unwrap().iter())
            .any(|r| r.matches(tool_name, arg))
    }

    fn ask_and_record(&self, tool_name: &str, call_args: &Value) -> Result<(), PermissionError> {
        let Some(ask) = &self.ask else {
            return Err(PermissionError::NoCallback(tool_name.to_string()));
        };
        let ctx = self.create_context(tool_name, call_args);
        match ask(&ctx) {
            PermissionDecision::Allow | PermissionDecision::AllowOnce => Ok(()),
            PermissionDecision::AllowAlways { rule } => {
                self.session_rules.lock().unwrap().push(rule);
                Ok(())
            }
            PermissionDecision::Deny { reason } => Err(PermissionError::Denied(reason)),
        }
    }

    /// Expands a raw bash command into the `Bash(prefix:*)` rule that would
    /// be offered to the user as the "always allow" choice.
    pub fn expand_bash_rule(&self, command: &str) -> Rule {
        expand_bash_rule(command)
    }
}

fn is_edit_tool(tool_name: &str) -> bool {
    matches!(tool_name, "write" | "edit_file" | "delete_file")
}

fn canonical_arg(tool_name: &str, call_args: &Value) -> String {
    let key = match tool_name {
        "bash" | "Bash" => "command",
        _ => "path",
    };
    call_args
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| call_args.to_string())
}

fn glob_to_regex(pattern: &str) -> Option<regex::Regex> {
    let mut re = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    regex::Regex::new(&re).ok()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manager(mode: PermissionMode) -> PermissionManager {
        let dir = tempfile::tempdir().unwrap();
        // Leak the tempdir path so it outlives the manager in these tests;
        // fine for unit tests, nothing is ever written here.
        let path = dir.into_path();
        PermissionManager::new(mode, path, &ToolsConfig::default())
    }

    #[test]
    fn bypass_mode_allows_everything() {
        let m = manager(PermissionMode::BypassPermissions);
        let modes = [PermissionMode::BypassPermissions];
        let res = m.check(
            "bash",
            &json!({"command": "rm -rf /home"}),
            &modes,
            ApprovalPolicy::Ask,
            None,
        );
        assert!(res.is_ok());
    }

    #[test]
    fn deny_pattern_blocks_even_in_bypass_mode() {
        let dir = tempfile::tempdir().unwrap();
        let tools = ToolsConfig {
            deny_patterns: vec!["rm -rf /*".to_string()],
            ..ToolsConfig::default()
        };
        let m = PermissionManager::new(PermissionMode::BypassPermissions, dir.path(), &tools);
        let modes = [PermissionMode::BypassPermissions];
        let res = m.check(
            "bash",
            &json!({"command": "rm -rf /"}),
            &modes,
            ApprovalPolicy::Auto,
            None,
        );
        assert!(res.is_err());
    }

    #[test]
    fn mode_restricted_tool_is_rejected() {
        let m = manager(PermissionMode::Plan);
        let modes = [PermissionMode::Default];
        let res = m.check("write", &json!({"path": "a.txt"}), &modes, ApprovalPolicy::Auto, None);
        assert!(matches!(res, Err(PermissionError::ModeRestricted(_))));
    }

    #[test]
    fn auto_policy_allows_without_callback() {
        let m = manager(PermissionMode::Default);
        let modes = [PermissionMode::Default];
        let res = m.check("read_file", &json!({"path": "a.txt"}), &modes, ApprovalPolicy::Auto, None);
        assert!(res.is_ok());
    }

    #[test]
    fn ask_policy_without_callback_errors() {
        let m = manager(PermissionMode::Default);
        let modes = [PermissionMode::Default];
        let res = m.check("write", &json!({"path": "a.txt"}), &modes, ApprovalPolicy::Ask, None);
        assert!(matches!(res, Err(PermissionError::NoCallback(_))));
    }

    #[test]
    fn ask_policy_consults_callback_and_records_rule() {
        let dir = tempfile::tempdir().unwrap();
        let m = PermissionManager::new(PermissionMode::Default, dir.path(), &ToolsConfig::default())
            .with_ask_callback(Arc::new(|ctx: &PermissionContext| {
                PermissionDecision::AllowAlways {
                    rule: expand_bash_rule(&ctx.arg),
                }
            }));
        let modes = [PermissionMode::Default];
        let res = m.check(
            "bash",
            &json!({"command": "git push origin main"}),
            &modes,
            ApprovalPolicy::Ask,
            None,
        );
        assert!(res.is_ok());
        // A second, identical call is now covered by the recorded rule and
        // doesn't need the callback again.
        let m2_res = m.check(
            "bash",
            &json!({"command": "git push origin develop"}),
            &modes,
            ApprovalPolicy::Ask,
            None,
        );
        assert!(m2_res.is_ok());
    }

    #[test]
    fn accept_edits_mode_auto_allows_edit_tools() {
        let m = manager(PermissionMode::AcceptEdits);
        let modes = [PermissionMode::AcceptEdits];
        let res = m.check("write", &json!({"path": "a.txt"}), &modes, ApprovalPolicy::Ask, None);
        assert!(res.is_ok());
    }

    #[test]
    fn path_outside_safe_zone_is_rejected() {
        // bypassPermissions allows everything unconditionally (spec rule 1),
        // so safe-zone denial is only exercised in a gated mode.
        let m = manager(PermissionMode::AcceptEdits);
        let modes = [PermissionMode::AcceptEdits];
        let res = m.check(
            "write",
            &json!({"path": "/etc/passwd"}),
            &modes,
            ApprovalPolicy::Auto,
            Some(std::path::Path::new("/etc/passwd")),
        );
        assert!(matches!(res, Err(PermissionError::OutsideSafeZone(_))));
    }

    #[test]
    fn bypass_mode_ignores_safe_zone() {
        let m = manager(PermissionMode::BypassPermissions);
        let modes = [PermissionMode::BypassPermissions];
        let res = m.check(
            "write",
            &json!({"path": "/etc/passwd"}),
            &modes,
            ApprovalPolicy::Auto,
            Some(std::path::Path::new("/etc/passwd")),
        );
        assert!(res.is_ok());
    }

    #[test]
    fn plan_mode_allows_edit_of_designated_plan_file() {
        let dir = tempfile::tempdir().unwrap();
        let m = PermissionManager::new(PermissionMode::Plan, dir.path(), &ToolsConfig::default())
            .with_plan_file_path(PathBuf::from("/p.md"));
        let modes = [PermissionMode::Default, PermissionMode::AcceptEdits];
        let res = m.check(
            "edit_file",
            &json!({"path": "/p.md"}),
            &modes,
            ApprovalPolicy::Ask,
            Some(Path::new("/p.md")),
        );
        assert!(res.is_ok());
    }

    #[test]
    fn plan_mode_denies_edit_of_non_plan_file() {
        let dir = tempfile::tempdir().unwrap();
        let m = PermissionManager::new(PermissionMode::Plan, dir.path(), &ToolsConfig::default())
            .with_plan_file_path(PathBuf::from("/p.md"));
        let modes = [PermissionMode::Default, PermissionMode::AcceptEdits];
        let res = m.check(
            "edit_file",
            &json!({"path": "/x.ts"}),
            &modes,
            ApprovalPolicy::Ask,
            Some(Path::new("/x.ts")),
        );
        match res {
            Err(PermissionError::Denied(msg)) => {
                assert!(msg.contains("designated plan file"));
            }
            other => panic!("expected Denied, got {other:?}"),
        }
    }

    #[test]
    fn bypass_mode_hides_persistent_option() {
        let m = manager(PermissionMode::BypassPermissions);
        let ctx = m.create_context("bash", &json!({"command": "ls"}));
        assert!(ctx.hide_persistent_option);
    }

    #[test]
    fn default_mode_shows_persistent_option() {
        let m = manager(PermissionMode::Default);
        let ctx = m.create_context("bash", &json!({"command": "ls"}));
        assert!(!ctx.hide_persistent_option);
    }
}
