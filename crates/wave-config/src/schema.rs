// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// Top-level config-file schema (`.wave/config.yaml` and friends).
///
/// This is distinct from [`crate::Settings`], which holds the *layered*
/// `settings.json` fields (`defaultMode`, `env`, `hooks`, `enabledPlugins`)
/// described above — `Config` holds everything else (model
/// selection, agent tuning, tool policy).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub providers: HashMap<String, ModelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: String,
    pub name: String,
    pub api_key_env: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    #[serde(default = "default_true")]
    pub cache_system_prompt: bool,
    pub mock_responses_file: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            name: "gpt-4o".into(),
            api_key_env: None,
            api_key: None,
            base_url: None,
            max_tokens: Some(4096),
            temperature: Some(0.2),
            cache_system_prompt: true,
            mock_responses_file: None,
        }
    }
}

fn default_max_tool_rounds() -> u32 {
    200
}
fn default_compaction_threshold() -> f32 {
    0.85
}
fn default_compaction_keep_recent() -> usize {
    6
}
fn default_tool_result_token_cap() -> usize {
    4000
}
fn default_compaction_overhead_reserve() -> f32 {
    0.10
}
fn default_input_token_limit() -> usize {
    128_000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompactionStrategy {
    #[default]
    Structured,
    Narrative,
}

/// Agent loop tuning. Mirrors sven-config::AgentConfig, trimmed to the
/// fields the turn loop (`wave-core::ai_manager`) actually reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub default_mode: AgentMode,
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
    /// Input tokens above which `AIManager::send` compacts before calling
    /// the model.
    #[serde(default = "default_input_token_limit")]
    pub input_token_limit: usize,
    #[serde(default = "default_compaction_threshold")]
    pub compaction_threshold: f32,
    #[serde(default = "default_compaction_keep_recent")]
    pub compaction_keep_recent: usize,
    #[serde(default)]
    pub compaction_strategy: CompactionStrategy,
    #[serde(default = "default_tool_result_token_cap")]
    pub tool_result_token_cap: usize,
    #[serde(default = "default_compaction_overhead_reserve")]
    pub compaction_overhead_reserve: f32,
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Maximum recursion depth for the Stop/SubagentStop hook restart loop
    /// before giving up and surfacing the stop to the caller.
    #[serde(default = "default_stop_hook_restart_cap")]
    pub stop_hook_restart_cap: u32,
}

fn default_stop_hook_restart_cap() -> u32 {
    3
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            default_mode: AgentMode::Default,
            max_tool_rounds: default_max_tool_rounds(),
            input_token_limit: default_input_token_limit(),
            compaction_threshold: default_compaction_threshold(),
            compaction_keep_recent: default_compaction_keep_recent(),
            compaction_strategy: CompactionStrategy::Structured,
            tool_result_token_cap: default_tool_result_token_cap(),
            compaction_overhead_reserve: default_compaction_overhead_reserve(),
            system_prompt: None,
            stop_hook_restart_cap: default_stop_hook_restart_cap(),
        }
    }
}

/// Permission mode controlling how aggressively tool calls are approved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum, Default)]
#[serde(rename_all = "camelCase")]
pub enum AgentMode {
    #[default]
    Default,
    AcceptEdits,
    BypassPermissions,
    Plan,
}

impl std::fmt::Display for AgentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentMode::Default => write!(f, "default"),
            AgentMode::AcceptEdits => write!(f, "acceptEdits"),
            AgentMode::BypassPermissions => write!(f, "bypassPermissions"),
            AgentMode::Plan => write!(f, "plan"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Extra persistent allow-rules in `Tool(argument)` / `Tool(prefix:*)`
    /// grammar, read at startup in addition to
    /// whatever `PermissionManager` accumulates via "remember" at runtime.
    #[serde(default)]
    pub allow_rules: Vec<String>,
    #[serde(default)]
    pub deny_patterns: Vec<String>,
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
    /// Extra directories, besides `workdir`, that belong to the safe zone
    /// (the "safe zone" a tool call's file-path arguments must stay inside).
    #[serde(default)]
    pub additional_directories: Vec<String>,
}

fn default_tool_timeout_secs() -> u64 {
    30
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            allow_rules: Vec::new(),
            deny_patterns: vec!["rm -rf /*".into(), "dd if=*".into()],
            timeout_secs: default_tool_timeout_secs(),
            additional_directories: Vec::new(),
        }
    }
}

// ─── .mcp.json ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpSettings {
    #[serde(default, rename = "mcpServers")]
    pub mcp_servers: HashMap<String, McpServerConfig>,
}

// ─── .lsp.json ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LspServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, rename = "extensionToLanguage")]
    pub extension_to_language: HashMap<String, String>,
    #[serde(default = "default_startup_timeout_secs", rename = "startupTimeout")]
    pub startup_timeout_secs: u64,
    #[serde(default = "default_shutdown_timeout_secs", rename = "shutdownTimeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_startup_timeout_secs() -> u64 {
    15
}
fn default_shutdown_timeout_secs() -> u64 {
    5
}

/// `.lsp.json` is a flat map of language name -> server config.
pub type LspSettings = HashMap<String, LspServerConfig>;

// ─── Hook configuration ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookSpec {
    #[serde(default = "default_hook_type")]
    pub r#type: String,
    pub command: String,
    pub timeout: Option<u64>,
}

fn default_hook_type() -> String {
    "command".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookGroupConfig {
    /// Only meaningful for tool-scoped events (`PreToolUse`, `PostToolUse`).
    pub matcher: Option<String>,
    pub hooks: Vec<HookSpec>,
}

/// `{<event>: [{matcher?, hooks:[...]}]}` — keys are the six hook event names
/// (UserPromptSubmit, PreToolUse, PostToolUse, Stop, SubagentStop, Notification).
pub type HooksConfig = HashMap<String, Vec<HookGroupConfig>>;

// ─── Unit tests ──────────────────────────────────────────────────────────────
