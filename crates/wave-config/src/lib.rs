// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod live;
mod loader;
mod schema;
mod settings;

pub use live::LiveConfigManager;
pub use loader::load;
pub use schema::{
    AgentConfig, AgentMode, CompactionStrategy, Config, HookGroupConfig, HookSpec, HooksConfig,
    LspServerConfig, LspSettings, McpServerConfig, McpSettings, ModelConfig, ToolsConfig,
};
pub use settings::{PermissionMode, Settings, SettingsLayer};
