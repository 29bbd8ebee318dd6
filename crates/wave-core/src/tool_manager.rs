// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Thin façade over [`wave_tools::ToolRegistry`]. Permission and hook
//! evaluation live in [`crate::ai_manager`], not here — this type's only
//! job is mode-filtered schema listing and dispatch, the same separation
//! a tool registry (mechanism) draws from its caller (policy).

use std::sync::Arc;

use wave_config::AgentMode;
use wave_model::ToolSchema as WireToolSchema;
use wave_tools::{ApprovalPolicy, OutputCategory, ToolCall, ToolOutput, ToolRegistry};

pub struct ToolManager {
    registry: Arc<ToolRegistry>,
}

impl ToolManager {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Schemas for the tools offered to the model in `mode`, translated into
    /// the provider-wire shape.
    pub fn wire_schemas_for_mode(&self, mode: AgentMode) -> Vec<WireToolSchema> {
        self.registry
            .schemas_for_mode(mode)
            .into_iter()
            .map(|s| WireToolSchema {
                name: s.name,
                description: s.description,
                parameters: s.parameters,
            })
            .collect()
    }

    pub fn names_for_mode(&self, mode: AgentMode) -> Vec<String> {
        self.registry.names_for_mode(mode)
    }

    pub async fn execute(&self, call: &ToolCall) -> ToolOutput {
        self.registry.execute(call).await
    }

    /// The output shape `name` declares, for truncation; unknown tools are
    /// treated as `Generic` so a stale or MCP-bridged name never panics.
    pub fn output_category(&self, name: &str) -> OutputCategory {
        self.registry
            .get(name)
            .map(|t| t.output_category())
            .unwrap_or_default()
    }

    pub fn default_policy(&self, name: &str) -> Option<ApprovalPolicy> {
        self.registry.get(name).map(|t| t.default_policy())
    }

    pub fn modes_for(&self, name: &str) -> Vec<AgentMode> {
        self.registry
            .get(name)
            .map(|t| t.modes().to_vec())
            .unwrap_or_default()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
