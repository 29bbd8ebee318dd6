// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};
use wave_config::{AgentMode, McpServerConfig, McpSettings};
use wave_tools::policy::ApprovalPolicy;
use wave_tools::{Tool, ToolCall, ToolOutput, ToolRegistry};

use crate::bridge::{call_result_to_output, mcp_tool_to_schema, namespaced_tool_name};
use crate::rpc::{RpcClient, RpcError};

/// One connected MCP server: its live RPC client plus the tool names it
/// contributed to the registry, so `disconnect` can cleanly unregister
/// exactly what it added.
struct Connection {
    client: Arc<RpcClient>,
    registered_tools: Vec<String>,
}

/// Spawns the servers named in `.mcp.json`, performs the MCP initialize
/// handshake, lists each server's tools, and bridges them into a
/// [`ToolRegistry`] under the `mcp__<server>__<tool>` namespace. Wave acts
/// as the client connecting out to configured servers here, not as a server
/// being connected to.
pub struct McpSupervisor {
    connections: HashMap<String, Connection>,
}

impl McpSupervisor {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
        }
    }

    /// Connects to every server in `settings` and registers its tools into
    /// `registry`. A server that fails to spawn or initialize is logged and
    /// skipped rather than aborting the whole startup — one broken MCP
    /// config shouldn't take down the rest of the tool surface.
    pub async fn connect_all(&mut self, settings: &McpSettings, registry: &mut ToolRegistry) {
        for (name, config) in &settings.mcp_servers {
            match self.connect_one(name, config, registry).await {
                Ok(()) => info!(server = %name, "connected MCP server"),
                Err(e) => warn!(server = %name, error = %e, "failed to connect MCP server"),
            }
        }
    }

    async fn connect_one(
        &mut self,
        name: &str,
        config: &McpServerConfig,
        registry: &mut ToolRegistry,
    ) -> Result<(), RpcError> {
        let client = Arc::new(RpcClient::spawn(&config.command, &config.args, &config.env).await?);

        client
            .call(
                "initialize",
                json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": {"name": "wave", "version": env!("CARGO_PKG_VERSION")},
                }),
            )
            .await?;
        client.notify("notifications/initialized", json!({}))?;

        let list = client.call("tools/list", json!({})).await?;
        let mcp_tools = list
            .get("tools")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let mut registered_tools = Vec::new();
        for mcp_tool in &mcp_tools {
            let Some(schema) = mcp_tool_to_schema(name, mcp_tool) else {
                continue;
            };
            let raw_name = mcp_tool
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let proxy = McpToolProxy {
                registry_name: schema.name.clone(),
                remote_name: raw_name,
                description: schema.description,
                parameters: schema.parameters,
                client: client.clone(),
            };
            registered_tools.push(proxy.registry_name.clone());
            registry.register_arc(Arc::new(proxy));
        }

        self.connections.insert(
            name.to_string(),
            Connection {
                client,
                registered_tools,
            },
        );
        Ok(())
    }

    /// Disconnects one server, unregistering every tool it contributed and
    /// killing its process.
    pub async fn disconnect(&mut self, name: &str, registry: &mut ToolRegistry) {
        if let Some(conn) = self.connections.remove(name) {
            for tool_name in &conn.registered_tools {
                registry.unregister(tool_name);
            }
            conn.client.shutdown().await;
        }
    }

    pub async fn disconnect_all(&mut self, registry: &mut ToolRegistry) {
        let names: Vec<String> = self.connections.keys().cloned().collect();
        for name in names {
            self.disconnect(&name, registry).await;
        }
    }

    pub fn server_names(&self) -> Vec<String> {
        self.connections.keys().cloned().collect()
    }
}

impl Default for McpSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// A `wave_tools::Tool` implementation that forwards every call to a remote
/// MCP server's `tools/call` over its [`RpcClient`]. The only engine-facing
/// difference between this and a built-in tool is where `execute` sends the
/// request — everything upstream (permissions, registry, output truncation)
/// treats it identically.
struct McpToolProxy {
    registry_name: String,
    remote_name: String,
    description: String,
    parameters: serde_json::Value,
    client: Arc<RpcClient>,
}

#[async_trait]
impl Tool for McpToolProxy {
    fn name(&self) -> &str {
        &self.registry_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.parameters.clone()
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Ask
    }

    fn modes(&self) -> &[AgentMode] {
        &[
            AgentMode::Default,
            AgentMode::AcceptEdits,
            AgentMode::BypassPermissions,
        ]
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let result = self
            .client
            .call(
                "tools/call",
                json!({"name": self.remote_name, "arguments": call.args}),
            )
            .await;
        match result {
            Ok(value) => call_result_to_output(&call.id, &value),
            Err(e) => ToolOutput::err(&call.id, format!("MCP call failed: {e}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
