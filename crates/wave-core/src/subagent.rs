// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Supervises child engines spawned by the `task` tool: each gets its own
//! [`MessageManager`] and session but shares the parent's model, permission
//! mode, and hook configuration. One instance per live child is kept in
//! `instances`, removed once the child reaches a terminal status.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use wave_config::{AgentConfig, AgentMode};
use wave_hooks::HookManager;
use wave_model::ModelProvider;
use wave_permissions::PermissionManager;
use wave_session::SessionStore;
use wave_tasks::ForegroundTaskStack;
use wave_tools::{ApprovalPolicy, Tool, ToolCall, ToolOutput, ToolRegistry};

use crate::ai_manager::{AIManager, AbortHandle, TurnOptions};
use crate::events::AgentEvent;
use crate::message_manager::MessageManager;
use crate::runtime_context::AgentRuntimeContext;
use crate::tool_manager::ToolManager;

/// Subagents cannot themselves spawn subagents past this nesting depth.
const MAX_DEPTH: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubagentStatus {
    Initializing,
    Active,
    Completed,
    Error,
    Aborted,
}

/// The parent-side mirror of a running or finished child. `last_tools` is
/// the two-element ring the parent's `subagent{...}` journal block reports,
/// most recent last.
#[derive(Debug, Clone)]
pub struct SubagentInstance {
    pub subagent_id: String,
    pub description: String,
    pub session_id: String,
    pub status: SubagentStatus,
    pub last_tools: Vec<String>,
    pub abort: AbortHandle,
}

impl SubagentInstance {
    fn record_tool(&mut self, name: &str) {
        if self.last_tools.len() == 2 {
            self.last_tools.remove(0);
        }
        self.last_tools.push(name.to_string());
    }
}

/// One previously-journaled subagent, as read back from a parent session's
/// `subagent{...}` blocks, for [`SubagentSupervisor::restore`].
pub struct RestoreEntry {
    pub subagent_id: String,
    pub session_id: String,
    pub description: String,
    pub configuration_name: Option<String>,
}

pub struct SubagentSupervisor {
    instances: Mutex<HashMap<String, SubagentInstance>>,
    next_id: AtomicU32,
}

impl SubagentSupervisor {
    pub fn new() -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(1),
        }
    }

    fn allocate_id(&self) -> String {
        format!("subagent_{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    pub async fn instance(&self, subagent_id: &str) -> Option<SubagentInstance> {
        self.instances.lock().await.get(subagent_id).cloned()
    }

    pub async fn instance_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.instances.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    async fn insert(&self, instance: SubagentInstance) {
        self.instances.lock().await.insert(instance.subagent_id.clone(), instance);
    }

    async fn set_status(&self, subagent_id: &str, status: SubagentStatus) {
        if let Some(instance) = self.instances.lock().await.get_mut(subagent_id) {
            instance.status = status;
        }
    }

    async fn record_tool(&self, subagent_id: &str, tool_name: &str) {
        if let Some(instance) = self.instances.lock().await.get_mut(subagent_id) {
            instance.record_tool(tool_name);
        }
    }

    async fn remove(&self, subagent_id: &str) {
        self.instances.lock().await.remove(subagent_id);
    }

    /// Rebuilds the `instances` map from journaled parent data after a
    /// restart. Entries missing a configuration name are skipped with a
    /// warning rather than aborting the whole restore.
    pub async fn restore(&self, entries: Vec<RestoreEntry>) {
        for entry in entries {
            if entry.configuration_name.is_none() {
                warn!(
                    subagent_id = %entry.subagent_id,
                    "skipping subagent restoration: missing configuration"
                );
                continue;
            }
            self.insert(SubagentInstance {
                subagent_id: entry.subagent_id,
                description: entry.description,
                session_id: entry.session_id,
                status: SubagentStatus::Completed,
                last_tools: Vec::new(),
                abort: AbortHandle::new(),
            })
            .await;
        }
    }
}

impl Default for SubagentSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// The `task` tool: spawns a child [`AIManager`] against an isolated
/// session, drives it to completion, and returns its final assistant text.
/// The child inherits the parent's model, permission mode, and hooks, but
/// gets a tool registry with `task` itself removed so nesting is bounded by
/// `depth` rather than by tool availability alone.
pub struct TaskTool {
    model: Arc<dyn ModelProvider>,
    store: SessionStore,
    config: Arc<AgentConfig>,
    permissions: Arc<PermissionManager>,
    hooks: Arc<HookManager>,
    supervisor: Arc<SubagentSupervisor>,
    foreground: Arc<Mutex<ForegroundTaskStack>>,
    depth: u32,
}

impl TaskTool {
    pub fn new(
        model: Arc<dyn ModelProvider>,
        store: SessionStore,
        config: Arc<AgentConfig>,
        permissions: Arc<PermissionManager>,
        hooks: Arc<HookManager>,
        supervisor: Arc<SubagentSupervisor>,
        foreground: Arc<Mutex<ForegroundTaskStack>>,
        depth: u32,
    ) -> Self {
        Self {
            model,
            store,
            config,
            permissions,
            hooks,
            supervisor,
            foreground,
            depth,
        }
    }

    fn sub_registry() -> ToolRegistry {
        let mut reg = wave_tools::default_registry();
        reg.unregister("task");
        reg
    }
}

#[async_trait]
impl Tool for TaskTool {
    fn name(&self) -> &str {
        "task"
    }

    fn description(&self) -> &str {
        "Spawn a subagent to complete a focused task and return its final text output. The \
         subagent has access to the standard file, search, and shell tools but cannot itself \
         spawn further subagents beyond the configured nesting depth."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "The task description for the subagent"
                },
                "mode": {
                    "type": "string",
                    "enum": ["default", "plan"],
                    "description": "Operating mode for the subagent (default: default)"
                }
            },
            "required": ["prompt"]
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Ask
    }

    fn modes(&self) -> &[AgentMode] {
        &[AgentMode::Default, AgentMode::AcceptEdits]
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let prompt = match call.args.get("prompt").and_then(Value::as_str) {
            Some(p) => p.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'prompt'"),
        };
        if self.depth >= MAX_DEPTH {
            return ToolOutput::err(&call.id, format!("maximum subagent depth ({MAX_DEPTH}) reached"));
        }
        let mode = match call.args.get("mode").and_then(Value::as_str).unwrap_or("default") {
            "default" => AgentMode::Default,
            "plan" => AgentMode::Plan,
            other => return ToolOutput::err(&call.id, format!("unknown mode: {other}")),
        };

        let subagent_id = self.supervisor.allocate_id();
        let session = match self.store.create_session(format!("subagent:{subagent_id}")) {
            Ok(s) => s,
            Err(e) => return ToolOutput::err(&call.id, format!("failed to create subagent session: {e}")),
        };
        let session_id = session.id.clone();
        let abort = AbortHandle::new();
        self.supervisor
            .insert(SubagentInstance {
                subagent_id: subagent_id.clone(),
                description: prompt.clone(),
                session_id: session_id.clone(),
                status: SubagentStatus::Initializing,
                last_tools: Vec::new(),
                abort: abort.clone(),
            })
            .await;

        let messages = MessageManager::new(self.store.clone(), session, format!("subagent:{subagent_id}"));
        let tools = ToolManager::new(Arc::new(Self::sub_registry()));
        let mut agent = AIManager::new(
            messages,
            tools,
            self.permissions.clone(),
            self.hooks.clone(),
            self.config.clone(),
            mode,
        );

        self.supervisor.set_status(&subagent_id, SubagentStatus::Active).await;
        self.foreground.lock().await.push(subagent_id.clone(), prompt.clone());

        let added = agent.submit_user_message(&prompt, Some(subagent_id.clone())).await;
        if !added {
            self.foreground.lock().await.pop();
            self.supervisor.set_status(&subagent_id, SubagentStatus::Error).await;
            self.supervisor.remove(&subagent_id).await;
            return ToolOutput::err(&call.id, "subagent prompt blocked by hook");
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let opts = TurnOptions {
            recursion_depth: self.depth + 1,
            allowed_rules: Vec::new(),
            subagent_id: Some(subagent_id.clone()),
        };
        let result = agent
            .run_turn(self.model.as_ref(), &AgentRuntimeContext::default(), &tx, &abort, opts)
            .await;
        self.foreground.lock().await.pop();

        let mut output = String::new();
        let mut errored = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                AgentEvent::TextComplete(text) => output.push_str(&text),
                AgentEvent::ToolCallFinished { tool_name, .. } => {
                    self.supervisor.record_tool(&subagent_id, &tool_name).await;
                }
                AgentEvent::Error(_) => errored = true,
                AgentEvent::Aborted { .. } => {
                    self.supervisor.set_status(&subagent_id, SubagentStatus::Aborted).await;
                    errored = true;
                }
                _ => {}
            }
        }

        let final_status = match (&result, errored) {
            (Err(_), _) => SubagentStatus::Error,
            (Ok(_), true) => SubagentStatus::Error,
            (Ok(_), false) => SubagentStatus::Completed,
        };
        self.supervisor.set_status(&subagent_id, final_status).await;
        self.supervisor.remove(&subagent_id).await;

        match result {
            Ok(()) if !errored => {
                if output.is_empty() {
                    ToolOutput::ok(&call.id, "(subagent produced no text output)")
                } else {
                    ToolOutput::ok(&call.id, output)
                }
            }
            Ok(()) => {
                let msg = if output.is_empty() { "subagent reported an error".to_string() } else { output };
                ToolOutput::err(&call.id, msg)
            }
            Err(e) => ToolOutput::err(&call.id, format!("subagent error: {e}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
