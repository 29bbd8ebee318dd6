// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The turn loop: wires [`MessageManager`], [`ToolManager`], the permission
//! pipeline, and the hook pipeline together around one model call per round,
//! mirroring the shape of a conventional agent driver but with tool calls
//! executed serially (never `tokio::spawn`-parallel) so the hook and
//! permission pipeline sees a strict, reproducible ordering of side effects.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use wave_config::AgentConfig;
use wave_hooks::{HookManager, HookOutcome};
use wave_model::{CompletionRequest, Message as WireMessage, ModelProvider, ResponseEvent};
use wave_permissions::{PermissionManager, Rule};
use wave_tools::ToolCall;

use crate::bridge;
use crate::compaction;
use crate::events::{AgentEvent, CompactionStrategyUsed};
use crate::message_manager::{MessageManager, ToolBlockPatch};
use crate::prompts;
use crate::runtime_context::AgentRuntimeContext;
use crate::tool_manager::ToolManager;

const FILE_PATH_KEYS: [&str; 3] = ["file_path", "filePath", "target_file"];

/// Cooperative abort signal. No provider stream in this codebase exposes a
/// true mid-request cancellation token, so aborting only takes effect at the
/// checkpoints `AIManager::run_turn` polls between streamed events and
/// between tool calls — a turn that is deep inside one long model response
/// finishes that response before noticing the flag.
#[derive(Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-turn options threaded through `run_turn` and its internal rounds.
#[derive(Default)]
pub struct TurnOptions {
    /// Nesting depth of this call: 0 for the top-level conversation, >0 for
    /// a subagent invocation. Only depth 0 installs/clears `allowed_rules`.
    pub recursion_depth: u32,
    /// Extra permission rules scoped to this call's lifetime, installed into
    /// `PermissionManager` at depth 0 and cleared on every exit path.
    pub allowed_rules: Vec<Rule>,
    /// Set when this turn belongs to a subagent, so message-manager events
    /// and hook invocations (`SubagentStop` instead of `Stop`) can be routed
    /// correctly by the caller.
    pub subagent_id: Option<String>,
}

/// Drives one conversation (top-level or subagent) through repeated
/// model/tool rounds. Holds no conversation state of its own beyond what
/// `MessageManager` already owns; everything here is plumbing.
pub struct AIManager {
    messages: MessageManager,
    tools: ToolManager,
    permissions: Arc<PermissionManager>,
    hooks: Arc<HookManager>,
    config: Arc<AgentConfig>,
    mode: wave_config::AgentMode,
}

impl AIManager {
    pub fn new(
        messages: MessageManager,
        tools: ToolManager,
        permissions: Arc<PermissionManager>,
        hooks: Arc<HookManager>,
        config: Arc<AgentConfig>,
        mode: wave_config::AgentMode,
    ) -> Self {
        Self {
            messages,
            tools,
            permissions,
            hooks,
            config,
            mode,
        }
    }

    pub fn messages(&self) -> &MessageManager {
        &self.messages
    }

    pub fn messages_mut(&mut self) -> &mut MessageManager {
        &mut self.messages
    }

    pub fn set_mode(&mut self, mode: wave_config::AgentMode) {
        self.mode = mode;
        self.permissions.set_mode(mode);
    }

    /// Runs the `UserPromptSubmit` hook and, unless it blocks, appends the
    /// user's message to the conversation. Split out from `run_turn` so the
    /// hook always runs before the message exists rather than after, which
    /// resolves the ambiguity between "inject hook stdout as a new user
    /// message" (implies the user message already landed) and "remove the
    /// last user message on block" (implies nothing should be removed if it
    /// was never added): here, a blocked prompt is simply never added, and
    /// an advisory's stdout is appended as a second user message tagged by
    /// the caller via `subagent_id`.
    pub async fn submit_user_message(&mut self, text: &str, subagent_id: Option<String>) -> bool {
        match self.hooks.run("UserPromptSubmit", None, &json!({"prompt": text})).await {
            Ok(HookOutcome::Block { reason }) => {
                self.messages.add_error_block(format!("prompt blocked by hook: {reason}"));
                false
            }
            Ok(HookOutcome::Advise { message }) => {
                self.messages.add_user_message(text, subagent_id.clone());
                self.messages.add_user_message(message, subagent_id);
                true
            }
            Ok(HookOutcome::Proceed) => {
                self.messages.add_user_message(text, subagent_id);
                true
            }
            Err(e) => {
                warn!(error = %e, "UserPromptSubmit hook failed, proceeding without it");
                self.messages.add_user_message(text, subagent_id);
                true
            }
        }
    }

    /// Runs the `Notification` hook for an engine-level event (e.g. "turn
    /// idle for N seconds") and surfaces a non-`Proceed` outcome as an error
    /// block; never blocks the turn loop itself.
    pub async fn notify(&mut self, payload: Value) {
        match self.hooks.run("Notification", None, &payload).await {
            Ok(HookOutcome::Proceed) => {}
            Ok(HookOutcome::Block { reason }) | Ok(HookOutcome::Advise { message: reason }) => {
                self.messages.add_error_block(reason);
            }
            Err(e) => self.messages.add_error_block(format!("Notification hook failed: {e}")),
        }
    }

    /// Runs the turn loop to completion: repeated model/tool rounds until
    /// the model stops requesting tools, bounded by `max_tool_rounds`, then
    /// the `Stop`/`SubagentStop` hook, which may restart the whole thing
    /// (bounded by `stop_hook_restart_cap`). Emits [`AgentEvent`]s to
    /// `events` throughout; the caller is expected to have already appended
    /// the triggering user message via [`Self::submit_user_message`].
    pub async fn run_turn(
        &mut self,
        model: &dyn ModelProvider,
        runtime_ctx: &AgentRuntimeContext,
        events: &mpsc::UnboundedSender<AgentEvent>,
        abort: &AbortHandle,
        mut opts: TurnOptions,
    ) -> anyhow::Result<()> {
        let installed_temp_rules = opts.recursion_depth == 0 && !opts.allowed_rules.is_empty();
        if installed_temp_rules {
            self.permissions.install_temporary_rules(std::mem::take(&mut opts.allowed_rules));
        }

        let result = self.run_turn_inner(model, runtime_ctx, events, abort, &opts).await;

        if installed_temp_rules {
            self.permissions.clear_temporary_rules();
        }
        result
    }

    async fn run_turn_inner(
        &mut self,
        model: &dyn ModelProvider,
        runtime_ctx: &AgentRuntimeContext,
        events: &mpsc::UnboundedSender<AgentEvent>,
        abort: &AbortHandle,
        opts: &TurnOptions,
    ) -> anyhow::Result<()> {
        let mut restart_count = 0u32;
        loop {
            self.run_rounds(model, runtime_ctx, events, abort, opts).await?;

            if abort.is_aborted() {
                let partial = self.messages.messages().last().and_then(|m| m.as_text());
                let _ = events.send(AgentEvent::Aborted { partial_text: partial });
                break;
            }

            let stop_event = if opts.subagent_id.is_some() { "SubagentStop" } else { "Stop" };
            let outcome = self.hooks.run(stop_event, None, &json!({})).await;
            match outcome {
                Ok(HookOutcome::Proceed) => break,
                Ok(HookOutcome::Advise { message }) => {
                    self.messages.add_error_block(message);
                    break;
                }
                Ok(HookOutcome::Block { reason }) if restart_count < self.config.stop_hook_restart_cap => {
                    restart_count += 1;
                    debug!(restart_count, stop_event, "stop hook requested a restart");
                    self.messages.add_user_message(reason, opts.subagent_id.clone());
                }
                Ok(HookOutcome::Block { reason }) => {
                    self.messages.add_error_block(format!(
                        "{stop_event} hook kept blocking after {restart_count} restarts: {reason}"
                    ));
                    break;
                }
                Err(e) => {
                    self.messages.add_error_block(format!("{stop_event} hook failed: {e}"));
                    break;
                }
            }
        }

        self.messages.save_session()?;
        let _ = events.send(AgentEvent::TurnComplete);
        Ok(())
    }

    /// One pass through steps 2-9: build the prompt, compact if needed, call
    /// the model, stream its response, execute any requested tools serially,
    /// and repeat while the model keeps requesting tools.
    async fn run_rounds(
        &mut self,
        model: &dyn ModelProvider,
        runtime_ctx: &AgentRuntimeContext,
        events: &mpsc::UnboundedSender<AgentEvent>,
        abort: &AbortHandle,
        opts: &TurnOptions,
    ) -> anyhow::Result<()> {
        for _round in 0..self.config.max_tool_rounds {
            if abort.is_aborted() {
                return Ok(());
            }

            let system_prompt = prompts::system_prompt(self.mode, runtime_ctx);
            let mut wire_messages = self.build_wire_messages(&system_prompt)?;

            if self.estimate_total_tokens(&wire_messages) > self.compaction_trigger_tokens() {
                self.compact(model, events).await?;
                wire_messages = self.build_wire_messages(&system_prompt)?;
            }

            self.messages.save_session()?;

            let request = CompletionRequest {
                messages: wire_messages,
                tools: self.tools.wire_schemas_for_mode(self.mode),
                stream: true,
                system_dynamic_suffix: None,
                cache_key: Some(self.messages.session().id.clone()),
            };

            let (tool_calls, finish_reason) = self.stream_round(model, request, events, abort, opts).await?;

            if abort.is_aborted() {
                return Ok(());
            }

            if tool_calls.is_empty() {
                if finish_reason.as_deref() == Some("length") {
                    self.messages.add_error_block("response truncated: finish_reason=length");
                }
                return Ok(());
            }

            for call in tool_calls {
                self.run_one_tool(&call, events, opts).await;
                if abort.is_aborted() {
                    return Ok(());
                }
            }

            self.messages.save_session()?;
        }

        self.messages
            .add_error_block(format!("turn exceeded {} tool rounds", self.config.max_tool_rounds));
        Ok(())
    }

    fn build_wire_messages(&self, system_prompt: &str) -> anyhow::Result<Vec<WireMessage>> {
        let visible = self.messages.visible_thread()?;
        let mut out = vec![WireMessage::system(system_prompt)];
        out.extend(bridge::thread_to_wire(&visible));
        Ok(out)
    }

    fn compaction_trigger_tokens(&self) -> usize {
        let budget = self.config.input_token_limit as f32 * (1.0 - self.config.compaction_overhead_reserve);
        (budget * self.config.compaction_threshold) as usize
    }

    fn estimate_total_tokens(&self, wire_messages: &[WireMessage]) -> usize {
        if self.messages.latest_total_tokens() > 0 {
            return self.messages.latest_total_tokens();
        }
        wire_messages.iter().map(|m| m.approx_tokens()).sum::<usize>()
            + self.schema_overhead_tokens()
    }

    fn schema_overhead_tokens(&self) -> usize {
        self.tools
            .wire_schemas_for_mode(self.mode)
            .iter()
            .map(|s| (s.name.len() + s.description.len() + s.parameters.to_string().len()) / 4)
            .sum()
    }

    /// Summarizes everything but the last `compaction_keep_recent` visible
    /// messages and replaces them with a single compress block. Falls back
    /// to a mechanical [`compaction::emergency_summary`] if the
    /// summarization call itself fails or returns nothing, so compaction
    /// always succeeds even when the model call doesn't.
    async fn compact(
        &mut self,
        model: &dyn ModelProvider,
        events: &mpsc::UnboundedSender<AgentEvent>,
    ) -> anyhow::Result<()> {
        let tokens_before = self.messages.latest_total_tokens();
        let visible = self.messages.visible_thread()?;
        let keep_from = visible.len().saturating_sub(self.config.compaction_keep_recent);
        let older = &visible[..keep_from];

        let mut strategy_used = match self.config.compaction_strategy {
            wave_config::CompactionStrategy::Structured => CompactionStrategyUsed::Structured,
            wave_config::CompactionStrategy::Narrative => CompactionStrategyUsed::Narrative,
        };

        let prompt = compaction::compaction_prompt(older, &self.config.compaction_strategy);
        let summary = match self.summarize(model, &prompt).await {
            Ok(text) if !text.trim().is_empty() => text,
            _ => {
                strategy_used = CompactionStrategyUsed::Emergency;
                compaction::emergency_summary(older.len())
            }
        };

        self.messages.compress_messages_and_update_session(summary)?;
        let tokens_after = self.messages.messages().iter().map(|m| m.approx_tokens()).sum::<usize>();
        let _ = events.send(AgentEvent::ContextCompacted {
            tokens_before,
            tokens_after,
            strategy: strategy_used,
        });
        Ok(())
    }

    async fn summarize(&self, model: &dyn ModelProvider, prompt: &str) -> anyhow::Result<String> {
        let request = CompletionRequest {
            messages: vec![WireMessage::user(prompt)],
            tools: Vec::new(),
            stream: false,
            system_dynamic_suffix: None,
            cache_key: None,
        };
        let mut stream = model.complete(request).await?;
        let mut summary = String::new();
        while let Some(event) = stream.next().await {
            match event? {
                ResponseEvent::TextDelta(delta) => summary.push_str(&delta),
                ResponseEvent::Done => break,
                ResponseEvent::Error(msg) => return Err(anyhow::anyhow!(msg)),
                _ => {}
            }
        }
        Ok(summary)
    }

    /// Streams one model call to completion, feeding `MessageManager` and
    /// `events` as content/reasoning arrive, and returns the finalized tool
    /// calls (if any) plus the provider's reported finish reason.
    async fn stream_round(
        &mut self,
        model: &dyn ModelProvider,
        request: CompletionRequest,
        events: &mpsc::UnboundedSender<AgentEvent>,
        abort: &AbortHandle,
        opts: &TurnOptions,
    ) -> anyhow::Result<(Vec<ToolCall>, Option<String>)> {
        let mut stream = model.complete(request).await?;

        let mut text_accum = String::new();
        let mut reasoning_accum = String::new();
        let mut message_started = false;
        let mut pending: HashMap<u32, PendingToolCall> = HashMap::new();
        let mut finish_reason = None;

        while let Some(event) = stream.next().await {
            if abort.is_aborted() {
                break;
            }
            match event? {
                ResponseEvent::TextDelta(delta) => {
                    if !message_started {
                        self.messages.add_assistant_message(None, None, opts.subagent_id.clone());
                        message_started = true;
                    }
                    text_accum.push_str(&delta);
                    self.messages.update_current_message_content(&text_accum, opts.subagent_id.clone());
                    let _ = events.send(AgentEvent::TextDelta(delta));
                }
                ResponseEvent::ThinkingDelta(delta) => {
                    if !message_started {
                        self.messages.add_assistant_message(None, None, opts.subagent_id.clone());
                        message_started = true;
                    }
                    reasoning_accum.push_str(&delta);
                    self.messages
                        .update_current_message_reasoning(&reasoning_accum, opts.subagent_id.clone());
                    let _ = events.send(AgentEvent::ThinkingDelta(delta));
                }
                ResponseEvent::ToolCall { index, id, name, arguments } => {
                    let entry = pending.entry(index).or_insert_with(PendingToolCall::default);
                    if !id.is_empty() {
                        entry.id = id;
                    }
                    if !name.is_empty() {
                        entry.name = name;
                    }
                    entry.arguments.push_str(&arguments);
                }
                ResponseEvent::Usage { input_tokens, output_tokens, cache_read_tokens, cache_write_tokens } => {
                    let total = input_tokens as usize
                        + output_tokens as usize
                        + cache_read_tokens as usize
                        + cache_write_tokens as usize;
                    self.messages.set_latest_total_tokens(total);
                    let _ = events.send(AgentEvent::TokenUsage {
                        input: input_tokens,
                        output: output_tokens,
                        cache_read_total: cache_read_tokens,
                        cache_write_total: cache_write_tokens,
                        max_tokens: model.catalog_max_output_tokens().unwrap_or(0),
                    });
                }
                ResponseEvent::FinishReason(reason) => finish_reason = Some(reason),
                ResponseEvent::Done => break,
                ResponseEvent::Error(msg) => {
                    self.messages.add_error_block(format!("model error: {msg}"));
                    let _ = events.send(AgentEvent::Error(msg));
                    break;
                }
            }
        }

        if !text_accum.is_empty() {
            let _ = events.send(AgentEvent::TextComplete(text_accum));
        }
        if !reasoning_accum.is_empty() {
            let _ = events.send(AgentEvent::ThinkingComplete(reasoning_accum));
        }

        let mut ordered: Vec<(u32, PendingToolCall)> = pending.into_iter().collect();
        ordered.sort_by_key(|(idx, _)| *idx);
        let tool_calls: Vec<ToolCall> = ordered
            .into_iter()
            .filter(|(_, p)| !p.name.is_empty())
            .map(|(idx, p)| {
                let id = if p.id.is_empty() { format!("call_{idx}") } else { p.id };
                let args: Value = serde_json::from_str(&p.arguments).unwrap_or_else(|_| json!({}));
                ToolCall { id, name: p.name, args }
            })
            .collect();

        if !tool_calls.is_empty() {
            if !message_started {
                self.messages.add_assistant_message(None, None, opts.subagent_id.clone());
            }
            self.messages.append_tool_calls(tool_calls.clone(), opts.subagent_id.clone());
        }

        Ok((tool_calls, finish_reason))
    }

    /// Runs a single tool call through `PreToolUse` → permission check →
    /// dispatch → `PostToolUse`, recording its result on the journal and
    /// emitting `ToolCallStarted`/`ToolCallFinished`. Never returns an
    /// `Err`: every failure mode (hook block, permission denial, execution
    /// error) is recorded as a normal, visible tool result instead.
    async fn run_one_tool(&mut self, call: &ToolCall, events: &mpsc::UnboundedSender<AgentEvent>, opts: &TurnOptions) {
        let _ = events.send(AgentEvent::ToolCallStarted(call.clone()));
        self.messages.note_files_from_tool_args(&call.args);

        let pre = self
            .hooks
            .run("PreToolUse", Some(&call.name), &json!({"tool_name": call.name, "arguments": call.args}))
            .await;
        match pre {
            Ok(HookOutcome::Block { reason }) => {
                self.finish_tool(
                    call,
                    format!("blocked by PreToolUse hook: {reason}"),
                    true,
                    events,
                    opts.subagent_id.clone(),
                );
                return;
            }
            Ok(HookOutcome::Advise { message }) => self.messages.add_error_block(message),
            Ok(HookOutcome::Proceed) => {}
            Err(e) => self.messages.add_error_block(format!("PreToolUse hook failed: {e}")),
        }

        let default_policy = match self.tools.default_policy(&call.name) {
            Some(p) => p,
            None => {
                self.finish_tool(
                    call,
                    format!("unknown tool: {}", call.name),
                    true,
                    events,
                    opts.subagent_id.clone(),
                );
                return;
            }
        };
        let modes = self.tools.modes_for(&call.name);
        let touched = touched_path(&call.args);

        if let Err(e) = self.permissions.check(&call.name, &call.args, &modes, default_policy, touched.as_deref()) {
            self.finish_tool(call, format!("denied: {e}"), true, events, opts.subagent_id.clone());
            return;
        }

        let output = self.tools.execute(call).await;
        let category = self.tools.output_category(&call.name);
        let truncated = compaction::smart_truncate(&output.content, category, self.config.tool_result_token_cap);

        let post = self
            .hooks
            .run("PostToolUse", Some(&call.name), &json!({"tool_name": call.name, "result": truncated}))
            .await;
        match post {
            Ok(HookOutcome::Block { reason }) | Ok(HookOutcome::Advise { message: reason }) => {
                self.messages.add_user_message(reason, opts.subagent_id.clone());
            }
            Ok(HookOutcome::Proceed) => {}
            Err(e) => self.messages.add_error_block(format!("PostToolUse hook failed: {e}")),
        }

        self.finish_tool(call, truncated, output.is_error, events, opts.subagent_id.clone());
    }

    fn finish_tool(
        &mut self,
        call: &ToolCall,
        content: String,
        is_error: bool,
        events: &mpsc::UnboundedSender<AgentEvent>,
        subagent_id: Option<String>,
    ) {
        self.messages.update_tool_block(
            &call.id,
            ToolBlockPatch { content: Some(content.clone()), is_error: Some(is_error) },
            subagent_id,
        );
        let _ = events.send(AgentEvent::ToolCallFinished {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            output: content,
            is_error,
        });
    }
}

#[derive(Default)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

fn touched_path(args: &Value) -> Option<PathBuf> {
    let Value::Object(map) = args else {
        return None;
    };
    FILE_PATH_KEYS.iter().find_map(|key| map.get(*key).and_then(Value::as_str).map(PathBuf::from))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use wave_config::{AgentMode, ToolsConfig};
    use wave_model::ScriptedMockProvider;
    use wave_session::SessionStore;

    fn setup() -> (tempfile::TempDir, AIManager) {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let session = store.create_session(dir.path().to_string_lossy().to_string()).unwrap();
        let messages = MessageManager::new(store, session, dir.path().to_string_lossy().to_string());
        let tools = ToolManager::new(Arc::new(wave_tools::default_registry()));
        let permissions = Arc::new(PermissionManager::new(AgentMode::BypassPermissions, dir.path(), &ToolsConfig::default()));
        let hooks = Arc::new(HookManager::new(wave_config::HooksConfig::default()));
        let config = Arc::new(AgentConfig::default());
        let mgr = AIManager::new(messages, tools, permissions, hooks, config, AgentMode::BypassPermissions);
        (dir, mgr)
    }

    #[tokio::test]
    async fn submit_user_message_appends_when_no_hooks_registered() {
        let (_dir, mut mgr) = setup();
        let added = mgr.submit_user_message("hello", None).await;
        assert!(added);
        assert_eq!(mgr.messages().messages().len(), 1);
    }

    #[tokio::test]
    async fn run_turn_with_no_tool_calls_completes_in_one_round() {
        let (_dir, mut mgr) = setup();
        mgr.submit_user_message("hi", None).await;

        let provider = ScriptedMockProvider::always_text("hello back");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let abort = AbortHandle::new();
        mgr.run_turn(&provider, &AgentRuntimeContext::default(), &tx, &abort, TurnOptions::default())
            .await
            .unwrap();

        let mut saw_turn_complete = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, AgentEvent::TurnComplete) {
                saw_turn_complete = true;
            }
        }
        assert!(saw_turn_complete);
        assert!(mgr
            .messages()
            .messages()
            .iter()
            .any(|m| m.as_text().as_deref() == Some("hello back")));
    }

    #[tokio::test]
    async fn run_turn_executes_requested_tool_then_stops() {
        let (_dir, mut mgr) = setup();
        mgr.submit_user_message("list files", None).await;

        let provider = ScriptedMockProvider::tool_then_text("c1", "list_dir", "{\"path\": \".\"}", "done");
        let (tx, _rx) = mpsc::unbounded_channel();
        let abort = AbortHandle::new();
        mgr.run_turn(&provider, &AgentRuntimeContext::default(), &tx, &abort, TurnOptions::default())
            .await
            .unwrap();

        let found_result = mgr.messages().messages().iter().any(|m| {
            m.blocks.iter().any(|b| matches!(b, wave_session::model::Block::ToolResult { call_id, .. } if call_id == "c1"))
        });
        assert!(found_result);
    }

    #[tokio::test]
    async fn aborted_turn_emits_aborted_event() {
        let (_dir, mut mgr) = setup();
        mgr.submit_user_message("hi", None).await;
        let abort = AbortHandle::new();
        abort.abort();

        let provider = ScriptedMockProvider::new(vec![]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        mgr.run_turn(&provider, &AgentRuntimeContext::default(), &tx, &abort, TurnOptions::default())
            .await
            .unwrap();

        let mut saw_abort = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, AgentEvent::Aborted { .. }) {
                saw_abort = true;
            }
        }
        assert!(saw_abort);
    }

    #[test]
    fn touched_path_reads_file_path_key() {
        let path = touched_path(&json!({"file_path": "/a/b.rs"}));
        assert_eq!(path, Some(PathBuf::from("/a/b.rs")));
    }

    #[test]
    fn touched_path_none_without_recognized_key() {
        assert_eq!(touched_path(&json!({"command": "ls"})), None);
    }
}
