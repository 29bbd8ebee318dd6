// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! In-memory conversation state for one agent instance, bridging the
//! journal ([`wave_session`]) to the turn loop. Extends simple in-memory
//! token tracking into a structure that also owns the session-fork
//! lifecycle, since this engine's history is durable.

use std::collections::HashSet;

use serde_json::Value;
use tokio::sync::mpsc;

use wave_session::model::{Block, Message, Role, Session};
use wave_session::SessionStore;

/// Event fired by a [`MessageManager`] mutation. Collapses the callback
/// fan-out table (`onXAdded` + `onSubagentXAdded`) into one enum per
/// mutation kind, carrying `subagent_id` rather than dispatching to two
/// separate callbacks — a subscriber that only cares about the top-level
/// conversation filters on `subagent_id.is_none()`, while a subagent's own
/// supervisor filters on a matching id.
#[derive(Debug, Clone)]
pub enum MessageManagerEvent {
    UserMessageAdded {
        message: Message,
        subagent_id: Option<String>,
    },
    AssistantMessageAdded {
        message: Message,
        subagent_id: Option<String>,
    },
    AssistantContentUpdated {
        chunk: String,
        accumulated: String,
        subagent_id: Option<String>,
    },
    AssistantReasoningUpdated {
        chunk: String,
        accumulated: String,
        subagent_id: Option<String>,
    },
    ToolBlockUpdated {
        message_id: String,
        call_id: String,
        subagent_id: Option<String>,
    },
    MessagesChanged,
}

/// Patch applied to an existing tool call's result by [`MessageManager::update_tool_block`].
#[derive(Debug, Clone, Default)]
pub struct ToolBlockPatch {
    pub content: Option<String>,
    pub is_error: Option<bool>,
}

const FILE_PATH_KEYS: [&str; 3] = ["file_path", "filePath", "target_file"];

pub struct MessageManager {
    store: SessionStore,
    session: Session,
    workdir: String,
    messages: Vec<Message>,
    /// Number of leading `messages` entries already flushed to the journal.
    messages_saved_count: usize,
    latest_total_tokens: usize,
    files_in_context: HashSet<String>,
    events: Option<mpsc::UnboundedSender<MessageManagerEvent>>,
}

impl MessageManager {
    pub fn new(store: SessionStore, session: Session, workdir: impl Into<String>) -> Self {
        Self {
            store,
            session,
            workdir: workdir.into(),
            messages: Vec::new(),
            messages_saved_count: 0,
            latest_total_tokens: 0,
            files_in_context: HashSet::new(),
            events: None,
        }
    }

    pub fn with_events(mut self, tx: mpsc::UnboundedSender<MessageManagerEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn workdir(&self) -> &str {
        &self.workdir
    }

    pub fn latest_total_tokens(&self) -> usize {
        self.latest_total_tokens
    }

    pub fn set_latest_total_tokens(&mut self, tokens: usize) {
        self.latest_total_tokens = tokens;
    }

    fn emit(&self, event: MessageManagerEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    // ── Mutations ─────────────────────────────────────────────────────────

    pub fn add_user_message(&mut self, text: impl Into<String>, subagent_id: Option<String>) -> &Message {
        let message = Message::text(self.session.id.clone(), Role::User, text);
        self.messages.push(message.clone());
        self.emit(MessageManagerEvent::UserMessageAdded {
            message,
            subagent_id,
        });
        self.emit(MessageManagerEvent::MessagesChanged);
        self.messages.last().expect("just pushed")
    }

    pub fn add_assistant_message(
        &mut self,
        content: Option<String>,
        tool_calls: Option<Vec<wave_tools::ToolCall>>,
        subagent_id: Option<String>,
    ) -> &Message {
        let mut blocks = Vec::new();
        if let Some(text) = content {
            blocks.push(Block::Text { text });
        }
        for call in tool_calls.into_iter().flatten() {
            blocks.push(Block::ToolCall {
                call_id: call.id,
                name: call.name,
                args: call.args,
            });
        }
        let message = Message::new(self.session.id.clone(), Role::Assistant, blocks);
        self.messages.push(message.clone());
        self.emit(MessageManagerEvent::AssistantMessageAdded {
            message,
            subagent_id,
        });
        self.emit(MessageManagerEvent::MessagesChanged);
        self.messages.last().expect("just pushed")
    }

    /// Streams incremental assistant text into the last message's text
    /// block, creating it on first call. No-op if the last message isn't an
    /// assistant message (or there is none yet).
    pub fn update_current_message_content(&mut self, accumulated: &str, subagent_id: Option<String>) {
        let Some(last) = self.messages.last_mut() else {
            return;
        };
        if last.role != Role::Assistant {
            return;
        }
        let old = last
            .blocks
            .iter()
            .find_map(|b| match b {
                Block::Text { text } => Some(text.clone()),
                _ => None,
            })
            .unwrap_or_default();
        let chunk = accumulated
            .strip_prefix(old.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| accumulated.to_string());

        if let Some(Block::Text { text }) = last.blocks.iter_mut().find(|b| matches!(b, Block::Text { .. })) {
            *text = accumulated.to_string();
        } else {
            last.blocks.push(Block::Text {
                text: accumulated.to_string(),
            });
        }

        self.emit(MessageManagerEvent::AssistantContentUpdated {
            chunk,
            accumulated: accumulated.to_string(),
            subagent_id,
        });
        self.emit(MessageManagerEvent::MessagesChanged);
    }

    /// Streams incremental reasoning text, mirroring
    /// [`Self::update_current_message_content`] against the `Reasoning` block.
    pub fn update_current_message_reasoning(&mut self, accumulated: &str, subagent_id: Option<String>) {
        let Some(last) = self.messages.last_mut() else {
            return;
        };
        if last.role != Role::Assistant {
            return;
        }
        let old = last
            .blocks
            .iter()
            .find_map(|b| match b {
                Block::Reasoning { text } => Some(text.clone()),
                _ => None,
            })
            .unwrap_or_default();
        let chunk = accumulated
            .strip_prefix(old.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| accumulated.to_string());

        if let Some(Block::Reasoning { text }) =
            last.blocks.iter_mut().find(|b| matches!(b, Block::Reasoning { .. }))
        {
            *text = accumulated.to_string();
        } else {
            last.blocks.push(Block::Reasoning {
                text: accumulated.to_string(),
            });
        }

        self.emit(MessageManagerEvent::AssistantReasoningUpdated {
            chunk,
            accumulated: accumulated.to_string(),
            subagent_id,
        });
    }

    /// Appends an error block to the last assistant-shaped turn, or as a new
    /// message if the conversation is empty or the last message isn't the
    /// assistant's (e.g. a model call that failed before any content arrived).
    pub fn add_error_block(&mut self, message_text: impl Into<String>) {
        let text = message_text.into();
        match self.messages.last_mut() {
            Some(m) if m.role == Role::Assistant => m.blocks.push(Block::Error { message: text }),
            _ => {
                let m = Message::new(
                    self.session.id.clone(),
                    Role::Assistant,
                    vec![Block::Error { message: text }],
                );
                self.messages.push(m);
            }
        }
        self.emit(MessageManagerEvent::MessagesChanged);
    }

    /// Locates the block for `call_id` — an existing `ToolResult` (merged
    /// in place) or the `ToolCall` it belongs to (a new `ToolResult` block is
    /// appended to that message) — searching assistant messages latest first.
    /// Returns `false` if no block named `call_id` exists anywhere.
    pub fn update_tool_block(
        &mut self,
        call_id: &str,
        patch: ToolBlockPatch,
        subagent_id: Option<String>,
    ) -> bool {
        for message in self.messages.iter_mut().rev() {
            if message.role != Role::Assistant {
                continue;
            }
            if let Some(Block::ToolResult { content, is_error, .. }) =
                message.blocks.iter_mut().find(
                    |b| matches!(b, Block::ToolResult { call_id: c, .. } if c == call_id),
                )
            {
                if let Some(new_content) = patch.content {
                    *content = new_content;
                }
                if let Some(new_is_error) = patch.is_error {
                    *is_error = new_is_error;
                }
                self.emit(MessageManagerEvent::ToolBlockUpdated {
                    message_id: message.id.clone(),
                    call_id: call_id.to_string(),
                    subagent_id,
                });
                return true;
            }
            let has_call = message.blocks.iter().any(
                |b| matches!(b, Block::ToolCall { call_id: c, .. } if c == call_id),
            );
            if has_call {
                message.blocks.push(Block::ToolResult {
                    call_id: call_id.to_string(),
                    content: patch.content.unwrap_or_default(),
                    is_error: patch.is_error.unwrap_or(false),
                });
                self.emit(MessageManagerEvent::ToolBlockUpdated {
                    message_id: message.id.clone(),
                    call_id: call_id.to_string(),
                    subagent_id,
                });
                return true;
            }
        }
        false
    }

    /// Appends tool-call blocks to the current assistant message (creating
    /// an empty one first if the turn produced no text), for the streaming
    /// case where tool calls are only known once the response finishes.
    pub fn append_tool_calls(&mut self, calls: Vec<wave_tools::ToolCall>, subagent_id: Option<String>) -> &Message {
        if calls.is_empty() {
            return self.messages.last().expect("caller ensures a message exists");
        }
        if !matches!(self.messages.last(), Some(m) if m.role == Role::Assistant) {
            self.messages.push(Message::new(self.session.id.clone(), Role::Assistant, Vec::new()));
        }
        let last = self.messages.last_mut().expect("assistant message present");
        for call in calls {
            last.blocks.push(Block::ToolCall {
                call_id: call.id,
                name: call.name,
                args: call.args,
            });
        }
        self.emit(MessageManagerEvent::MessagesChanged);
        self.messages.last().expect("assistant message present")
    }

    // ── Files in context ─────────────────────────────────────────────────

    pub fn set_files_in_context(&mut self, paths: impl IntoIterator<Item = String>) {
        self.files_in_context = paths.into_iter().collect();
    }

    pub fn get_files_in_context(&self) -> &HashSet<String> {
        &self.files_in_context
    }

    /// Records every recognized file-path argument of a tool call as
    /// in-context, for system-prompt reminders and reversion bookkeeping.
    pub fn note_files_from_tool_args(&mut self, args: &Value) {
        for path in extract_file_paths(args) {
            self.files_in_context.insert(path);
        }
    }

    // ── Persistence ───────────────────────────────────────────────────────

    /// Appends only the messages added since the last call (or construction)
    /// to the journal.
    pub fn save_session(&mut self) -> anyhow::Result<()> {
        let pending = &self.messages[self.messages_saved_count..];
        if !pending.is_empty() {
            self.store.append_messages(&self.session, pending)?;
        }
        self.messages_saved_count = self.messages.len();
        Ok(())
    }

    /// Replays the full fork chain ending at `session_id`, root segment
    /// first, pairing each segment's [`Session`] record with its raw message
    /// list.
    fn full_thread_segments(&self) -> anyhow::Result<Vec<(Session, Vec<Message>)>> {
        let mut chain = Vec::new();
        let mut current = Some(self.session.id.clone());
        while let Some(id) = current {
            let (session, messages) = self.store.load_session(&id)?;
            current = session.parent_session_id.clone();
            chain.push((session, messages));
        }
        chain.reverse();
        Ok(chain)
    }

    /// The thread as the model/UI should see it: every segment's messages in
    /// order, with each non-root segment's leading `compress` block dropped
    /// (it stays in the on-disk per-session array returned by
    /// [`wave_session::SessionStore::load_full_thread`], just not here).
    pub fn visible_thread(&self) -> anyhow::Result<Vec<Message>> {
        let segments = self.full_thread_segments()?;
        let mut out = Vec::new();
        for (i, (_, messages)) in segments.iter().enumerate() {
            let skip = if i > 0 && is_leading_compress(messages) { 1 } else { 0 };
            out.extend(messages.iter().skip(skip).cloned());
        }
        Ok(out)
    }

    /// Replaces the in-memory conversation with `[compress{summary}, <last 3
    /// messages>]` in a freshly forked session, preserving `root_session_id`.
    pub fn compress_messages_and_update_session(&mut self, summary: impl Into<String>) -> anyhow::Result<()> {
        let keep_from = self.messages.len().saturating_sub(3);
        let kept: Vec<Message> = self.messages[keep_from..].to_vec();
        let replaced_ids: Vec<String> = self.messages[..keep_from].iter().map(|m| m.id.clone()).collect();

        let new_session = self.store.fork_session(&self.session)?;

        let compress_message = Message::new(
            new_session.id.clone(),
            Role::Assistant,
            vec![Block::Compress {
                summary: summary.into(),
                replaced_message_ids: replaced_ids,
            }],
        );
        let mut rehomed: Vec<Message> = kept
            .into_iter()
            .map(|mut m| {
                m.session_id = new_session.id.clone();
                m
            })
            .collect();

        let mut new_messages = vec![compress_message];
        new_messages.append(&mut rehomed);

        self.store.append_messages(&new_session, &new_messages)?;

        self.session = new_session;
        self.messages = new_messages;
        self.messages_saved_count = self.messages.len();
        self.emit(MessageManagerEvent::MessagesChanged);
        Ok(())
    }

    /// Rewinds the conversation so that only the first `visible_index`
    /// visible-thread messages remain. If the cut lands exactly at a
    /// segment boundary the current session is simply repointed there;
    /// otherwise — since the journal is append-only — a fresh child session
    /// is forked from the containing segment and the truncated prefix is
    /// re-homed into it (the discarded suffix remains in the old file,
    /// orphaned but never rewritten, preserving invariant 6).
    pub fn truncate_history(&mut self, visible_index: usize) -> anyhow::Result<()> {
        let segments = self.full_thread_segments()?;
        let mut consumed = 0usize;

        for (i, (session, raw_messages)) in segments.iter().enumerate() {
            let skip = if i > 0 && is_leading_compress(raw_messages) { 1 } else { 0 };
            let visible_len = raw_messages.len() - skip;
            let is_last_segment = i == segments.len() - 1;

            if visible_index < consumed + visible_len || is_last_segment {
                let local_visible = (visible_index - consumed).min(visible_len);
                let raw_count = local_visible + skip;

                if raw_count == raw_messages.len() {
                    self.session = session.clone();
                    self.messages = raw_messages.clone();
                } else {
                    let fresh = self.store.fork_session(session)?;
                    let truncated: Vec<Message> = raw_messages[..raw_count]
                        .iter()
                        .cloned()
                        .map(|mut m| {
                            m.session_id = fresh.id.clone();
                            m
                        })
                        .collect();
                    if !truncated.is_empty() {
                        self.store.append_messages(&fresh, &truncated)?;
                    }
                    self.session = fresh;
                    self.messages = truncated;
                }
                self.messages_saved_count = self.messages.len();
                self.emit(MessageManagerEvent::MessagesChanged);
                return Ok(());
            }
            consumed += visible_len;
        }
        Ok(())
    }
}

fn is_leading_compress(messages: &[Message]) -> bool {
    matches!(messages.first().and_then(|m| m.blocks.first()), Some(Block::Compress { .. }))
}

fn extract_file_paths(args: &Value) -> Vec<String> {
    let mut out = Vec::new();
    if let Value::Object(map) = args {
        for key in FILE_PATH_KEYS {
            if let Some(s) = map.get(key).and_then(Value::as_str) {
                out.push(s.to_string());
            }
        }
        if let Some(Value::Array(files)) = map.get("files") {
            out.extend(files.iter().filter_map(Value::as_str).map(str::to_string));
        }
    }
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manager() -> (tempfile::TempDir, MessageManager) {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let session = store.create_session("/work").unwrap();
        (dir, MessageManager::new(store, session, "/work"))
    }

    #[test]
    fn add_user_message_appends_and_is_visible() {
        let (_dir, mut mgr) = manager();
        mgr.add_user_message("hello", None);
        assert_eq!(mgr.messages().len(), 1);
        assert_eq!(mgr.messages()[0].as_text().as_deref(), Some("hello"));
    }

    #[test]
    fn update_current_message_content_creates_text_block_once() {
        let (_dir, mut mgr) = manager();
        mgr.add_assistant_message(None, None, None);
        mgr.update_current_message_content("Hel", None);
        mgr.update_current_message_content("Hello", None);
        assert_eq!(mgr.messages()[0].as_text().as_deref(), Some("Hello"));
    }

    #[test]
    fn update_current_message_content_noop_without_assistant_message() {
        let (_dir, mut mgr) = manager();
        mgr.add_user_message("hi", None);
        mgr.update_current_message_content("ignored", None);
        assert_eq!(mgr.messages()[0].as_text().as_deref(), Some("hi"));
    }

    #[test]
    fn update_tool_block_appends_result_to_owning_message() {
        let (_dir, mut mgr) = manager();
        mgr.add_assistant_message(
            None,
            Some(vec![wave_tools::ToolCall {
                id: "c1".into(),
                name: "bash".into(),
                args: json!({"command": "ls"}),
            }]),
            None,
        );
        let found = mgr.update_tool_block(
            "c1",
            ToolBlockPatch {
                content: Some("file.txt".into()),
                is_error: Some(false),
            },
            None,
        );
        assert!(found);
        assert!(matches!(
            mgr.messages()[0].blocks[1],
            Block::ToolResult { ref content, .. } if content == "file.txt"
        ));
    }

    #[test]
    fn update_tool_block_missing_call_returns_false() {
        let (_dir, mut mgr) = manager();
        let found = mgr.update_tool_block("missing", ToolBlockPatch::default(), None);
        assert!(!found);
    }

    #[test]
    fn save_session_only_appends_unsaved_suffix() {
        let (_dir, mut mgr) = manager();
        mgr.add_user_message("one", None);
        mgr.save_session().unwrap();
        mgr.add_user_message("two", None);
        mgr.save_session().unwrap();

        let (_, persisted) = mgr.store.load_session(&mgr.session.id).unwrap();
        assert_eq!(persisted.len(), 2);
    }

    #[test]
    fn note_files_from_tool_args_recognizes_all_keys() {
        let (_dir, mut mgr) = manager();
        mgr.note_files_from_tool_args(&json!({"file_path": "a.rs"}));
        mgr.note_files_from_tool_args(&json!({"filePath": "b.rs"}));
        mgr.note_files_from_tool_args(&json!({"target_file": "c.rs"}));
        mgr.note_files_from_tool_args(&json!({"files": ["d.rs", "e.rs"]}));
        let files = mgr.get_files_in_context();
        for f in ["a.rs", "b.rs", "c.rs", "d.rs", "e.rs"] {
            assert!(files.contains(f), "missing {f}");
        }
    }

    #[test]
    fn compress_preserves_root_session_id_and_keeps_last_three() {
        let (_dir, mut mgr) = manager();
        let root_id = mgr.session().root_session_id.clone();
        for i in 0..5 {
            mgr.add_user_message(format!("msg{i}"), None);
        }
        mgr.save_session().unwrap();
        mgr.compress_messages_and_update_session("summary of early turns").unwrap();

        assert_eq!(mgr.session().root_session_id, root_id);
        assert_eq!(mgr.messages().len(), 4); // compress + last 3
        assert!(matches!(mgr.messages()[0].blocks[0], Block::Compress { .. }));
        assert_eq!(mgr.messages()[1].as_text().as_deref(), Some("msg2"));
        assert_eq!(mgr.messages()[3].as_text().as_deref(), Some("msg4"));
    }

    #[test]
    fn visible_thread_drops_leading_compress_of_child_segments() {
        let (_dir, mut mgr) = manager();
        for i in 0..5 {
            mgr.add_user_message(format!("msg{i}"), None);
        }
        mgr.save_session().unwrap();
        mgr.compress_messages_and_update_session("summary").unwrap();

        let visible = mgr.visible_thread().unwrap();
        // root segment (5 messages) + child segment minus its leading compress (3)
        assert_eq!(visible.len(), 8);
        assert!(visible.iter().all(|m| !matches!(m.blocks.first(), Some(Block::Compress { .. }))));
    }

    #[test]
    fn truncate_history_at_exact_boundary_keeps_same_session() {
        let (_dir, mut mgr) = manager();
        for i in 0..3 {
            mgr.add_user_message(format!("msg{i}"), None);
        }
        mgr.save_session().unwrap();
        let original_id = mgr.session().id.clone();

        mgr.truncate_history(3).unwrap();
        assert_eq!(mgr.session().id, original_id);
        assert_eq!(mgr.messages().len(), 3);
    }

    #[test]
    fn truncate_history_mid_session_forks_a_new_session() {
        let (_dir, mut mgr) = manager();
        for i in 0..5 {
            mgr.add_user_message(format!("msg{i}"), None);
        }
        mgr.save_session().unwrap();
        let original_id = mgr.session().id.clone();

        mgr.truncate_history(2).unwrap();
        assert_ne!(mgr.session().id, original_id);
        assert_eq!(mgr.messages().len(), 2);
        assert_eq!(mgr.messages()[1].as_text().as_deref(), Some("msg1"));
    }
}
