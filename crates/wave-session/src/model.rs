// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Who produced a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single content unit inside a [`Message`].
///
/// Tagged on the wire by `type` so the journal stays forward-readable as
/// new block kinds are added — an older reader skips blocks it doesn't
/// recognize instead of failing to parse the whole message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    /// Plain assistant/user-visible text.
    Text { text: String },
    /// Model "thinking" content, kept separate from `Text` so it can be
    /// hidden from a transcript view without losing it from the journal.
    Reasoning { text: String },
    /// A tool invocation requested by the model.
    ToolCall {
        call_id: String,
        name: String,
        args: Value,
    },
    /// The result of executing a previously-recorded `ToolCall`. `call_id`
    /// always names a `ToolCall` block that appears earlier in the same
    /// session (invariant 3, see [`crate::store`]).
    ToolResult {
        call_id: String,
        content: String,
        is_error: bool,
    },
    /// Marks that the messages named by `replaced_message_ids` were folded
    /// into `summary` by compaction. All ids in `replaced_message_ids` must
    /// already have been appended before this block (invariant 5).
    Compress {
        summary: String,
        replaced_message_ids: Vec<String>,
    },
    /// An engine-level error surfaced to the transcript (e.g. a model call
    /// that failed after retries).
    Error { message: String },
    /// An engine-level informational note (e.g. "context compacted").
    Info { message: String },
    /// Marks that a subagent was spawned from this point in the
    /// conversation; `session_id` names the child session.
    Subagent {
        session_id: String,
        description: String,
    },
    /// Records that a tool call mutated a file, for `ReversionManager`
    /// snapshot lookup keyed by `<message_id>-<path>`.
    FileHistory { path: String, message_id: String },
}

/// One recorded turn in a session's journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub session_id: String,
    pub role: Role,
    pub timestamp: DateTime<Utc>,
    pub blocks: Vec<Block>,
}

impl Message {
    pub fn new(session_id: impl Into<String>, role: Role, blocks: Vec<Block>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            role,
            timestamp: Utc::now(),
            blocks,
        }
    }

    pub fn text(session_id: impl Into<String>, role: Role, text: impl Into<String>) -> Self {
        Self::new(session_id, role, vec![Block::Text { text: text.into() }])
    }

    /// Concatenation of all `Text` blocks — the same "always readable,
    /// backward-compatible" shape `wave-tools::ToolOutput::content` gives
    /// tool output.
    pub fn as_text(&self) -> Option<String> {
        let joined: String = self
            .blocks
            .iter()
            .filter_map(|b| match b {
                Block::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        if joined.is_empty() {
            None
        } else {
            Some(joined)
        }
    }

    /// Rough token estimate (chars / 4); `wave-core` applies a calibration
    /// factor on top of this using real provider usage figures.
    pub fn approx_tokens(&self) -> usize {
        self.blocks
            .iter()
            .map(|b| match b {
                Block::Text { text } | Block::Reasoning { text } => text.len(),
                Block::ToolCall { args, .. } => args.to_string().len(),
                Block::ToolResult { content, .. } => content.len(),
                Block::Compress { summary, .. } => summary.len(),
                Block::Error { message } | Block::Info { message } => message.len(),
                Block::Subagent { description, .. } => description.len(),
                Block::FileHistory { path, .. } => path.len(),
            })
            .sum::<usize>()
            / 4
    }
}

/// Session metadata — the record that identifies a journal file and its
/// place in a fork/compaction chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    /// The session this one was forked from, if any.
    pub parent_session_id: Option<String>,
    /// The original ancestor of the whole fork chain. Equal to `id` for a
    /// root session (invariant 4).
    pub root_session_id: String,
    pub created_at: DateTime<Utc>,
    pub cwd: String,
}

impl Session {
    pub fn new_root(cwd: impl Into<String>) -> Self {
        let id = Uuid::new_v4().to_string();
        Self {
            root_session_id: id.clone(),
            id,
            parent_session_id: None,
            created_at: Utc::now(),
            cwd: cwd.into(),
        }
    }

    pub fn fork(parent: &Session) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            parent_session_id: Some(parent.id.clone()),
            root_session_id: parent.root_session_id.clone(),
            created_at: Utc::now(),
            cwd: parent.cwd.clone(),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_session_is_its_own_root() {
        let s = Session::new_root("/tmp");
        assert_eq!(s.root_session_id, s.id);
        assert!(s.parent_session_id.is_none());
    }

    #[test]
    fn fork_preserves_root_session_id() {
        let root = Session::new_root("/tmp");
        let child = Session::fork(&root);
        assert_eq!(child.root_session_id, root.root_session_id);
        assert_eq!(child.parent_session_id.as_deref(), Some(root.id.as_str()));
    }

    #[test]
    fn fork_of_fork_still_shares_root() {
        let root = Session::new_root("/tmp");
        let child = Session::fork(&root);
        let grandchild = Session::fork(&child);
        assert_eq!(grandchild.root_session_id, root.root_session_id);
        assert_ne!(grandchild.id, child.id);
    }

    #[test]
    fn message_as_text_joins_text_blocks_only() {
        let m = Message::new(
            "s1",
            Role::Assistant,
            vec![
                Block::Text {
                    text: "hello".into(),
                },
                Block::Reasoning {
                    text: "thinking".into(),
                },
                Block::Text {
                    text: "world".into(),
                },
            ],
        );
        assert_eq!(m.as_text().as_deref(), Some("hello\nworld"));
    }

    #[test]
    fn message_as_text_none_when_no_text_blocks() {
        let m = Message::new(
            "s1",
            Role::Assistant,
            vec![Block::Info {
                message: "note".into(),
            }],
        );
        assert!(m.as_text().is_none());
    }

    #[test]
    fn approx_tokens_scales_with_content_length() {
        let short = Message::text("s1", Role::User, "1234");
        let long = Message::text("s1", Role::User, "12345678");
        assert!(long.approx_tokens() > short.approx_tokens());
    }

    #[test]
    fn block_round_trips_through_json_with_type_tag() {
        let block = Block::ToolCall {
            call_id: "c1".into(),
            name: "bash".into(),
            args: serde_json::json!({"command": "ls"}),
        };
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "tool_call");
        let back: Block = serde_json::from_value(json).unwrap();
        matches!(back, Block::ToolCall { .. });
    }
}
