// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Converts between the journal-facing message model ([`wave_session`]) and
//! the provider-wire message model ([`wave_model`]).
//!
//! A journal [`wave_session::Message`] can expand into zero, one, or several
//! wire messages: an assistant turn that called three tools becomes one
//! assistant text message plus three assistant tool-call messages, each
//! followed eventually by its own tool-role result message. Annotation-only
//! blocks (`Reasoning`, `Error`, `Info`, `Subagent`, `FileHistory`) never
//! reach the wire; they exist for the transcript and reversion bookkeeping
//! only, the same way the model's own reasoning stream is never re-submitted
//! as conversation history.

use wave_model::{FunctionCall, Message as WireMessage, MessageContent, Role as WireRole};
use wave_session::model::{Block, Message as JournalMessage, Role as JournalRole};

/// Expand one journal message into the wire messages it corresponds to.
pub fn journal_to_wire(message: &JournalMessage) -> Vec<WireMessage> {
    match message.role {
        JournalRole::System => {
            let text = join_text_blocks(&message.blocks);
            if text.is_empty() {
                Vec::new()
            } else {
                vec![WireMessage::system(text)]
            }
        }
        JournalRole::User => {
            let text = join_text_blocks(&message.blocks);
            if text.is_empty() {
                Vec::new()
            } else {
                vec![WireMessage::user(text)]
            }
        }
        JournalRole::Assistant => assistant_blocks_to_wire(&message.blocks),
    }
}

/// Expand a whole journal thread into the wire messages sent to the model,
/// in order.
pub fn thread_to_wire(messages: &[JournalMessage]) -> Vec<WireMessage> {
    messages.iter().flat_map(journal_to_wire).collect()
}

fn assistant_blocks_to_wire(blocks: &[Block]) -> Vec<WireMessage> {
    let mut out = Vec::new();
    let mut text_parts = Vec::new();

    for block in blocks {
        match block {
            Block::Text { text } => text_parts.push(text.as_str()),
            Block::Compress { summary, .. } => {
                text_parts.push("[Context summary]");
                text_parts.push(summary.as_str());
            }
            _ => {}
        }
    }
    if !text_parts.is_empty() {
        out.push(WireMessage::assistant(text_parts.join("\n")));
    }

    for block in blocks {
        if let Block::ToolCall { call_id, name, args } = block {
            out.push(WireMessage {
                role: WireRole::Assistant,
                content: MessageContent::ToolCall {
                    tool_call_id: call_id.clone(),
                    function: FunctionCall {
                        name: name.clone(),
                        arguments: args.to_string(),
                    },
                },
            });
        }
    }

    for block in blocks {
        if let Block::ToolResult { call_id, content, .. } = block {
            out.push(WireMessage::tool_result(call_id.clone(), content.clone()));
        }
    }

    out
}

fn join_text_blocks(blocks: &[Block]) -> String {
    blocks
        .iter()
        .filter_map(|b| match b {
            Block::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn system_message_becomes_single_wire_message() {
        let m = JournalMessage::text("s1", JournalRole::System, "be helpful");
        let wire = journal_to_wire(&m);
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0].as_text(), Some("be helpful"));
    }

    #[test]
    fn user_message_becomes_single_wire_message() {
        let m = JournalMessage::text("s1", JournalRole::User, "hello");
        let wire = journal_to_wire(&m);
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0].role, WireRole::User);
    }

    #[test]
    fn assistant_text_and_tool_call_expand_to_multiple_wire_messages() {
        let m = JournalMessage::new(
            "s1",
            JournalRole::Assistant,
            vec![
                Block::Text { text: "let me check".into() },
                Block::ToolCall {
                    call_id: "c1".into(),
                    name: "bash".into(),
                    args: json!({"command": "ls"}),
                },
                Block::ToolResult {
                    call_id: "c1".into(),
                    content: "file.txt".into(),
                    is_error: false,
                },
            ],
        );
        let wire = journal_to_wire(&m);
        assert_eq!(wire.len(), 3);
        assert_eq!(wire[0].as_text(), Some("let me check"));
        match &wire[1].content {
            MessageContent::ToolCall { tool_call_id, function } => {
                assert_eq!(tool_call_id, "c1");
                assert_eq!(function.name, "bash");
            }
            _ => panic!("expected tool call"),
        }
        assert_eq!(wire[2].role, WireRole::Tool);
    }

    #[test]
    fn reasoning_and_info_blocks_are_dropped() {
        let m = JournalMessage::new(
            "s1",
            JournalRole::Assistant,
            vec![
                Block::Reasoning { text: "thinking...".into() },
                Block::Info { message: "note".into() },
                Block::Text { text: "done".into() },
            ],
        );
        let wire = journal_to_wire(&m);
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0].as_text(), Some("done"));
    }

    #[test]
    fn compress_block_renders_as_summary_notice() {
        let m = JournalMessage::new(
            "s1",
            JournalRole::Assistant,
            vec![Block::Compress {
                summary: "earlier work summarized".into(),
                replaced_message_ids: vec!["m0".into()],
            }],
        );
        let wire = journal_to_wire(&m);
        assert_eq!(wire.len(), 1);
        let text = wire[0].as_text().unwrap();
        assert!(text.contains("[Context summary]"));
        assert!(text.contains("earlier work summarized"));
    }

    #[test]
    fn empty_assistant_message_produces_no_wire_messages() {
        let m = JournalMessage::new("s1", JournalRole::Assistant, vec![]);
        assert!(journal_to_wire(&m).is_empty());
    }

    #[test]
    fn thread_to_wire_preserves_order_across_messages() {
        let messages = vec![
            JournalMessage::text("s1", JournalRole::System, "sys"),
            JournalMessage::text("s1", JournalRole::User, "hi"),
            JournalMessage::text("s1", JournalRole::Assistant, "hello"),
        ];
        let wire = thread_to_wire(&messages);
        assert_eq!(wire.len(), 3);
        assert_eq!(wire[0].role, WireRole::System);
        assert_eq!(wire[1].role, WireRole::User);
        assert_eq!(wire[2].role, WireRole::Assistant);
    }
}
