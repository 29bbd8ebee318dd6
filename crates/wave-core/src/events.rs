// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use wave_tools::ToolCall;

/// Strategy actually used by a compaction pass, surfaced to the UI so it can
/// explain why a turn suddenly got slower (emergency compaction runs
/// synchronously on the hot path, the other two run ahead of it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionStrategyUsed {
    /// Model-authored structured summary, the normal path.
    Structured,
    /// Narrative summary, used when the structured prompt itself overflows.
    Narrative,
    /// Mechanical head/tail truncation, used when even a summarization call
    /// would not fit in the remaining budget.
    Emergency,
}

/// One event emitted while a turn runs. Streamed to the UI layer; never
/// persisted directly (the journal stores the settled [`crate::bridge`]
/// representation instead).
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// Incremental assistant text.
    TextDelta(String),
    /// Assistant text segment finished (a full `Block::Text` is about to be
    /// appended to the journal).
    TextComplete(String),
    /// Incremental reasoning/thinking text.
    ThinkingDelta(String),
    /// Reasoning segment finished.
    ThinkingComplete(String),
    /// A tool call was accepted (permission check and hooks passed) and is
    /// about to execute.
    ToolCallStarted(ToolCall),
    /// A tool call finished, successfully or not.
    ToolCallFinished {
        call_id: String,
        tool_name: String,
        output: String,
        is_error: bool,
    },
    /// Context was compacted; tokens before/after are approximate counts
    /// from [`wave_session::Message::approx_tokens`].
    ContextCompacted {
        tokens_before: usize,
        tokens_after: usize,
        strategy: CompactionStrategyUsed,
    },
    /// Usage figures reported by the provider for one model call.
    TokenUsage {
        input: u32,
        output: u32,
        cache_read_total: u32,
        cache_write_total: u32,
        max_tokens: u32,
    },
    /// The turn finished normally.
    TurnComplete,
    /// The turn was aborted by the caller; `partial_text` is whatever
    /// assistant text had streamed before the abort landed.
    Aborted { partial_text: Option<String> },
    /// A non-fatal error surfaced mid-turn (a model call that failed after
    /// retries, a hook that errored, etc). Fatal errors are returned from
    /// [`crate::ai_manager::AIManager::run_turn`] as a `Result::Err` instead.
    Error(String),
}
