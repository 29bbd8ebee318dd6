// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod ai_manager;
mod bridge;
mod compaction;
mod events;
mod message_manager;
mod prompts;
mod runtime_context;
mod subagent;
mod tool_manager;

pub use ai_manager::{AIManager, AbortHandle, TurnOptions};
pub use bridge::{journal_to_wire, thread_to_wire};
pub use compaction::{compaction_prompt, emergency_summary, smart_truncate};
pub use events::{AgentEvent, CompactionStrategyUsed};
pub use message_manager::{MessageManager, MessageManagerEvent, ToolBlockPatch};
pub use prompts::system_prompt;
pub use runtime_context::AgentRuntimeContext;
pub use subagent::{RestoreEntry, SubagentInstance, SubagentStatus, SubagentSupervisor, TaskTool};
pub use tool_manager::ToolManager;
