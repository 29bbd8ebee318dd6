// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! System prompt assembly, following a stable/dynamic split: sections that
//! never change across a session (identity, mode instructions) come first,
//! sections that vary with project state come after. No skills, subagent,
//! or knowledge-base sections — those are discovery features out of scope here.

use chrono::Local;

use crate::runtime_context::AgentRuntimeContext;
use wave_config::AgentMode;

fn mode_instructions(mode: AgentMode) -> &'static str {
    match mode {
        AgentMode::Plan => {
            "You are in planning mode. Analyse the request and produce a clear, structured \
             plan with numbered steps. You may read files to inform the plan, but MUST NOT \
             modify or create any file, and MUST NOT run any command with side effects."
        }
        AgentMode::Default | AgentMode::AcceptEdits | AgentMode::BypassPermissions => {
            "You are a capable coding agent. You can read and write files, run shell commands, \
             and search the codebase. Work systematically, verify your changes, and report \
             your progress clearly. Maximize parallel tool calls when the calls are independent."
        }
    }
}

/// Build the complete system prompt for `mode`. `ctx.system_prompt_override`,
/// when set, replaces the generated prompt outright (but `ctx.append` is
/// still honoured).
pub fn system_prompt(mode: AgentMode, ctx: &AgentRuntimeContext) -> String {
    if let Some(custom) = &ctx.system_prompt_override {
        return match &ctx.append_system_prompt {
            Some(extra) => format!("{}\n\n{extra}", custom.trim_end()),
            None => custom.clone(),
        };
    }

    let identity = format!(
        "You are an AI coding agent. Operating mode: `{mode}`. Current date and time: `{now}`.",
        now = Local::now().format("%Y-%m-%d %H:%M:%S"),
    );

    let project_section = ctx.project_root.as_deref().map(|root| {
        format!(
            "\n\n## Project\nProject root: `{}`. Prefer absolute paths in every tool call.",
            root.display()
        )
    });

    let additional_dirs_section = if ctx.additional_directories.is_empty() {
        None
    } else {
        let list = ctx
            .additional_directories
            .iter()
            .map(|p| format!("- `{}`", p.display()))
            .collect::<Vec<_>>()
            .join("\n");
        Some(format!(
            "\n\n## Additional Directories\nYou may also read and write files under these \
             directories, outside the project root:\n{list}"
        ))
    };

    let memory_section = build_memory_section(ctx);

    let language_section = ctx.language.as_deref().map(|lang| {
        format!(
            "\n\n## Language\nWrite prose responses in {lang}. Keep identifiers, file paths, \
             commands, and other technical terms in their original form — translate only the \
             surrounding explanation."
        )
    });

    let plan_section = plan_mode_reminder(mode, ctx.plan_file_path.as_deref());

    let git_section = ctx.git_context_note.as_deref().map(|s| format!("\n\n{s}"));
    let ci_section = ctx.ci_context_note.as_deref().map(|s| format!("\n\n{s}"));

    let append_section = ctx.append_system_prompt.as_deref().map(|s| format!("\n\n{s}"));

    let mut prompt = format!("{identity}\n\n{}", mode_instructions(mode));
    for section in [
        project_section,
        additional_dirs_section,
        memory_section,
        language_section,
        plan_section,
        git_section,
        ci_section,
        append_section,
    ]
    .into_iter()
    .flatten()
    {
        prompt.push_str(&section);
    }
    prompt
}

/// Combined memory section: project-level context file first, then any
/// user-level/dynamic notes the caller folded into `append_system_prompt`
/// upstream of this function — this function only renders the project file,
/// since that is the one piece `AgentRuntimeContext` carries directly.
fn build_memory_section(ctx: &AgentRuntimeContext) -> Option<String> {
    ctx.project_context_file
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(|content| format!("\n\n## Project Memory\n\n{content}"))
}

/// Reminder injected only in [`AgentMode::Plan`], and only while the plan
/// file does not yet exist — once a plan has been written, the model is
/// expected to be working from it rather than being told to start one. The
/// filesystem is checked fresh on every call since the file may be created
/// mid-session.
fn plan_mode_reminder(mode: AgentMode, plan_file_path: Option<&std::path::Path>) -> Option<String> {
    if mode != AgentMode::Plan {
        return None;
    }
    let path = plan_file_path?;
    if path.exists() {
        return None;
    }
    Some(format!(
        "\n\n## Plan Mode\nWrite your plan to `{}` before presenting it for approval.",
        path.display()
    ))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn override_prompt_replaces_generated_body() {
        let mut ctx = AgentRuntimeContext::default();
        ctx.system_prompt_override = Some("custom prompt".into());
        let prompt = system_prompt(AgentMode::Default, &ctx);
        assert_eq!(prompt, "custom prompt");
    }

    #[test]
    fn override_prompt_still_honours_append() {
        let mut ctx = AgentRuntimeContext::default();
        ctx.system_prompt_override = Some("custom prompt".into());
        ctx.append_system_prompt = Some("extra rule".into());
        let prompt = system_prompt(AgentMode::Default, &ctx);
        assert_eq!(prompt, "custom prompt\n\nextra rule");
    }

    #[test]
    fn plan_mode_reminder_present_when_file_missing() {
        let mut ctx = AgentRuntimeContext::default();
        ctx.plan_file_path = Some(PathBuf::from("/nonexistent/plan.md"));
        let prompt = system_prompt(AgentMode::Plan, &ctx);
        assert!(prompt.contains("## Plan Mode"));
    }

    #[test]
    fn plan_mode_reminder_absent_outside_plan_mode() {
        let mut ctx = AgentRuntimeContext::default();
        ctx.plan_file_path = Some(PathBuf::from("/nonexistent/plan.md"));
        let prompt = system_prompt(AgentMode::Default, &ctx);
        assert!(!prompt.contains("## Plan Mode"));
    }

    #[test]
    fn plan_mode_reminder_absent_once_file_exists() {
        let dir = tempfile::tempdir().unwrap();
        let plan_path = dir.path().join("plan.md");
        std::fs::write(&plan_path, "# Plan").unwrap();
        let mut ctx = AgentRuntimeContext::default();
        ctx.plan_file_path = Some(plan_path);
        let prompt = system_prompt(AgentMode::Plan, &ctx);
        assert!(!prompt.contains("## Plan Mode"));
    }

    #[test]
    fn additional_directories_are_listed() {
        let mut ctx = AgentRuntimeContext::default();
        ctx.additional_directories = vec![PathBuf::from("/srv/data")];
        let prompt = system_prompt(AgentMode::Default, &ctx);
        assert!(prompt.contains("/srv/data"));
    }

    #[test]
    fn language_section_preserves_technical_terms_clause() {
        let mut ctx = AgentRuntimeContext::default();
        ctx.language = Some("French".into());
        let prompt = system_prompt(AgentMode::Default, &ctx);
        assert!(prompt.contains("French"));
        assert!(prompt.contains("Keep identifiers"));
    }
}
