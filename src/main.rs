// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::io::Read as _;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::Cli;
use wave_config::{Settings, SettingsLayer};
use wave_core::{
    AIManager, AbortHandle, AgentEvent, AgentRuntimeContext, MessageManager, ToolManager,
    TurnOptions,
};
use wave_hooks::HookManager;
use wave_model::{ModelProvider, MockProvider, YamlMockProvider};
use wave_permissions::PermissionManager;
use wave_session::SessionStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cwd = match &cli.cwd {
        Some(p) => p.clone(),
        None => std::env::current_dir().context("resolving current directory")?,
    };

    let message = match &cli.message {
        Some(m) => m.clone(),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading message from stdin")?;
            buf
        }
    };

    let config = wave_config::load(cli.config.as_deref())?;
    let settings: Settings = SettingsLayer::new(&cwd).load()?;
    let mode = cli
        .mode
        .or(settings.default_mode)
        .unwrap_or(config.agent.default_mode);

    let session_dir = cli
        .session_dir
        .clone()
        .unwrap_or_else(|| cwd.join(".wave/sessions"));
    let store = SessionStore::new(session_dir);
    let session = store.create_session(cwd.display().to_string())?;
    let messages = MessageManager::new(store, session, cwd.display().to_string());

    let registry = Arc::new(wave_tools::default_registry());
    let tools = ToolManager::new(registry);

    let permissions = Arc::new(PermissionManager::new(mode, &cwd, &config.tools));

    let hooks = Arc::new(HookManager::new(settings.hooks));
    let agent_config = Arc::new(config.agent.clone());

    let model = build_model(&config)?;

    let mut manager = AIManager::new(messages, tools, permissions, hooks, agent_config, mode);
    if !manager.submit_user_message(&message, None).await {
        anyhow::bail!("message was blocked by a UserPromptSubmit hook");
    }

    let runtime_ctx = AgentRuntimeContext {
        project_root: Some(cwd),
        ..Default::default()
    };
    let (tx, mut rx) = mpsc::unbounded_channel();
    let abort = AbortHandle::new();

    let drain = tokio::spawn(async move {
        let mut transcript = String::new();
        while let Some(event) = rx.recv().await {
            match event {
                AgentEvent::TextDelta(delta) => {
                    print!("{delta}");
                    transcript.push_str(&delta);
                }
                AgentEvent::ToolCallStarted(call) => {
                    eprintln!("[tool] {} {}", call.name, call.args);
                }
                AgentEvent::ToolCallFinished {
                    tool_name,
                    is_error,
                    ..
                } => {
                    eprintln!("[tool] {tool_name} {}", if is_error { "failed" } else { "ok" });
                }
                AgentEvent::Error(message) => eprintln!("[error] {message}"),
                _ => {}
            }
        }
        transcript
    });

    manager
        .run_turn(model.as_ref(), &runtime_ctx, &tx, &abort, TurnOptions::default())
        .await?;
    drop(tx);
    let _ = drain.await;
    println!();
    Ok(())
}

fn build_model(config: &wave_config::Config) -> anyhow::Result<Arc<dyn ModelProvider>> {
    if let Some(path) = &config.model.mock_responses_file {
        let provider = YamlMockProvider::from_file(path)
            .with_context(|| format!("loading mock responses file {path}"))?;
        Ok(Arc::new(provider))
    } else {
        Ok(Arc::new(MockProvider))
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
