// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::Parser;
use wave_config::AgentMode;

/// Drives one `wave-core` turn to completion and prints the resulting
/// transcript. Not a product TUI — see `wave-tui`'s equivalent for that;
/// this exists to give the engine a runnable surface for `tests/`.
#[derive(Parser, Debug)]
#[command(name = "wave", version, about = "Run one agent turn against a message")]
pub struct Cli {
    /// The user message to submit. Read from stdin if omitted.
    pub message: Option<String>,

    /// Path to a config file layered on top of the usual search locations.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Working directory the turn runs against (defaults to the current directory).
    #[arg(long, short = 'C')]
    pub cwd: Option<PathBuf>,

    /// Permission mode for this turn.
    #[arg(long, value_enum)]
    pub mode: Option<AgentMode>,

    /// Directory session journals are written under (defaults to `<cwd>/.wave/sessions`).
    #[arg(long)]
    pub session_dir: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace). Logs go to stderr.
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
