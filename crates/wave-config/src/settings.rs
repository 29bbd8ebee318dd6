// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::loader::merge_json;
use crate::schema::{HooksConfig, AgentMode};

/// The permission mode named in `settings.json`'s `defaultMode` field.
/// Shares its value set with [`crate::AgentMode`] — the same four modes
/// `PermissionManager` understands — kept as a distinct alias so
/// callers reading settings don't need to reach into `schema`.
pub type PermissionMode = AgentMode;

/// One `settings.json` document, as loaded from one layer of the precedence chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, rename = "defaultMode")]
    pub default_mode: Option<PermissionMode>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub hooks: HooksConfig,
    #[serde(default, rename = "enabledPlugins")]
    pub enabled_plugins: Vec<String>,
}

impl Settings {
    fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    fn merge(&mut self, other: Settings) {
        if other.default_mode.is_some() {
            self.default_mode = other.default_mode;
        }
        self.env.extend(other.env);
        for (event, groups) in other.hooks {
            self.hooks.entry(event).or_default().extend(groups);
        }
        for plugin in other.enabled_plugins {
            if !self.enabled_plugins.contains(&plugin) {
                self.enabled_plugins.push(plugin);
            }
        }
    }
}

/// The four-file precedence chain, lowest to highest:
/// user < user.local < project < project.local.
pub struct SettingsLayer {
    user_dir: PathBuf,
    project_dir: PathBuf,
}

impl SettingsLayer {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        let user_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".wave");
        Self {
            user_dir,
            project_dir: project_dir.into(),
        }
    }

    fn paths(&self) -> [(PathBuf, bool); 4] {
        [
            (self.user_dir.join("settings.json"), false),
            (self.user_dir.join("settings.local.json"), false),
            (self.project_dir.join(".wave/settings.json"), false),
            (self.project_dir.join(".wave/settings.local.json"), true),
        ]
    }

    /// Load and merge all four layers that exist on disk, in precedence
    /// order. Missing files are skipped, not errors.
    pub fn load(&self) -> anyhow::Result<Settings> {
        let mut merged = Settings::default();
        for (path, is_local_project) in self.paths() {
            if is_local_project {
                self.ensure_gitignored(&path);
            }
            if path.is_file() {
                debug!(path = %path.display(), "loading settings layer");
                merged.merge(Settings::from_file(&path)?);
            }
        }
        Ok(merged)
    }

    /// Same precedence chain, returned as a single merged raw JSON value
    /// rather than deserialized — used when a caller (e.g. `wave-hooks`)
    /// wants the unmodified hook command strings without round-tripping
    /// through [`Settings`].
    pub fn load_raw(&self) -> anyhow::Result<serde_json::Value> {
        let mut merged = serde_json::Value::Object(serde_json::Map::new());
        for (path, is_local_project) in self.paths() {
            if is_local_project {
                self.ensure_gitignored(&path);
            }
            if path.is_file() {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?;
                let layer: serde_json::Value = serde_json::from_str(&text)
                    .with_context(|| format!("parsing {}", path.display()))?;
                merge_json(&mut merged, layer);
            }
        }
        Ok(merged)
    }

    /// The first time `.wave/settings.local.json` is observed (by either
    /// this process creating it or finding it already present), make sure
    /// `.wave/.gitignore` excludes it — it's meant to hold untracked local
    /// overrides (e.g. secrets, experimental hook commands), never to be
    /// committed.
    fn ensure_gitignored(&self, local_settings_path: &Path) {
        let wave_dir = self.project_dir.join(".wave");
        let gitignore = wave_dir.join(".gitignore");
        let entry = "settings.local.json";

        let existing = std::fs::read_to_string(&gitignore).unwrap_or_default();
        if existing.lines().any(|l| l.trim() == entry) {
            return;
        }
        if std::fs::create_dir_all(&wave_dir).is_err() {
            return;
        }
        let mut contents = existing;
        if !contents.is_empty() && !contents.ends_with('\n') {
            contents.push('\n');
        }
        contents.push_str(entry);
        contents.push('\n');
        if let Err(err) = std::fs::write(&gitignore, contents) {
            debug!(%err, path = %gitignore.display(), "failed to update .wave/.gitignore");
        }
        let _ = local_settings_path;
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
