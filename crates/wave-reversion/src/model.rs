// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The state of one file immediately before a tool invocation mutated it.
/// `content = None` means the file did not exist yet, so reverting means
/// removing it rather than restoring bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub message_id: String,
    pub path: String,
    pub content: Option<Vec<u8>>,
    pub committed_at: DateTime<Utc>,
}

impl Snapshot {
    /// The `<message_id>-<path>` key snapshots are addressed by, before
    /// they're committed to the persistent store.
    pub fn key(message_id: &str, path: &str) -> String {
        format!("{message_id}-{path}")
    }
}
