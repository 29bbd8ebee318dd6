// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use crate::model::Snapshot;

/// Persistent snapshot log: one JSONL file, appended to on commit. Grounded
/// on `wave-session::store::SessionStore`'s append-only journal idiom
/// (`File::create` for the first write, `OpenOptions::append` thereafter),
/// with one addition the session journal never needs: `delete_for_messages`,
/// which rewrites the file with the deleted records filtered out, since a
/// completed revert must not leave spent snapshots behind for a later
/// `revertTo` to re-apply.
pub struct ReversionService {
    path: PathBuf,
}

impl ReversionService {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn append(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(snapshot)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    pub fn load_all(&self) -> anyhow::Result<Vec<Snapshot>> {
        let Ok(file) = File::open(&self.path) else {
            return Ok(Vec::new());
        };
        let reader = BufReader::new(file);
        let mut out = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            out.push(serde_json::from_str(&line)?);
        }
        Ok(out)
    }

    /// Loads every snapshot whose `message_id` is in `message_ids`, newest
    /// first by `committed_at`.
    pub fn load_for_messages(&self, message_ids: &[String]) -> anyhow::Result<Vec<Snapshot>> {
        let mut matching: Vec<Snapshot> = self
            .load_all()?
            .into_iter()
            .filter(|s| message_ids.iter().any(|id| id == &s.message_id))
            .collect();
        matching.sort_by(|a, b| b.committed_at.cmp(&a.committed_at));
        Ok(matching)
    }

    /// Rewrites the log with every snapshot belonging to `message_ids`
    /// removed.
    pub fn delete_for_messages(&self, message_ids: &[String]) -> anyhow::Result<()> {
        let remaining: Vec<Snapshot> = self
            .load_all()?
            .into_iter()
            .filter(|s| !message_ids.iter().any(|id| id == &s.message_id))
            .collect();
        let mut file = File::create(&self.path)?;
        for snapshot in &remaining {
            let line = serde_json::to_string(snapshot)?;
            writeln!(file, "{line}")?;
        }
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snap(message_id: &str, path: &str, content: Option<&str>) -> Snapshot {
        Snapshot {
            message_id: message_id.to_string(),
            path: path.to_string(),
            content: content.map(|c| c.as_bytes().to_vec()),
            committed_at: Utc::now(),
        }
    }

    #[test]
    fn append_then_load_all_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let svc = ReversionService::new(dir.path().join("reversion.jsonl"));
        svc.append(&snap("m1", "/a.txt", Some("hello"))).unwrap();
        svc.append(&snap("m2", "/b.txt", None)).unwrap();
        let all = svc.load_all().unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn load_all_on_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let svc = ReversionService::new(dir.path().join("nonexistent.jsonl"));
        assert!(svc.load_all().unwrap().is_empty());
    }

    #[test]
    fn load_for_messages_filters_and_orders_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let svc = ReversionService::new(dir.path().join("reversion.jsonl"));
        let mut first = snap("m1", "/a.txt", Some("one"));
        first.committed_at = Utc::now() - chrono::Duration::seconds(10);
        let second = snap("m1", "/a.txt", Some("two"));
        let other = snap("m2", "/b.txt", Some("unrelated"));
        svc.append(&first).unwrap();
        svc.append(&second).unwrap();
        svc.append(&other).unwrap();

        let matched = svc.load_for_messages(&["m1".to_string()]).unwrap();
        assert_eq!(matched.len(), 2);
        assert_eq!(matched[0].content, Some(b"two".to_vec()));
        assert_eq!(matched[1].content, Some(b"one".to_vec()));
    }

    #[test]
    fn delete_for_messages_removes_only_matching_records() {
        let dir = tempfile::tempdir().unwrap();
        let svc = ReversionService::new(dir.path().join("reversion.jsonl"));
        svc.append(&snap("m1", "/a.txt", Some("one"))).unwrap();
        svc.append(&snap("m2", "/b.txt", Some("two"))).unwrap();

        svc.delete_for_messages(&["m1".to_string()]).unwrap();
        let remaining = svc.load_all().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].message_id, "m2");
    }
}
