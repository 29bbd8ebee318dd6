// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::Utc;
use tracing::debug;

use crate::model::Snapshot;
use crate::service::ReversionService;

/// Buffers a file's pre-mutation content in memory, keyed by
/// `<message_id>-<path>`, until the tool call that captured it either
/// commits (persisted so a later `revertTo` can find it) or discards
/// (the mutation is considered not worth tracking, e.g. a no-op write).
pub struct ReversionManager {
    service: ReversionService,
    buffer: HashMap<String, Snapshot>,
}

impl ReversionManager {
    pub fn new(service: ReversionService) -> Self {
        Self {
            service,
            buffer: HashMap::new(),
        }
    }

    /// Captures `path`'s current on-disk content (or `None` if it doesn't
    /// exist yet) under `message_id`, before the caller's tool goes on to
    /// mutate it. Call once per tool invocation, before the write.
    pub fn snapshot(&mut self, message_id: &str, path: &Path) -> anyhow::Result<()> {
        let content = match fs::read(path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        let path_str = path.to_string_lossy().into_owned();
        let key = Snapshot::key(message_id, &path_str);
        self.buffer.insert(
            key,
            Snapshot {
                message_id: message_id.to_string(),
                path: path_str,
                content,
                committed_at: Utc::now(),
            },
        );
        Ok(())
    }

    /// Flushes a previously captured snapshot to the persistent store.
    pub fn commit_snapshot(&mut self, message_id: &str, path: &Path) -> anyhow::Result<()> {
        let key = Snapshot::key(message_id, &path.to_string_lossy());
        let Some(mut snapshot) = self.buffer.remove(&key) else {
            return Ok(());
        };
        snapshot.committed_at = Utc::now();
        self.service.append(&snapshot)?;
        debug!(message_id, path = %path.display(), "committed snapshot");
        Ok(())
    }

    /// Drops a buffered snapshot without persisting it.
    pub fn discard_snapshot(&mut self, message_id: &str, path: &Path) {
        let key = Snapshot::key(message_id, &path.to_string_lossy());
        self.buffer.remove(&key);
    }

    /// Restores every file touched by `message_ids` to the content it held
    /// immediately before those messages' tool calls ran, then deletes the
    /// consumed snapshots from the store. When a path was snapshotted more
    /// than once across `message_ids`, the oldest snapshot wins: it was
    /// captured before the earliest of the undone mutations, which is the
    /// state the whole batch must roll back to.
    pub fn revert_to(&mut self, message_ids: &[String]) -> anyhow::Result<()> {
        let snapshots = self.service.load_for_messages(message_ids)?;

        // `snapshots` is newest-first, so plain `insert` (not `or_insert`)
        // lets the last occurrence of each path — the oldest one — win.
        let mut earliest_per_path: HashMap<String, Snapshot> = HashMap::new();
        for snapshot in snapshots {
            earliest_per_path.insert(snapshot.path.clone(), snapshot);
        }

        for snapshot in earliest_per_path.values() {
            match &snapshot.content {
                Some(bytes) => fs::write(&snapshot.path, bytes)?,
                None => {
                    if Path::new(&snapshot.path).exists() {
                        fs::remove_file(&snapshot.path)?;
                    }
                }
            }
        }

        self.service.delete_for_messages(message_ids)?;
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn manager(dir: &Path) -> ReversionManager {
        ReversionManager::new(ReversionService::new(dir.join("reversion.jsonl")))
    }

    #[test]
    fn snapshot_of_missing_file_records_none() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = manager(dir.path());
        let path = dir.path().join("new.txt");
        mgr.snapshot("m1", &path).unwrap();
        mgr.commit_snapshot("m1", &path).unwrap();

        fs::write(&path, "created by tool").unwrap();
        mgr.revert_to(&["m1".to_string()]).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn revert_restores_prior_content() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = manager(dir.path());
        let path = dir.path().join("file.txt");
        fs::write(&path, "before").unwrap();

        mgr.snapshot("m1", &path).unwrap();
        mgr.commit_snapshot("m1", &path).unwrap();
        fs::write(&path, "after").unwrap();

        mgr.revert_to(&["m1".to_string()]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "before");
    }

    #[test]
    fn revert_consumes_snapshots_from_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = manager(dir.path());
        let path = dir.path().join("file.txt");
        fs::write(&path, "v1").unwrap();
        mgr.snapshot("m1", &path).unwrap();
        mgr.commit_snapshot("m1", &path).unwrap();
        fs::write(&path, "v2").unwrap();

        mgr.revert_to(&["m1".to_string()]).unwrap();
        let remaining = mgr.service.load_all().unwrap();
        assert!(remaining.is_empty());
    }

    #[test]
    fn discard_snapshot_drops_without_persisting() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = manager(dir.path());
        let path = dir.path().join("file.txt");
        fs::write(&path, "v1").unwrap();
        mgr.snapshot("m1", &path).unwrap();
        mgr.discard_snapshot("m1", &path);
        mgr.commit_snapshot("m1", &path).unwrap();

        assert!(mgr.service.load_all().unwrap().is_empty());
    }

    #[test]
    fn multi_step_revert_keeps_earliest_content_per_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = manager(dir.path());
        let path = dir.path().join("file.txt");

        fs::write(&path, "v0").unwrap();
        mgr.snapshot("m1", &path).unwrap();
        mgr.commit_snapshot("m1", &path).unwrap();
        fs::write(&path, "v1").unwrap();

        std::thread::sleep(std::time::Duration::from_millis(5));
        mgr.snapshot("m2", &path).unwrap();
        mgr.commit_snapshot("m2", &path).unwrap();
        fs::write(&path, "v2").unwrap();

        mgr.revert_to(&["m1".to_string(), "m2".to_string()]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "v0");
    }
}
