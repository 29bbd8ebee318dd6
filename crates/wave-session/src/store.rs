// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::model::{Message, Session};

/// One line of the journal file: either the session's own metadata record
/// or one appended message. Kept as a single tagged enum so a session's
/// journal is exactly one file, read top to bottom, in append order
/// (invariant 6: the file is never rewritten, only appended to).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum JournalLine {
    Session(Session),
    Message(Message),
}

/// Append-only JSONL journal of sessions: one `serde_json::Value` per line
/// via `writeln!`, read back with a line-oriented parse rather than a
/// one-shot export.
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn generate_session_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.root.join(format!("{session_id}.jsonl"))
    }

    /// Creates a new root session and writes its metadata record as the
    /// journal's first line.
    pub fn create_session(&self, cwd: impl Into<String>) -> anyhow::Result<Session> {
        let session = Session::new_root(cwd);
        self.write_session_record(&session)?;
        Ok(session)
    }

    /// Forks `parent` into a new session with its own journal file, whose
    /// first line is its session metadata (invariant 4: `root_session_id`
    /// is inherited unchanged from the parent).
    pub fn fork_session(&self, parent: &Session) -> anyhow::Result<Session> {
        let child = Session::fork(parent);
        self.write_session_record(&child)?;
        Ok(child)
    }

    fn write_session_record(&self, session: &Session) -> anyhow::Result<()> {
        fs::create_dir_all(&self.root)?;
        let path = self.path_for(&session.id);
        let mut file = File::create(&path)?;
        let line = serde_json::to_string(&JournalLine::Session(session.clone()))?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Appends messages to an existing session's journal file. Messages are
    /// written in the order given (invariant 2: monotonic append order) and
    /// every message must already carry `session_id` equal to `session.id`
    /// (invariant 1: a message belongs to exactly one session).
    pub fn append_messages(&self, session: &Session, messages: &[Message]) -> anyhow::Result<()> {
        for m in messages {
            anyhow::ensure!(
                m.session_id == session.id,
                "message {} belongs to session {}, not {}",
                m.id,
                m.session_id,
                session.id
            );
        }
        let path = self.path_for(&session.id);
        anyhow::ensure!(path.exists(), "no journal for session {}", session.id);
        let mut file = OpenOptions::new().append(true).open(&path)?;
        for m in messages {
            let line = serde_json::to_string(&JournalLine::Message(m.clone()))?;
            writeln!(file, "{line}")?;
        }
        Ok(())
    }

    /// Loads one session's own metadata plus its full message list, in
    /// append order.
    pub fn load_session(&self, session_id: &str) -> anyhow::Result<(Session, Vec<Message>)> {
        let path = self.path_for(session_id);
        let lines = read_journal_lines(&path)?;

        let mut session: Option<Session> = None;
        let mut messages = Vec::new();
        for line in lines {
            match line {
                JournalLine::Session(s) => session = Some(s),
                JournalLine::Message(m) => messages.push(m),
            }
        }
        let session =
            session.ok_or_else(|| anyhow::anyhow!("journal {session_id} has no session record"))?;
        Ok((session, messages))
    }

    /// Walks the fork chain from `session_id` back to its root and returns
    /// the concatenated message history in chronological (root-first)
    /// order — the view a resumed or restored conversation needs.
    pub fn load_full_thread(&self, session_id: &str) -> anyhow::Result<Vec<Message>> {
        let mut chain = Vec::new();
        let mut current = Some(session_id.to_string());
        while let Some(id) = current {
            let (session, messages) = self.load_session(&id)?;
            current = session.parent_session_id.clone();
            chain.push(messages);
        }
        chain.reverse();
        Ok(chain.into_iter().flatten().collect())
    }
}

fn read_journal_lines(path: &Path) -> anyhow::Result<Vec<JournalLine>> {
    let file = File::open(path)
        .map_err(|e| anyhow::anyhow!("opening journal {}: {e}", path.display()))?;
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

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;

    #[test]
    fn create_and_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let session = store.create_session("/work").unwrap();

        let msgs = vec![Message::text(session.id.clone(), Role::User, "hi")];
        store.append_messages(&session, &msgs).unwrap();

        let (loaded_session, loaded_messages) = store.load_session(&session.id).unwrap();
        assert_eq!(loaded_session.id, session.id);
        assert_eq!(loaded_messages.len(), 1);
        assert_eq!(loaded_messages[0].as_text().as_deref(), Some("hi"));
    }

    #[test]
    fn append_rejects_foreign_session_message() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let session = store.create_session("/work").unwrap();
        let foreign = Message::text("not-this-session", Role::User, "hi");
        assert!(store.append_messages(&session, &[foreign]).is_err());
    }

    #[test]
    fn append_fails_without_existing_journal() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let ghost = Session::new_root("/work");
        let msg = Message::text(ghost.id.clone(), Role::User, "hi");
        assert!(store.append_messages(&ghost, &[msg]).is_err());
    }

    #[test]
    fn fork_chain_loads_full_thread_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());

        let root = store.create_session("/work").unwrap();
        store
            .append_messages(&root, &[Message::text(root.id.clone(), Role::User, "first")])
            .unwrap();

        let child = store.fork_session(&root).unwrap();
        store
            .append_messages(
                &child,
                &[Message::text(child.id.clone(), Role::Assistant, "second")],
            )
            .unwrap();

        let thread = store.load_full_thread(&child.id).unwrap();
        assert_eq!(thread.len(), 2);
        assert_eq!(thread[0].as_text().as_deref(), Some("first"));
        assert_eq!(thread[1].as_text().as_deref(), Some("second"));
    }

    #[test]
    fn appended_lines_never_rewrite_earlier_lines() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let session = store.create_session("/work").unwrap();

        store
            .append_messages(
                &session,
                &[Message::text(session.id.clone(), Role::User, "one")],
            )
            .unwrap();
        let path = store.path_for(&session.id);
        let after_first = fs::read_to_string(&path).unwrap();

        store
            .append_messages(
                &session,
                &[Message::text(session.id.clone(), Role::User, "two")],
            )
            .unwrap();
        let after_second = fs::read_to_string(&path).unwrap();

        assert!(after_second.starts_with(&after_first));
    }

    #[test]
    fn generate_session_id_is_unique() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        assert_ne!(store.generate_session_id(), store.generate_session_id());
    }
}
