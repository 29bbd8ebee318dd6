// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Running,
    Exited(i32),
    Failed(String),
}

struct TaskState {
    output: String,
    status: TaskStatus,
}

struct Task {
    child: Option<Child>,
    subagent_session_id: Option<String>,
    state: Arc<Mutex<TaskState>>,
}

/// Tracks long-running work detached from the turn loop, identified by
/// monotonically increasing `task_N` ids. Shell tasks get piped
/// stdout/stderr pumped into an in-memory buffer, `kill_on_drop(true)` so a
/// manager drop can't leak a runaway process.
pub struct BackgroundTaskManager {
    tasks: HashMap<String, Task>,
    next_id: AtomicU64,
}

impl BackgroundTaskManager {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    fn allocate_id(&self) -> String {
        format!("task_{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Starts a shell command in the background and returns its task id
    /// immediately; output accumulates asynchronously and is read back with
    /// [`Self::get_output`].
    pub async fn start_shell(&mut self, command: &str, workdir: Option<&str>) -> anyhow::Result<String> {
        let id = self.allocate_id();
        let mut cmd = Command::new("bash");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = workdir {
            cmd.current_dir(dir);
        }

        debug!(task_id = %id, command, "starting background shell task");
        let mut child = cmd.spawn()?;

        let state = Arc::new(Mutex::new(TaskState {
            output: String::new(),
            status: TaskStatus::Running,
        }));

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        spawn_pump(stdout, state.clone());
        spawn_pump(stderr, state.clone());

        // The exit code is picked up lazily: `get_output` and `stop` both
        // reconcile against `try_wait` before reporting, rather than
        // `.wait()`-ing here and blocking `start_shell`'s caller.
        self.tasks.insert(
            id.clone(),
            Task {
                child: Some(child),
                subagent_session_id: None,
                state,
            },
        );

        Ok(id)
    }

    /// Registers a subagent run as a background task; the caller (wave-core)
    /// is responsible for calling [`Self::append_output`]/[`Self::complete`]
    /// as that subagent's turn loop progresses.
    pub fn start_subagent(&mut self, session_id: impl Into<String>) -> String {
        let id = self.allocate_id();
        self.tasks.insert(
            id.clone(),
            Task {
                child: None,
                subagent_session_id: Some(session_id.into()),
                state: Arc::new(Mutex::new(TaskState {
                    output: String::new(),
                    status: TaskStatus::Running,
                })),
            },
        );
        id
    }

    /// Returns the session id a subagent task is bound to, or `None` for
    /// shell tasks and unknown ids.
    pub fn subagent_session_id(&self, task_id: &str) -> Option<&str> {
        self.tasks.get(task_id)?.subagent_session_id.as_deref()
    }

    pub async fn append_output(&self, task_id: &str, text: &str) {
        if let Some(task) = self.tasks.get(task_id) {
            let mut state = task.state.lock().await;
            state.output.push_str(text);
        }
    }

    pub async fn complete(&self, task_id: &str, status: TaskStatus) {
        if let Some(task) = self.tasks.get(task_id) {
            let mut state = task.state.lock().await;
            state.status = status;
        }
    }

    /// Kills a running shell task (no-op for subagent tasks, which abort
    /// through `SubagentSupervisor` instead).
    pub async fn stop(&mut self, task_id: &str) -> anyhow::Result<()> {
        if let Some(task) = self.tasks.get_mut(task_id) {
            if let Some(child) = task.child.as_mut() {
                child.start_kill()?;
            }
            let mut state = task.state.lock().await;
            if state.status == TaskStatus::Running {
                state.status = TaskStatus::Failed("stopped by user".to_string());
            }
        }
        Ok(())
    }

    /// Returns the accumulated output for a task, optionally filtered to
    /// lines matching `filter` (a regex, applied per line).
    pub async fn get_output(&mut self, task_id: &str, filter: Option<&str>) -> Option<(TaskStatus, String)> {
        let task = self.tasks.get_mut(task_id)?;
        if let Some(child) = task.child.as_mut() {
            if let Ok(Some(exit)) = child.try_wait() {
                let mut state = task.state.lock().await;
                if state.status == TaskStatus::Running {
                    state.status = TaskStatus::Exited(exit.code().unwrap_or(-1));
                }
            }
        }
        let state = task.state.lock().await;
        let output = match filter {
            Some(pattern) => {
                let re = Regex::new(pattern).ok()?;
                state
                    .output
                    .lines()
                    .filter(|line| re.is_match(line))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            None => state.output.clone(),
        };
        Some((state.status.clone(), output))
    }

    pub fn task_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tasks.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for BackgroundTaskManager {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_pump<R>(stream: Option<R>, state: Arc<Mutex<TaskState>>)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    let Some(stream) = stream else {
        return;
    };
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let mut state = state.lock().await;
            state.output.push_str(&line);
            state.output.push('\n');
        }
    });
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
