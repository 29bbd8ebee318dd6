// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod background;
pub mod foreground;

pub use background::{BackgroundTaskManager, TaskStatus};
pub use foreground::{ForegroundTask, ForegroundTaskStack};
