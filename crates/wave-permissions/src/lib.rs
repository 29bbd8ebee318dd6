// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod manager;
pub mod rule;
pub mod safezone;

pub use manager::{
    AskCallback, PermissionContext, PermissionDecision, PermissionError, PermissionManager,
    PermissionMode,
};
pub use rule::{decompose_bash, expand_bash_rule, Rule, RuleArg};
pub use safezone::SafeZone;
