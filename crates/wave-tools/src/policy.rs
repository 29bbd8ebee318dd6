// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

/// Per-tool baseline approval level, consulted by `wave-permissions` when no
/// persistent or temporary rule already covers the call. The full decision
/// pipeline (safe-zone checks, Bash decomposition, rule grammar) lives in
/// `wave-permissions`; this crate only carries the three-way outcome a
/// `Tool` declares as its own default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalPolicy {
    /// Always run without asking.
    Auto,
    /// Ask the user before each invocation.
    Ask,
    /// Never run; return an error.
    Deny,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_are_distinct() {
        assert_ne!(ApprovalPolicy::Auto, ApprovalPolicy::Ask);
        assert_ne!(ApprovalPolicy::Ask, ApprovalPolicy::Deny);
        assert_ne!(ApprovalPolicy::Auto, ApprovalPolicy::Deny);
    }
}
