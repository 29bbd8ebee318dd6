// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::fmt;

/// A persistent or temporary permission rule in `Tool(arg)` / `Tool(prefix:*)`
/// grammar, e.g. `Bash(git status)`, `Bash(git push:*)`, `Write(/tmp/*)`.
///
/// `arg` is matched either as an exact string or, when it ends in `:*`, as a
/// prefix — the same two-mode matching `sven_tools::policy::ToolPolicy` does
/// with glob patterns, specialized here to the narrower prefix grammar the
/// permission UI exposes to users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub tool: String,
    pub arg: Option<RuleArg>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleArg {
    Exact(String),
    Prefix(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RuleParseError {
    #[error("rule '{0}' is missing a closing ')'")]
    UnbalancedParens(String),
    #[error("rule '{0}' has an empty tool name")]
    EmptyToolName(String),
}

impl Rule {
    /// Parses `Tool`, `Tool(arg)` or `Tool(prefix:*)`.
    pub fn parse(s: &str) -> Result<Self, RuleParseError> {
        let s = s.trim();
        let Some(open) = s.find('(') else {
            if s.is_empty() {
                return Err(RuleParseError::EmptyToolName(s.to_string()));
            }
            return Ok(Rule {
                tool: s.to_string(),
                arg: None,
            });
        };
        if !s.ends_with(')') {
            return Err(RuleParseError::UnbalancedParens(s.to_string()));
        }
        let tool = s[..open].to_string();
        if tool.is_empty() {
            return Err(RuleParseError::EmptyToolName(s.to_string()));
        }
        let inner = &s[open + 1..s.len() - 1];
        let arg = if let Some(prefix) = inner.strip_suffix(":*") {
            RuleArg::Prefix(prefix.to_string())
        } else {
            RuleArg::Exact(inner.to_string())
        };
        Ok(Rule {
            tool,
            arg: Some(arg),
        })
    }

    /// Whether this rule covers a concrete `(tool, arg)` invocation.
    pub fn matches(&self, tool: &str, arg: &str) -> bool {
        if self.tool != tool {
            return false;
        }
        match &self.arg {
            None => true,
            Some(RuleArg::Exact(expected)) => expected == arg,
            Some(RuleArg::Prefix(prefix)) => arg.starts_with(prefix.as_str()),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.arg {
            None => write!(f, "{}", self.tool),
            Some(RuleArg::Exact(a)) => write!(f, "{}({})", self.tool, a),
            Some(RuleArg::Prefix(p)) => write!(f, "{}({}:*)", self.tool, p),
        }
    }
}

/// Splits a shell command line into its component simple commands, so a
/// compound command like `git status && rm -rf /` can be checked primitive
/// by primitive rather than as one opaque string. Deliberately simple:
/// splits only on the unquoted shell control operators that chain
/// independent commands.
pub fn decompose_bash(command: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = command.chars().peekable();
    let mut in_single = false;
    let mut in_double = false;

    while let Some(c) = chars.next() {
        match c {
            '\'' if !in_double => {
                in_single = !in_single;
                current.push(c);
            }
            '"' if !in_single => {
                in_double = !in_double;
                current.push(c);
            }
            '&' if !in_single && !in_double && chars.peek() == Some(&'&') => {
                chars.next();
                parts.push(current.trim().to_string());
                current.clear();
            }
            '|' if !in_single && !in_double && chars.peek() == Some(&'|') => {
                chars.next();
                parts.push(current.trim().to_string());
                current.clear();
            }
            ';' if !in_single && !in_double => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts.into_iter().filter(|p| !p.is_empty()).collect()
}

/// Expands a raw bash command into the canonical rule-arg form used when
/// offering the user a persistent-allow choice: the first two
/// whitespace-separated words become a `prefix:*` rule (e.g. `git push
/// origin main` -> `git push:*`), falling back to the exact command when it
/// has fewer than two words.
pub fn expand_bash_rule(command: &str) -> Rule {
    let words: Vec<&str> = command.split_whitespace().collect();
    let arg = if words.len() >= 2 {
        RuleArg::Prefix(format!("{} {}", words[0], words[1]))
    } else {
        RuleArg::Exact(command.trim().to_string())
    };
    Rule {
        tool: "Bash".to_string(),
        arg: Some(arg),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_tool_name() {
        let r = Rule::parse("Bash").unwrap();
        assert_eq!(r.tool, "Bash");
        assert!(r.arg.is_none());
    }

    #[test]
    fn parses_exact_arg() {
        let r = Rule::parse("Bash(git status)").unwrap();
        assert_eq!(r.arg, Some(RuleArg::Exact("git status".into())));
    }

    #[test]
    fn parses_prefix_arg() {
        let r = Rule::parse("Bash(git push:*)").unwrap();
        assert_eq!(r.arg, Some(RuleArg::Prefix("git push".into())));
    }

    #[test]
    fn rejects_unbalanced_parens() {
        assert!(Rule::parse("Bash(git status").is_err());
    }

    #[test]
    fn rejects_empty_tool_name() {
        assert!(Rule::parse("(foo)").is_err());
        assert!(Rule::parse("").is_err());
    }

    #[test]
    fn exact_rule_matches_only_exact_arg() {
        let r = Rule::parse("Bash(git status)").unwrap();
        assert!(r.matches("Bash", "git status"));
        assert!(!r.matches("Bash", "git status -s"));
    }

    #[test]
    fn prefix_rule_matches_any_suffix() {
        let r = Rule::parse("Bash(git push:*)").unwrap();
        assert!(r.matches("Bash", "git push origin main"));
        assert!(!r.matches("Bash", "git pull"));
    }

    #[test]
    fn bare_rule_matches_any_arg_for_tool() {
        let r = Rule::parse("Write").unwrap();
        assert!(r.matches("Write", "/tmp/anything"));
        assert!(!r.matches("Read", "/tmp/anything"));
    }

    #[test]
    fn display_round_trips_parse() {
        for s in ["Bash", "Bash(git status)", "Bash(git push:*)"] {
            assert_eq!(Rule::parse(s).unwrap().to_string(), s);
        }
    }

    #[test]
    fn decompose_splits_on_and_and_semicolon() {
        let parts = decompose_bash("git status && rm -rf /tmp/x; echo done");
        assert_eq!(parts, vec!["git status", "rm -rf /tmp/x", "echo done"]);
    }

    #[test]
    fn decompose_splits_on_or() {
        let parts = decompose_bash("test -f x || touch x");
        assert_eq!(parts, vec!["test -f x", "touch x"]);
    }

    #[test]
    fn decompose_respects_quoting() {
        let parts = decompose_bash("echo 'a && b'");
        assert_eq!(parts, vec!["echo 'a && b'"]);
    }

    #[test]
    fn expand_bash_rule_uses_first_two_words_as_prefix() {
        let r = expand_bash_rule("git push origin main");
        assert_eq!(r.to_string(), "Bash(git push:*)");
    }

    #[test]
    fn expand_bash_rule_falls_back_to_exact_for_single_word() {
        let r = expand_bash_rule("ls");
        assert_eq!(r.to_string(), "Bash(ls)");
    }
}
