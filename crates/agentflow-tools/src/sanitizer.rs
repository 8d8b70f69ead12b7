// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

/// Outcome of [`check`]. `reason` is set and verbatim whenever `allowed`
/// is `false`; the command is never rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizeResult {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl SanitizeResult {
    fn allow() -> Self {
        Self { allowed: true, reason: None }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self { allowed: false, reason: Some(reason.into()) }
    }
}

struct DenyRule {
    pattern: Regex,
    reason: &'static str,
}

fn built_in_deny_rules() -> &'static [DenyRule] {
    static RULES: OnceLock<Vec<DenyRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        let rule = |pat: &str, reason: &'static str| DenyRule {
            pattern: Regex::new(&format!("(?i){pat}")).expect("valid sanitizer pattern"),
            reason,
        };
        vec![
            rule(r"rm\s+-[a-z]*r[a-z]*f|rm\s+-[a-z]*f[a-z]*r", "recursive delete"),
            rule(r"\bdel\s+/f\b", "recursive delete"),
            rule(r"\brmdir\s+/s\b", "recursive delete"),
            rule(r"\bmkfs(\.\w+)?\b", "disk operation"),
            rule(r"\bdd\s+if=", "disk operation"),
            rule(r"/dev/sd[a-z]\b", "disk operation"),
            rule(r"\bformat\s+[a-z]:", "disk operation"),
            rule(r"\bdiskpart\b", "disk operation"),
            rule(r"\bshutdown\b", "power control"),
            rule(r"\breboot\b", "power control"),
            rule(r"\bpoweroff\b", "power control"),
            rule(r"\binit\s+[06]\b", "power control"),
            rule(r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:", "fork bomb"),
            rule(r"(curl|wget)\b[^\n|]*\|\s*(sh|bash|zsh|sudo)\b", "pipe-to-shell"),
            rule(r"\bchmod\s+([0-7]*7[0-7]{2}|-R\s+777|\+s)\b", "permission escalation"),
            rule(
                r"(curl|wget|nc|netcat)\b[^\n]*\$(API_KEY|SECRET|TOKEN|PASSWORD|CREDENTIALS)",
                "credential exfiltration",
            ),
            rule(r"\b(python3?|perl|ruby|node)\s+-[a-z]*e\b", "inline interpreter invocation"),
            rule(r"\bcrontab\s+(-r|-e)\b", "crontab rewrite/removal"),
        ]
    })
}

/// Evaluate a shell command for safety, in the fixed order specified by
/// the built-in deny set, then caller-supplied extras, then the allow
/// list, then workspace confinement.
pub fn check(command: &str, cwd: &Path, extra_deny: &[Regex], allow: &[Regex], restrict_to_workspace: bool) -> SanitizeResult {
    for rule in built_in_deny_rules() {
        if rule.pattern.is_match(command) {
            return SanitizeResult::deny(rule.reason);
        }
    }

    for re in extra_deny {
        if re.is_match(command) {
            return SanitizeResult::deny(format!("matched deny pattern: {}", re.as_str()));
        }
    }

    if !allow.is_empty() && !allow.iter().any(|re| re.is_match(command)) {
        return SanitizeResult::deny("command is not on the allow list");
    }

    if restrict_to_workspace {
        if command.contains("../") || command.contains("..\\") {
            return SanitizeResult::deny("path escapes workspace via '..'");
        }
        for path in extract_absolute_paths(command) {
            if !is_within(&path, cwd) {
                return SanitizeResult::deny(format!(
                    "path '{}' resolves outside the workspace",
                    path.display()
                ));
            }
        }
    }

    SanitizeResult::allow()
}

fn extract_absolute_paths(command: &str) -> Vec<PathBuf> {
    static POSIX: OnceLock<Regex> = OnceLock::new();
    static WINDOWS: OnceLock<Regex> = OnceLock::new();
    let posix = POSIX.get_or_init(|| Regex::new(r#"(?:^|\s)(/[^\s'"]+)"#).unwrap());
    let windows = WINDOWS.get_or_init(|| Regex::new(r#"(?:^|\s)([A-Za-z]:\\[^\s'"]+)"#).unwrap());

    posix
        .captures_iter(command)
        .chain(windows.captures_iter(command))
        .filter_map(|c| c.get(1))
        .map(|m| PathBuf::from(m.as_str()))
        .collect()
}

fn is_within(path: &Path, workspace: &Path) -> bool {
    let normalized_workspace = dunce_normalize(workspace);
    dunce_normalize(path).starts_with(&normalized_workspace)
}

/// Lexical normalization (no symlink resolution, no filesystem access) —
/// sufficient for a pre-execution safety check.
fn dunce_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        use std::path::Component;
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
