// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

/// Trust level of a block of content injected into the model's context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustLevel {
    System,
    Trusted,
    Untrusted,
}

impl TrustLevel {
    fn tag(self) -> &'static str {
        match self {
            TrustLevel::System => "SYSTEM",
            TrustLevel::Trusted => "TRUSTED",
            TrustLevel::Untrusted => "UNTRUSTED",
        }
    }
}

/// Wrap `content` in the boundary-marker contract:
/// `[-- BEGIN <LEVEL> CONTENT: <label> --] … [-- END <LEVEL> CONTENT: <label> --]`.
/// `System`-level content is returned unwrapped.
pub fn tag_content(level: TrustLevel, label: &str, content: &str) -> String {
    if level == TrustLevel::System {
        return content.to_string();
    }
    let tag = level.tag();
    format!("[-- BEGIN {tag} CONTENT: {label} --]\n{content}\n[-- END {tag} CONTENT: {label} --]")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untrusted_is_wrapped() {
        let tagged = tag_content(TrustLevel::Untrusted, "tool:shell", "output");
        assert!(tagged.starts_with("[-- BEGIN UNTRUSTED CONTENT: tool:shell --]"));
        assert!(tagged.trim_end().ends_with("[-- END UNTRUSTED CONTENT: tool:shell --]"));
        assert!(tagged.contains("output"));
    }

    #[test]
    fn trusted_is_wrapped_with_trusted_tag() {
        let tagged = tag_content(TrustLevel::Trusted, "workspace:AGENTS.md", "content");
        assert!(tagged.starts_with("[-- BEGIN TRUSTED CONTENT"));
    }

    #[test]
    fn system_is_unwrapped() {
        assert_eq!(tag_content(TrustLevel::System, "x", "raw"), "raw");
    }
}
