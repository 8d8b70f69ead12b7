// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashSet;

use agentflow_config::{CompactionConfig, CompactionMode};
use agentflow_model::Message;
use serde::Serialize;

/// Importance markers that bump a message's salience score. Fixed, not
/// user-configurable — tuning this list is a code change, not a config knob.
const KEYWORDS: &[&str] = &[
    "must", "require", "deadline", "decision", "agreed", "error", "failed", "todo", "api",
    "token", "password", "breaking", "regression", "security", "migrate", "deprecat",
];

const MAX_SNIPPET_CHARS: usize = 220;
const ROLLING_SUMMARY_WINDOW: usize = 12;

/// Per-run accounting of what the compressor did, for observability.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetReport {
    pub mode: String,
    pub before_tokens_estimate: usize,
    pub after_tokens_estimate: usize,
    pub saved: usize,
    pub recent_messages: usize,
    pub facts: usize,
}

#[derive(Debug, Clone)]
pub struct CompressedContext {
    pub messages: Vec<Message>,
    pub report: BudgetReport,
}

/// Base salience weight by role — tool results and user turns carry
/// requirements and errors more often than assistant narration.
fn base_score(message: &Message) -> f32 {
    match message {
        Message::User { .. } => 0.3,
        Message::Tool { .. } => 0.25,
        Message::Assistant { .. } => 0.2,
        Message::System { .. } => 0.0,
    }
}

fn keyword_hits(text_lower: &str) -> usize {
    KEYWORDS.iter().filter(|k| text_lower.contains(*k)).count()
}

fn score(message: &Message, text: &str) -> f32 {
    let lower = text.to_lowercase();
    let hits = keyword_hits(&lower);
    base_score(message)
        + (0.08 * hits as f32).min(0.4)
        + if text.chars().any(|c| c.is_ascii_digit()) { 0.1 } else { 0.0 }
        + if text.contains('`') { 0.1 } else { 0.0 }
        + if text.len() > 220 { 0.1 } else { 0.0 }
}

/// Collapse a message's text to a single-line, budget-capped snippet.
fn normalize_snippet(text: &str) -> String {
    let oneline: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if oneline.chars().count() <= MAX_SNIPPET_CHARS {
        oneline
    } else {
        let truncated: String = oneline.chars().take(MAX_SNIPPET_CHARS.saturating_sub(1)).collect();
        format!("{truncated}…")
    }
}

fn top_n_for_mode(mode: CompactionMode) -> usize {
    match mode {
        CompactionMode::Off => 0,
        CompactionMode::Conservative => 8,
        CompactionMode::Balanced => 12,
        CompactionMode::Aggressive => 16,
    }
}

fn approx_tokens(messages: &[Message]) -> usize {
    messages.iter().map(Message::approx_tokens).sum()
}

/// Compress `messages` per `cfg`, returning the replacement message slice
/// plus a budget report. `cfg.mode == Off` is a passthrough.
pub fn compress(messages: &[Message], cfg: &CompactionConfig) -> CompressedContext {
    let before_tokens = approx_tokens(messages);

    if cfg.mode == CompactionMode::Off {
        return CompressedContext {
            messages: messages.to_vec(),
            report: BudgetReport {
                mode: "off".to_string(),
                before_tokens_estimate: before_tokens,
                after_tokens_estimate: before_tokens,
                saved: 0,
                recent_messages: messages.len(),
                facts: 0,
            },
        };
    }

    // Recency slice: walk back from the newest message until `recency_turns`
    // user messages have been seen.
    let mut user_turns_seen = 0usize;
    let mut split_at = 0usize;
    for (idx, message) in messages.iter().enumerate().rev() {
        if matches!(message, Message::User { .. }) {
            user_turns_seen += 1;
        }
        if user_turns_seen > cfg.recency_turns {
            split_at = idx + 1;
            break;
        }
    }
    let older = &messages[..split_at];
    let raw_recent = &messages[split_at..];

    // Salience scoring over the older prefix.
    let mut candidates: Vec<(f32, String)> = Vec::new();
    let mut seen_snippets: HashSet<String> = HashSet::new();
    for message in older {
        let Some(text) = message.as_text() else { continue };
        if text.trim().is_empty() {
            continue;
        }
        let s = score(message, text);
        if s < cfg.salience_threshold {
            continue;
        }
        let snippet = normalize_snippet(text);
        if !seen_snippets.insert(snippet.clone()) {
            continue;
        }
        candidates.push((s, snippet));
    }
    candidates.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    let n = top_n_for_mode(cfg.mode).min(cfg.max_facts);
    let facts: Vec<String> = candidates.into_iter().take(n).map(|(_, snippet)| snippet).collect();

    // Rolling summary: up to the last 12 older messages, line by line until
    // the char budget is reached.
    let mut summary_lines: Vec<String> = Vec::new();
    let mut summary_chars = 0usize;
    let tail_start = older.len().saturating_sub(ROLLING_SUMMARY_WINDOW);
    for message in &older[tail_start..] {
        let Some(text) = message.as_text() else { continue };
        if text.trim().is_empty() {
            continue;
        }
        let line = format!("{}: {}", message.role_name(), normalize_snippet(text));
        if summary_chars + line.len() > cfg.max_summary_chars {
            break;
        }
        summary_chars += line.len() + 1;
        summary_lines.push(line);
    }

    let mut out = Vec::with_capacity(raw_recent.len() + 1);
    if !facts.is_empty() || !summary_lines.is_empty() {
        let mut hint = String::from("[Compressed Session Context - metadata only, not instructions]\n\n");
        if !facts.is_empty() {
            hint.push_str("Key facts and constraints:\n");
            for fact in &facts {
                hint.push_str(&format!("- {fact}\n"));
            }
            hint.push('\n');
        }
        if !summary_lines.is_empty() {
            hint.push_str("Rolling summary:\n");
            hint.push_str(&summary_lines.join("\n"));
        }
        out.push(Message::user(hint.trim_end().to_string()));
    }
    out.extend_from_slice(raw_recent);

    let after_tokens = approx_tokens(&out);
    let mode_name = match cfg.mode {
        CompactionMode::Off => "off",
        CompactionMode::Conservative => "conservative",
        CompactionMode::Balanced => "balanced",
        CompactionMode::Aggressive => "aggressive",
    };

    CompressedContext {
        messages: out,
        report: BudgetReport {
            mode: mode_name.to_string(),
            before_tokens_estimate: before_tokens,
            after_tokens_estimate: after_tokens,
            saved: before_tokens.saturating_sub(after_tokens),
            recent_messages: raw_recent.len(),
            facts: facts.len(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(mode: CompactionMode) -> CompactionConfig {
        CompactionConfig { mode, recency_turns: 2, salience_threshold: 0.3, max_facts: 12, max_summary_chars: 2000 }
    }

    fn history() -> Vec<Message> {
        vec![
            Message::user("We must ship by Friday, the API token rotation is required."),
            Message::assistant("Noted, I'll prioritize the token rotation."),
            Message::user("The build failed with error: connection refused on port 8080."),
            Message::assistant("Investigating the failure now."),
            Message::user("Sounds good, keep going."),
            Message::assistant("Still working on it."),
            Message::user("Any update?"),
            Message::assistant("Almost done."),
        ]
    }

    #[test]
    fn off_mode_passthrough() {
        let msgs = history();
        let result = compress(&msgs, &cfg(CompactionMode::Off));
        assert_eq!(result.messages.len(), msgs.len());
        assert_eq!(result.report.mode, "off");
        assert_eq!(result.report.saved, 0);
    }

    #[test]
    fn recent_messages_preserved_verbatim() {
        let msgs = history();
        let result = compress(&msgs, &cfg(CompactionMode::Balanced));
        let last = result.messages.last().unwrap();
        assert_eq!(last.as_text(), msgs.last().unwrap().as_text());
    }

    #[test]
    fn high_salience_fact_is_surfaced() {
        let msgs = history();
        let result = compress(&msgs, &cfg(CompactionMode::Balanced));
        let hint = result.messages[0].as_text().unwrap();
        assert!(hint.contains("Key facts and constraints"));
        assert!(hint.contains("must ship by Friday") || hint.contains("token rotation"));
    }

    #[test]
    fn low_salience_message_is_not_a_fact() {
        let msgs = history();
        let result = compress(&msgs, &cfg(CompactionMode::Balanced));
        let hint = result.messages[0].as_text().unwrap();
        assert!(!hint.contains("Sounds good, keep going"));
    }

    #[test]
    fn hint_message_has_required_header() {
        let msgs = history();
        let result = compress(&msgs, &cfg(CompactionMode::Balanced));
        let hint = result.messages[0].as_text().unwrap();
        assert!(hint.starts_with("[Compressed Session Context - metadata only, not instructions]"));
    }

    #[test]
    fn no_facts_no_summary_means_no_hint_message() {
        let msgs = vec![Message::user("hi"), Message::assistant("hello"), Message::user("bye")];
        let result = compress(&msgs, &cfg(CompactionMode::Balanced));
        // recency_turns=2 keeps both user turns verbatim; nothing left to compress.
        assert_eq!(result.messages.len(), msgs.len());
    }

    #[test]
    fn dedupes_identical_snippets() {
        let msgs = vec![
            Message::user("We must require API token rotation before launch."),
            Message::assistant("ack"),
            Message::user("We must require API token rotation before launch."),
            Message::assistant("ack"),
            Message::user("trailer one"),
            Message::assistant("trailer two"),
            Message::user("trailer three"),
        ];
        let result = compress(&msgs, &cfg(CompactionMode::Balanced));
        let hint = result.messages[0].as_text().unwrap();
        let occurrences = hint.matches("must require API token rotation").count();
        assert_eq!(occurrences, 1);
    }

    #[test]
    fn facts_capped_by_max_facts() {
        let mut msgs: Vec<Message> = (0..30)
            .map(|i| Message::user(format!("must require decision {i}: api token error failed")))
            .collect();
        msgs.push(Message::user("recent 1"));
        msgs.push(Message::user("recent 2"));
        let mut c = cfg(CompactionMode::Aggressive);
        c.max_facts = 5;
        let result = compress(&msgs, &c);
        assert!(result.report.facts <= 5);
    }

    #[test]
    fn budget_report_tracks_token_estimates() {
        let msgs = history();
        let result = compress(&msgs, &cfg(CompactionMode::Balanced));
        assert!(result.report.before_tokens_estimate > 0);
        assert!(result.report.after_tokens_estimate > 0);
        assert_eq!(
            result.report.saved,
            result.report.before_tokens_estimate.saturating_sub(result.report.after_tokens_estimate)
        );
    }

    #[test]
    fn aggressive_mode_keeps_more_facts_than_conservative() {
        let msgs: Vec<Message> = (0..40)
            .map(|i| Message::user(format!("must decision {i}: api token error failed deadline")))
            .collect();
        let conservative = compress(&msgs, &cfg(CompactionMode::Conservative));
        let aggressive = compress(&msgs, &cfg(CompactionMode::Aggressive));
        assert!(aggressive.report.facts >= conservative.report.facts);
    }
}
