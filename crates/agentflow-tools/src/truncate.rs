// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use crate::tool::OutputCategory;

/// Approximate chars-per-token ratio shared with `agentflow-model`'s
/// token estimator.
const CHARS_PER_TOKEN: usize = 4;

/// Truncate `content` to roughly fit within `cap_tokens`, dispatching on
/// the tool's declared [`OutputCategory`]. A `cap_tokens` of `0` disables
/// truncation entirely.
pub fn smart_truncate(content: &str, category: OutputCategory, cap_tokens: usize) -> String {
    if cap_tokens == 0 {
        return content.to_string();
    }
    let cap_chars = cap_tokens * CHARS_PER_TOKEN;
    if content.len() <= cap_chars {
        return content.to_string();
    }

    match category {
        OutputCategory::HeadTail => head_tail(content, cap_chars / 2, cap_chars / 2),
        OutputCategory::MatchList => head_lines(content, cap_chars),
        OutputCategory::FileContent => head_tail(content, cap_chars * 3 / 5, cap_chars * 2 / 5),
        OutputCategory::Generic => generic_cut(content, cap_chars),
    }
}

fn head_tail(content: &str, head_budget: usize, tail_budget: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let mut head = String::new();
    let mut head_count = 0;
    for line in &lines {
        if head.len() + line.len() + 1 > head_budget {
            break;
        }
        head.push_str(line);
        head.push('\n');
        head_count += 1;
    }

    let mut tail = String::new();
    let mut tail_count = 0;
    for line in lines.iter().rev() {
        if tail.len() + line.len() + 1 > tail_budget {
            break;
        }
        tail.insert_str(0, &format!("{line}\n"));
        tail_count += 1;
        if head_count + tail_count >= lines.len() {
            break;
        }
    }

    let omitted = lines.len().saturating_sub(head_count + tail_count);
    if omitted == 0 {
        return content.to_string();
    }
    format!("{head}...[{omitted} lines omitted]...\n{tail}").trim_end().to_string()
}

fn head_lines(content: &str, cap_chars: usize) -> String {
    let mut kept = String::new();
    let mut count = 0;
    for line in content.lines() {
        if kept.len() + line.len() + 1 > cap_chars {
            break;
        }
        kept.push_str(line);
        kept.push('\n');
        count += 1;
    }
    let total = content.lines().count();
    let omitted = total.saturating_sub(count);
    if omitted == 0 {
        return content.to_string();
    }
    format!("{}...[{omitted} more matches omitted]...", kept.trim_end())
}

fn generic_cut(content: &str, cap_chars: usize) -> String {
    let cut_at = content[..cap_chars.min(content.len())].rfind('\n').unwrap_or(cap_chars.min(content.len()));
    format!("{}\n...[output truncated]...", &content[..cut_at])
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
