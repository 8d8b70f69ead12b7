// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use serde_json::{json, Value};
use similar::{ChangeTag, TextDiff};
use tracing::debug;

use agentflow_config::AgentMode;

use crate::policy::ApprovalPolicy;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Minimum similarity ratio (0-1) for a fuzzy window to be accepted.
const FUZZY_THRESHOLD: f64 = 0.85;

// ── Hunk data structures ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum HunkLine {
    Context(String),
    Del(String),
    Add(String),
}

#[derive(Debug, Clone)]
struct Hunk {
    old_start_hint: Option<usize>,
    lines: Vec<HunkLine>,
}

impl Hunk {
    fn search_lines(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|l| match l {
                HunkLine::Context(s) | HunkLine::Del(s) => Some(s.as_str()),
                HunkLine::Add(_) => None,
            })
            .collect()
    }
}

// ── Parsing ──────────────────────────────────────────────────────────────────

fn strip_markdown_fence(diff: &str) -> &str {
    let t = diff.trim_start();
    if t.starts_with("```") {
        if let Some(nl) = t.find('\n') {
            let body = &t[nl + 1..];
            if let Some(close) = body.rfind("\n```") {
                return &body[..close + 1];
            }
            return body;
        }
    }
    diff
}

/// Parse unified diff hunks. Accepts standard `@@ -N,M +N,M @@` headers,
/// bare `@@ @@` headers (no line numbers), and diffs wrapped in markdown
/// ```diff fences.
fn parse_hunks(diff: &str) -> Result<Vec<Hunk>, String> {
    let diff = strip_markdown_fence(diff);
    let mut hunks: Vec<Hunk> = Vec::new();
    let mut current: Option<Hunk> = None;

    for line in diff.lines() {
        if line.starts_with("--- ") || line.starts_with("+++ ") || line.starts_with("\\ ") {
            continue;
        }
        if line.starts_with("@@") {
            if let Some(h) = current.take() {
                if !h.lines.is_empty() {
                    hunks.push(h);
                }
            }
            current = Some(Hunk { old_start_hint: parse_old_start(line), lines: Vec::new() });
            continue;
        }
        if let Some(ref mut h) = current {
            if let Some(rest) = line.strip_prefix(' ') {
                h.lines.push(HunkLine::Context(rest.to_string()));
            } else if let Some(rest) = line.strip_prefix('-') {
                h.lines.push(HunkLine::Del(rest.to_string()));
            } else if let Some(rest) = line.strip_prefix('+') {
                h.lines.push(HunkLine::Add(rest.to_string()));
            } else if line.is_empty() {
                h.lines.push(HunkLine::Context(String::new()));
            }
        }
    }
    if let Some(h) = current {
        if !h.lines.is_empty() {
            hunks.push(h);
        }
    }
    if hunks.is_empty() {
        return Err("No hunks found in diff. Use @@ headers.".to_string());
    }
    Ok(hunks)
}

fn parse_old_start(header: &str) -> Option<usize> {
    let inner = header.trim_start_matches('@').trim().split("@@").next().unwrap_or("").trim();
    for part in inner.split_whitespace() {
        if let Some(rest) = part.strip_prefix('-') {
            if let Ok(n) = rest.split(',').next().unwrap_or(rest).parse::<usize>() {
                return Some(n);
            }
        }
    }
    None
}

// ── Matching helpers ─────────────────────────────────────────────────────────

fn similarity_ratio(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let diff = TextDiff::from_chars(a, b);
    let matching: usize =
        diff.iter_all_changes().filter(|c| c.tag() == ChangeTag::Equal).map(|c| c.value().len()).sum();
    (matching * 2) as f64 / total as f64
}

fn common_indent(lines: &[&str]) -> usize {
    lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0)
}

fn strip_indent(lines: &[&str], indent: usize) -> Vec<String> {
    lines.iter().map(|l| if l.len() >= indent { l[indent..].to_string() } else { l.trim_start().to_string() }).collect()
}

/// Locate `search_lines` within `file_lines`, trying exact match, then
/// indent-normalised match, then fuzzy match (>= `FUZZY_THRESHOLD`).
/// Returns `(position, indent_delta)`.
fn find_hunk_position(file_lines: &[String], search_lines: &[&str], hint: Option<usize>) -> Result<(usize, i64), String> {
    if search_lines.is_empty() {
        let pos = hint.map(|h| h.saturating_sub(1).min(file_lines.len())).unwrap_or(file_lines.len());
        return Ok((pos, 0));
    }

    let n = search_lines.len();
    let file_refs: Vec<&str> = file_lines.iter().map(String::as_str).collect();
    if file_refs.len() < n {
        return Err(format!("File has {} lines but hunk needs {} context/deletion lines.", file_refs.len(), n));
    }

    let exact: Vec<usize> = (0..=(file_refs.len() - n)).filter(|&i| file_refs[i..i + n] == *search_lines).collect();
    if !exact.is_empty() {
        return Ok((pick_best(&exact, hint), 0));
    }

    let hunk_indent = common_indent(search_lines) as i64;
    let norm_search = strip_indent(search_lines, hunk_indent as usize);
    let norm_refs: Vec<&str> = norm_search.iter().map(String::as_str).collect();
    let indent_hits: Vec<(usize, i64)> = (0..=(file_refs.len() - n))
        .filter_map(|i| {
            let win = &file_refs[i..i + n];
            let file_ind = common_indent(win) as i64;
            let norm_win = strip_indent(win, file_ind as usize);
            let norm_win_refs: Vec<&str> = norm_win.iter().map(String::as_str).collect();
            (norm_win_refs == norm_refs).then_some((i, file_ind - hunk_indent))
        })
        .collect();
    if !indent_hits.is_empty() {
        let positions: Vec<usize> = indent_hits.iter().map(|(p, _)| *p).collect();
        let best = pick_best(&positions, hint);
        let delta = indent_hits.iter().find(|(p, _)| *p == best).map(|(_, d)| *d).unwrap_or(0);
        return Ok((best, delta));
    }

    let search_joined = search_lines.join("\n");
    let fuzzy_hits: Vec<(f64, usize, i64)> = (0..=(file_refs.len() - n))
        .filter_map(|i| {
            let win = &file_refs[i..i + n];
            let ratio = similarity_ratio(&search_joined, &win.join("\n"));
            (ratio >= FUZZY_THRESHOLD).then(|| (ratio, i, common_indent(win) as i64 - hunk_indent))
        })
        .collect();
    if !fuzzy_hits.is_empty() {
        let best_ratio = fuzzy_hits.iter().map(|(r, _, _)| *r).fold(0.0_f64, f64::max);
        let best_hits: Vec<_> = fuzzy_hits.iter().filter(|(r, _, _)| (r - best_ratio).abs() < 1e-9).collect();
        let positions: Vec<usize> = best_hits.iter().map(|(_, p, _)| *p).collect();
        let best = pick_best(&positions, hint);
        let delta = best_hits.iter().find(|(_, p, _)| *p == best).map(|(_, _, d)| *d).unwrap_or(0);
        return Ok((best, delta));
    }

    let mut msg = String::from("Context not found. Expected:\n");
    for l in search_lines {
        msg.push_str(&format!("  |{l}|\n"));
    }
    if let Some((ratio, line_no, block)) = find_similar_blocks(&file_refs, search_lines, 1).into_iter().next() {
        msg.push_str(&format!("Nearest match at line {line_no} ({:.0}%):\n", ratio * 100.0));
        for l in &block {
            msg.push_str(&format!("  |{l}|\n"));
        }
    }
    msg.push_str("Re-read the file, fix the context lines, and retry.");
    Err(msg)
}

fn pick_best(matches: &[usize], hint: Option<usize>) -> usize {
    if matches.len() == 1 {
        return matches[0];
    }
    if let Some(h) = hint {
        let target = h.saturating_sub(1);
        return *matches.iter().min_by_key(|&&p| (p as isize - target as isize).unsigned_abs()).unwrap_or(&matches[0]);
    }
    matches[0]
}

fn find_similar_blocks(file_lines: &[&str], search_lines: &[&str], limit: usize) -> Vec<(f64, usize, Vec<String>)> {
    let n = search_lines.len().max(1);
    if file_lines.len() < n {
        return vec![];
    }
    let search_joined = search_lines.join("\n");
    let mut candidates: Vec<(f64, usize, Vec<String>)> = file_lines
        .windows(n)
        .enumerate()
        .map(|(i, win)| (similarity_ratio(&search_joined, &win.join("\n")), i + 1, win.iter().map(|s| s.to_string()).collect()))
        .filter(|(r, _, _)| *r > 0.3)
        .collect();
    candidates.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    candidates.truncate(limit);
    candidates
}

// ── Hunk application ─────────────────────────────────────────────────────────

fn adjust_indent(line: &str, delta: i64) -> String {
    if delta == 0 || line.trim().is_empty() {
        return line.to_string();
    }
    if delta > 0 {
        format!("{}{line}", " ".repeat(delta as usize))
    } else {
        let remove = (-delta) as usize;
        if line.len() >= remove && line[..remove].bytes().all(|b| b == b' ') {
            line[remove..].to_string()
        } else {
            line.trim_start_matches(' ').to_string()
        }
    }
}

fn apply_hunk(file_lines: &[String], hunk: &Hunk, pos: usize, indent_delta: i64) -> Vec<String> {
    let mut result = file_lines[..pos].to_vec();
    let mut file_idx = pos;
    for hl in &hunk.lines {
        match hl {
            HunkLine::Context(_) => {
                result.push(file_lines[file_idx].clone());
                file_idx += 1;
            }
            HunkLine::Del(_) => {
                file_idx += 1;
            }
            HunkLine::Add(s) => {
                result.push(adjust_indent(s, indent_delta));
            }
        }
    }
    result.extend_from_slice(&file_lines[file_idx..]);
    result
}

// ── Tool ─────────────────────────────────────────────────────────────────────

pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Edit a file by applying unified diff hunks.\n\
         Each hunk starts with @@ (line numbers optional, used only to break ties):\n\
           @@ -OLD_LINE,COUNT +NEW_LINE,COUNT @@\n\
            context line          (space prefix, unchanged)\n\
           -removed line          (minus prefix, deleted)\n\
           +added line            (plus prefix, inserted)\n\
            context line\n\
         Include 2-3 unchanged context lines around every change; indentation\n\
         differences are corrected automatically. Multiple @@ hunks apply at\n\
         separate locations. Diffs wrapped in ```diff fences are accepted.\n\
         Re-read the file after any previous edit before writing new context."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Absolute or relative path to the file to edit" },
                "diff": {
                    "type": "string",
                    "description": "Unified diff hunks to apply. Each hunk starts with @@. Include 2-3 context lines."
                }
            },
            "required": ["path", "diff"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Ask
    }

    fn modes(&self) -> &[AgentMode] {
        &[AgentMode::Agent]
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = match call.args.get("path").and_then(|v| v.as_str()) {
            Some(s) => s.to_string(),
            None => return ToolOutput::err(&call.id, "Missing required parameter: path"),
        };
        let diff_str = match call.args.get("diff").and_then(|v| v.as_str()) {
            Some(s) => s.to_string(),
            None => return ToolOutput::err(&call.id, "Missing required parameter: diff"),
        };

        debug!(path = %path, "edit_file tool");

        let hunks = match parse_hunks(&diff_str) {
            Ok(h) => h,
            Err(e) => return ToolOutput::err(&call.id, e),
        };

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(&call.id, format!("read error: {e}")),
        };

        let had_trailing_newline = content.ends_with('\n');
        let mut file_lines: Vec<String> = content.lines().map(str::to_string).collect();

        for (idx, hunk) in hunks.iter().enumerate() {
            let search = hunk.search_lines();
            match find_hunk_position(&file_lines, &search, hunk.old_start_hint) {
                Ok((pos, delta)) => file_lines = apply_hunk(&file_lines, hunk, pos, delta),
                Err(e) => {
                    let prefix = if hunks.len() > 1 { format!("Hunk {}: ", idx + 1) } else { String::new() };
                    return ToolOutput::err(&call.id, format!("{prefix}{e}"));
                }
            }
        }

        let mut new_content = file_lines.join("\n");
        if had_trailing_newline {
            new_content.push('\n');
        }

        if let Some(parent) = std::path::Path::new(&path).parent() {
            if !parent.as_os_str().is_empty() {
                let _ = tokio::fs::create_dir_all(parent).await;
            }
        }

        match tokio::fs::write(&path, &new_content).await {
            Ok(_) => ToolOutput::ok(&call.id, "Edit successfully applied"),
            Err(e) => ToolOutput::err(&call.id, format!("Write failed: {e}")),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tool::{Tool, ToolCall};

    fn call(args: serde_json::Value) -> ToolCall {
        ToolCall { id: "e1".into(), name: "edit_file".into(), args }
    }

    fn tmp_file(content: &str) -> String {
        use std::sync::atomic::{AtomicU32, Ordering};
        static CTR: AtomicU32 = AtomicU32::new(0);
        let n = CTR.fetch_add(1, Ordering::Relaxed);
        let path = format!("/tmp/agentflow_edit_test_{}_{n}.txt", std::process::id());
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn missing_path_is_error() {
        let out = EditFileTool.execute(&call(json!({"diff": "@@ @@\n-a\n+b\n"}))).await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn no_hunks_in_diff_is_error() {
        let path = tmp_file("hello\n");
        let out = EditFileTool.execute(&call(json!({"path": path, "diff": "no markers here"}))).await;
        assert!(out.is_error);
        assert!(out.content.contains("No hunks"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn basic_replacement() {
        let path = tmp_file("fn foo() {\n    old();\n}\n");
        let out = EditFileTool
            .execute(&call(json!({"path": path, "diff": "@@ -1,3 +1,3 @@\n fn foo() {\n-    old();\n+    new();\n }\n"})))
            .await;
        assert!(!out.is_error, "{}", out.content);
        let result = std::fs::read_to_string(&path).unwrap();
        assert!(result.contains("new()") && !result.contains("old()"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn context_not_found_is_error() {
        let path = tmp_file("fn foo() {\n    bar();\n}\n");
        let out = EditFileTool
            .execute(&call(json!({"path": path, "diff": "@@ @@\n fn foo() {\n-    completely_different();\n+    new();\n }\n"})))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("Context not found"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn trailing_newline_preserved() {
        let path = tmp_file("line one\nline two\nline three\n");
        let out = EditFileTool
            .execute(&call(json!({"path": path, "diff": "@@ @@\n line one\n-line two\n+line 2\n line three\n"})))
            .await;
        assert!(!out.is_error, "{}", out.content);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "line one\nline 2\nline three\n");
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn no_trailing_newline_preserved() {
        let path = tmp_file("alpha\nbeta\ngamma");
        let out = EditFileTool.execute(&call(json!({"path": path, "diff": "@@ @@\n alpha\n-beta\n+BETA\n gamma\n"}))).await;
        assert!(!out.is_error, "{}", out.content);
        let result = std::fs::read_to_string(&path).unwrap();
        assert!(!result.ends_with('\n'));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn multi_hunk_applies_both_changes() {
        let path = tmp_file("use std::io;\n\nfn alpha() {\n    a();\n}\n\nfn beta() {\n    b();\n}\n");
        let diff = concat!(
            "@@ @@\n fn alpha() {\n-    a();\n+    alpha_new();\n }\n",
            "@@ @@\n fn beta() {\n-    b();\n+    beta_new();\n }\n",
        );
        let out = EditFileTool.execute(&call(json!({"path": path, "diff": diff}))).await;
        assert!(!out.is_error, "{}", out.content);
        let result = std::fs::read_to_string(&path).unwrap();
        assert!(result.contains("alpha_new()") && result.contains("beta_new()"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn indent_normalised_match() {
        let path = tmp_file("    fn foo() {\n        old();\n    }\n");
        let diff = "@@ @@\n fn foo() {\n-    old();\n+    new();\n }\n";
        let out = EditFileTool.execute(&call(json!({"path": path, "diff": diff}))).await;
        assert!(!out.is_error, "{}", out.content);
        let result = std::fs::read_to_string(&path).unwrap();
        assert!(result.contains("new()") && !result.contains("old()"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn fuzzy_match_corrects_minor_typo_in_context() {
        let path = tmp_file("fn process(id: u64) {\n    validate(id);\n    update(id);\n}\n");
        let diff = "@@ @@\n fn process(id: u32) {\n     validate(id);\n-    update(id);\n+    update(id);\n+    log(id);\n }\n";
        let out = EditFileTool.execute(&call(json!({"path": path, "diff": diff}))).await;
        assert!(!out.is_error, "{}", out.content);
        assert!(std::fs::read_to_string(&path).unwrap().contains("log(id)"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn line_number_hint_picks_correct_duplicate() {
        let path = tmp_file("fn block() {\n    value = 1;\n}\n\nfn block() {\n    value = 1;\n}\n");
        let diff = "@@ -5,3 +5,3 @@\n fn block() {\n-    value = 1;\n+    value = 2;\n }\n";
        let out = EditFileTool.execute(&call(json!({"path": path, "diff": diff}))).await;
        assert!(!out.is_error, "{}", out.content);
        let result = std::fs::read_to_string(&path).unwrap();
        assert!(result.find("value = 1;").unwrap() < result.find("value = 2;").unwrap());
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn markdown_fenced_diff_is_accepted() {
        let path = tmp_file("fn foo() { bar(); }\n");
        let diff = "```diff\n@@ @@\n-fn foo() { bar(); }\n+fn foo() { baz(); }\n```\n";
        let out = EditFileTool.execute(&call(json!({"path": path, "diff": diff}))).await;
        assert!(!out.is_error, "{}", out.content);
        assert!(std::fs::read_to_string(&path).unwrap().contains("baz()"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn second_hunk_failure_names_hunk_and_file_is_unchanged() {
        let path = tmp_file("line1\nline2\nline3\n");
        let diff = concat!("@@ @@\n-line1\n+LINE1\n line2\n", "@@ @@\n-does_not_exist\n+X\n");
        let out = EditFileTool.execute(&call(json!({"path": path, "diff": diff}))).await;
        assert!(out.is_error);
        assert!(out.content.contains("Hunk 2"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "line1\nline2\nline3\n");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn only_available_in_agent_mode() {
        assert_eq!(EditFileTool.modes(), &[AgentMode::Agent]);
    }

    #[test]
    fn parse_old_start_standard() {
        assert_eq!(parse_old_start("@@ -5,7 +5,6 @@"), Some(5));
        assert_eq!(parse_old_start("@@ @@"), None);
    }

    #[test]
    fn similarity_ratio_bounds() {
        assert_eq!(similarity_ratio("hello", "hello"), 1.0);
        assert!(similarity_ratio("aaaa", "bbbb") < 0.1);
    }

    #[test]
    fn common_indent_and_strip() {
        let lines: &[&str] = &["    foo", "        bar", "    baz"];
        assert_eq!(common_indent(lines), 4);
        assert_eq!(strip_indent(&["    foo", "        bar"], 4), vec!["foo", "    bar"]);
    }
}
