// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::policy::ApprovalPolicy;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};

/// Broad, low-friction codebase search. Distinct from `grep` in that it
/// carries standard codebase exclusions out of the box and is the tool
/// name the dedup/loop-guard watches for repeated-search detection.
pub struct SearchTool;

static EXCLUDE_GLOBS: &[&str] = &["!.git/*", "!target/*", "!node_modules/*", "!dist/*", "!__pycache__/*", "!*.lock"];

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Search the codebase for a term or pattern. Use this first when exploring an unfamiliar \
         area; use grep once you know the exact symbol or string to match. Automatically excludes \
         .git/, target/, node_modules/, dist/, __pycache__/, and lockfiles."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Term, symbol, or regex pattern to search for" },
                "path": { "type": "string", "description": "Directory to search under (default: current directory)" },
                "limit": { "type": "integer", "description": "Maximum number of matches to return (default 50)" }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }
    fn output_category(&self) -> OutputCategory {
        OutputCategory::MatchList
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let query = match call.args.get("query").and_then(|v| v.as_str()) {
            Some(q) => q.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'query'"),
        };
        let path = call.args.get("path").and_then(|v| v.as_str()).unwrap_or(".").to_string();
        let limit = call.args.get("limit").and_then(|v| v.as_u64()).unwrap_or(50) as usize;

        debug!(query = %query, path = %path, "search tool");

        match run_search(&query, &path, limit).await {
            Ok(output) if output.trim().is_empty() => ToolOutput::ok(&call.id, "(no matches)"),
            Ok(output) => ToolOutput::ok(&call.id, output),
            Err(e) => ToolOutput::err(&call.id, format!("search error: {e}")),
        }
    }
}

async fn run_search(query: &str, path: &str, limit: usize) -> anyhow::Result<String> {
    let has_rg = tokio::process::Command::new("which")
        .arg("rg")
        .stdin(std::process::Stdio::null())
        .output()
        .await
        .map(|o| o.status.success())
        .unwrap_or(false);

    let output = if has_rg {
        let mut args = vec!["--color".to_string(), "never".to_string(), "--no-heading".to_string(), "-n".to_string()];
        for glob in EXCLUDE_GLOBS {
            args.push("-g".to_string());
            args.push(glob.to_string());
        }
        args.push(query.to_string());
        args.push(path.to_string());
        tokio::process::Command::new("rg").args(&args).stdin(std::process::Stdio::null()).output().await?
    } else {
        let escaped = query.replace('\'', "'\\''");
        let excludes =
            "--exclude-dir=.git --exclude-dir=target --exclude-dir=node_modules --exclude-dir=dist --exclude-dir=__pycache__ --exclude=*.lock";
        let cmd = format!("grep -rn {excludes} '{escaped}' {path}");
        tokio::process::Command::new("sh").arg("-c").arg(&cmd).stdin(std::process::Stdio::null()).output().await?
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().take(limit).collect();
    let mut result = lines.join("\n");
    let total = stdout.lines().count();
    if total > limit {
        result.push_str(&format!("\n...[{} more matches not shown — narrow your query or pass path=]", total - limit));
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tool::{Tool, ToolCall};

    fn call(args: serde_json::Value) -> ToolCall {
        ToolCall { id: "s1".into(), name: "search".into(), args }
    }

    #[tokio::test]
    async fn finds_term_in_file() {
        use std::sync::atomic::{AtomicU32, Ordering};
        static CTR: AtomicU32 = AtomicU32::new(0);
        let n = CTR.fetch_add(1, Ordering::Relaxed);
        let path = format!("/tmp/agentflow_search_test_{}_{n}.rs", std::process::id());
        std::fs::write(&path, "fn dispatch_task() {}\n").unwrap();

        let out = SearchTool.execute(&call(json!({"query": "dispatch_task", "path": path.clone()}))).await;
        assert!(!out.is_error, "{}", out.content);
        assert!(out.content.contains("dispatch_task"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn no_match_returns_no_matches() {
        let out = SearchTool.execute(&call(json!({"query": "xyzzy_absolutely_not_present_999", "path": "/tmp"}))).await;
        assert!(!out.is_error);
        assert!(out.content.contains("no matches"));
    }

    #[tokio::test]
    async fn missing_query_is_error() {
        let out = SearchTool.execute(&call(json!({}))).await;
        assert!(out.is_error);
    }

    #[test]
    fn name_is_search() {
        assert_eq!(SearchTool.name(), "search");
    }
}
