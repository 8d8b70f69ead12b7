// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::Value;

use agentflow_config::AgentMode;

use crate::policy::ApprovalPolicy;

/// A single tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: Value,
}

/// The result of executing a tool. `content` is the plain-text
/// representation the model sees after trust-tagging and truncation are
/// applied by the gateway.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub call_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { call_id: call_id.into(), content: content.into(), is_error: false }
    }

    /// Error content must begin with "Error" so callers can set `ok=false`
    /// on the resulting `ToolTrace`.
    pub fn err(call_id: impl Into<String>, msg: impl Into<String>) -> Self {
        let msg = msg.into();
        let content = if msg.starts_with("Error") { msg } else { format!("Error: {msg}") };
        Self { call_id: call_id.into(), content, is_error: true }
    }
}

/// Describes the shape of a tool's text output, used by `smart_truncate`
/// to pick the extraction strategy when a result exceeds the per-tool
/// output token cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputCategory {
    /// Terminal/process output — keep head and tail lines.
    HeadTail,
    /// Ordered match list (grep/search) — keep the leading matches.
    MatchList,
    /// File content — keep the widest possible head+tail window.
    FileContent,
    /// Hard-cut at the nearest newline before the cap.
    #[default]
    Generic,
}

/// Trait every built-in and user-defined tool implements.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;
    fn default_policy(&self) -> ApprovalPolicy;
    /// Modes this tool is available in. Default: all modes.
    fn modes(&self) -> &[AgentMode] {
        &[AgentMode::Research, AgentMode::Plan, AgentMode::Agent]
    }
    fn output_category(&self) -> OutputCategory {
        OutputCategory::Generic
    }
    async fn execute(&self, call: &ToolCall) -> ToolOutput;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
