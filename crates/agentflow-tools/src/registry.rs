// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use agentflow_config::{AgentMode, ToolsConfig};

use crate::tool::{Tool, ToolCall, ToolOutput};
use crate::truncate::smart_truncate;
use crate::trust::{tag_content, TrustLevel};

#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Execution trace for one tool call, as persisted into session history
/// and the observability sink.
#[derive(Debug, Clone)]
pub struct ToolTrace {
    pub name: String,
    pub arguments: serde_json::Value,
    pub result_preview: String,
    pub ok: bool,
}

/// Central registry of available tools plus the invocation gateway:
/// trust-tags and truncates tool output before it reaches the model.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    tool_result_token_cap: usize,
    trust_tagging: bool,
}

impl ToolRegistry {
    pub fn new(cfg: &ToolsConfig) -> Self {
        Self {
            tools: HashMap::new(),
            tool_result_token_cap: cfg.tool_result_token_cap,
            trust_tagging: cfg.trust_tagging,
        }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn schemas_for_mode(&self, mode: AgentMode) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .filter(|t| t.modes().contains(&mode))
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    pub fn names_for_mode(&self, mode: AgentMode) -> Vec<String> {
        let mut names: Vec<String> =
            self.tools.values().filter(|t| t.modes().contains(&mode)).map(|t| t.name().to_string()).collect();
        names.sort();
        names
    }

    /// Execute a tool call and return the model-facing text plus its trace.
    /// Non-system tool output is wrapped in `UNTRUSTED` boundary markers
    /// and passed through `smart_truncate` before returning.
    pub async fn invoke(&self, call: &ToolCall) -> (String, ToolTrace) {
        let output = match self.tools.get(&call.name) {
            Some(tool) => {
                let raw = tool.execute(call).await;
                self.finalize(&call.name, tool.output_category(), raw)
            }
            None => ToolOutput::err(&call.id, format!("unknown tool: {}", call.name)),
        };

        let preview: String = output.content.chars().take(200).collect();
        let trace = ToolTrace {
            name: call.name.clone(),
            arguments: call.args.clone(),
            result_preview: preview,
            ok: !output.is_error,
        };
        (output.content, trace)
    }

    fn finalize(&self, name: &str, category: crate::tool::OutputCategory, output: ToolOutput) -> ToolOutput {
        let truncated = smart_truncate(&output.content, category, self.tool_result_token_cap);
        let content = if self.trust_tagging {
            tag_content(TrustLevel::Untrusted, &format!("tool:{name}"), &truncated)
        } else {
            truncated
        };
        ToolOutput { call_id: output.call_id, content, is_error: output.is_error }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
