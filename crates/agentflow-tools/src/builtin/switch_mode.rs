// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use agentflow_config::AgentMode;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::events::ToolEvent;
use crate::policy::ApprovalPolicy;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Downgrade-only mode switch: Agent -> Plan -> Research. A running agent can
/// restrict its own permissions but never grant itself more than it started
/// with; that escalation has to come from the operator, not the model.
pub struct SwitchModeTool {
    current_mode: Arc<Mutex<AgentMode>>,
    event_tx: mpsc::Sender<ToolEvent>,
}

impl SwitchModeTool {
    pub fn new(current_mode: Arc<Mutex<AgentMode>>, event_tx: mpsc::Sender<ToolEvent>) -> Self {
        Self { current_mode, event_tx }
    }
}

fn downgrade_allowed(from: AgentMode, to: AgentMode) -> bool {
    matches!(
        (from, to),
        (AgentMode::Agent, AgentMode::Plan)
            | (AgentMode::Agent, AgentMode::Research)
            | (AgentMode::Plan, AgentMode::Research)
    )
}

#[async_trait]
impl Tool for SwitchModeTool {
    fn name(&self) -> &str {
        "switch_mode"
    }

    fn description(&self) -> &str {
        "Switch to a more restricted agent mode: agent -> plan -> research. Switching to the \
         same mode is a no-op. Upgrading to a less restricted mode is not permitted from within \
         a running turn."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "mode": { "type": "string", "enum": ["agent", "plan", "research"] }
            },
            "required": ["mode"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let target = match call.args.get("mode").and_then(|v| v.as_str()) {
            Some("agent") => AgentMode::Agent,
            Some("plan") => AgentMode::Plan,
            Some("research") => AgentMode::Research,
            Some(other) => return ToolOutput::err(&call.id, format!("unknown mode '{other}'")),
            None => return ToolOutput::err(&call.id, "missing required parameter 'mode'"),
        };

        let mut current = self.current_mode.lock().await;
        debug!(from = ?*current, to = ?target, "switch_mode tool");

        if *current == target {
            return ToolOutput::ok(&call.id, format!("already in {target:?} mode"));
        }

        if !downgrade_allowed(*current, target) {
            return ToolOutput::err(
                &call.id,
                format!("cannot switch from {:?} to {:?}: upgrading modes is not allowed", *current, target),
            );
        }

        let from = *current;
        *current = target;
        let _ = self.event_tx.send(ToolEvent::ModeChanged(target)).await;
        ToolOutput::ok(&call.id, format!("switched from {from:?} to {target:?} mode"))
    }
}
