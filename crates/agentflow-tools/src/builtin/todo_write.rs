// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::events::{TodoItem, ToolEvent};
use crate::policy::ApprovalPolicy;
use crate::tool::{Tool, ToolCall, ToolOutput};

static VALID_STATUSES: &[&str] = &["pending", "in_progress", "completed", "cancelled"];

#[derive(Debug, Deserialize)]
struct TodoInput {
    id: String,
    content: String,
    status: String,
}

/// Full-list-replace todo tracker. The model resends the complete list on
/// every call; there is no incremental add/remove operation.
pub struct TodoWriteTool {
    todos: Arc<Mutex<Vec<TodoItem>>>,
    event_tx: mpsc::Sender<ToolEvent>,
}

impl TodoWriteTool {
    pub fn new(event_tx: mpsc::Sender<ToolEvent>) -> Self {
        Self { todos: Arc::new(Mutex::new(Vec::new())), event_tx }
    }
}

pub fn format_todos(todos: &[TodoItem]) -> String {
    todos
        .iter()
        .map(|t| {
            let icon = match t.status.as_str() {
                "completed" => "✓",
                "in_progress" => "→",
                "cancelled" => "✗",
                _ => "○",
            };
            format!("{icon} {}", t.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Tool for TodoWriteTool {
    fn name(&self) -> &str {
        "todo_write"
    }

    fn description(&self) -> &str {
        "Replace the current todo list with the full updated list. Always send every item, not \
         just the ones that changed. At most one item may be 'in_progress' at a time. Use for \
         multi-step tasks to track progress visibly; skip it for trivial single-step work."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "todos": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string" },
                            "content": { "type": "string" },
                            "status": { "type": "string", "enum": ["pending", "in_progress", "completed", "cancelled"] }
                        },
                        "required": ["id", "content", "status"]
                    }
                }
            },
            "required": ["todos"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let raw = match call.args.get("todos") {
            Some(v) => v.clone(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'todos'"),
        };
        let inputs: Vec<TodoInput> = match serde_json::from_value(raw) {
            Ok(v) => v,
            Err(e) => return ToolOutput::err(&call.id, format!("invalid todos: {e}")),
        };

        for t in &inputs {
            if !VALID_STATUSES.contains(&t.status.as_str()) {
                return ToolOutput::err(&call.id, format!("invalid status '{}', expected one of {VALID_STATUSES:?}", t.status));
            }
        }

        let in_progress_count = inputs.iter().filter(|t| t.status == "in_progress").count();
        if in_progress_count > 1 {
            return ToolOutput::err(&call.id, "at most one todo can be 'in_progress' at a time");
        }

        let items: Vec<TodoItem> =
            inputs.into_iter().map(|t| TodoItem { id: t.id, content: t.content, status: t.status }).collect();

        debug!(count = items.len(), "todo_write tool");

        *self.todos.lock().await = items.clone();
        let _ = self.event_tx.send(ToolEvent::TodoUpdate(items.clone())).await;

        ToolOutput::ok(&call.id, format_todos(&items))
    }
}
