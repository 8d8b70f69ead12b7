// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use agentflow_config::AgentMode;

#[derive(Debug, Clone)]
pub struct TodoItem {
    pub id: String,
    pub content: String,
    pub status: String,
}

/// Side-channel events tools emit alongside their text result, consumed by
/// the dispatcher/session layer rather than returned to the model.
#[derive(Debug, Clone)]
pub enum ToolEvent {
    ModeChanged(AgentMode),
    TodoUpdate(Vec<TodoItem>),
}
