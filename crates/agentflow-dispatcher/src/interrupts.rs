// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Wires the orchestrator's `beforeModel`/`beforeTool` hooks to the bus's
//! per-session interrupt queue, so a message that arrives mid-turn (via
//! `MessageBus::publish_event`) reaches the model instead of waiting for
//! the turn to finish.
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use agentflow_bus::MessageBus;
use agentflow_model::{Message, ToolCallRequest};
use agentflow_orchestrator::{BeforeModel, BeforeTool};

/// Drains `bus.check_events(session_key)` before every model call and
/// injects the result as a user message. When an interrupt lands mid-batch,
/// the next `before_tool` call cancels the remaining tool calls in that
/// batch so the loop returns to the model with the interrupt in hand.
pub struct BusInterruptHooks {
    bus: Arc<MessageBus>,
    session_key: String,
    interrupted: Mutex<bool>,
}

impl BusInterruptHooks {
    pub fn new(bus: Arc<MessageBus>, session_key: String) -> Self {
        Self { bus, session_key, interrupted: Mutex::new(false) }
    }
}

#[async_trait]
impl BeforeModel for BusInterruptHooks {
    async fn call(&self, messages: &mut Vec<Message>) {
        if let Some(text) = self.bus.check_events(&self.session_key).await {
            messages.push(Message::user(text));
            *self.interrupted.lock().await = true;
        }
    }
}

#[async_trait]
impl BeforeTool for BusInterruptHooks {
    async fn call(&self, _messages: &[Message], _index: usize, _all_calls: &[ToolCallRequest]) -> bool {
        let mut interrupted = self.interrupted.lock().await;
        if *interrupted {
            *interrupted = false;
            true
        } else {
            false
        }
    }
}
