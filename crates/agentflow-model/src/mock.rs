// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Deterministic provider test doubles.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::provider::Provider;
use crate::types::{ChatRequest, LlmResponse, Message, Usage};

/// Echoes the last user message back as the assistant response. Never
/// requests a tool call.
#[derive(Default)]
pub struct EchoProvider;

#[async_trait]
impl Provider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    async fn chat(&self, req: ChatRequest) -> anyhow::Result<LlmResponse> {
        let reply = req
            .messages
            .iter()
            .rev()
            .find_map(|m| matches!(m, Message::User { .. }).then(|| m.as_text()).flatten())
            .unwrap_or("")
            .to_string();
        Ok(LlmResponse {
            content: Some(reply),
            tool_calls: Vec::new(),
            reasoning_content: None,
            usage: Usage { prompt: 1, completion: 1, total: 2 },
            finish_reason: "stop".into(),
        })
    }
}

/// Replays a fixed sequence of canned responses, one per call, for testing
/// the orchestrator's iteration logic. Panics if called more times than
/// there are scripted responses.
pub struct ScriptedProvider {
    responses: Mutex<Vec<LlmResponse>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<LlmResponse>) -> Self {
        // Reverse once so `pop()` yields them in call order.
        let mut responses = responses;
        responses.reverse();
        Self { responses: Mutex::new(responses) }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, _req: ChatRequest) -> anyhow::Result<LlmResponse> {
        let mut guard = self.responses.lock().unwrap();
        guard.pop().ok_or_else(|| anyhow::anyhow!("ScriptedProvider ran out of responses"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_provider_returns_last_user_text() {
        let provider = EchoProvider;
        let req = ChatRequest { messages: vec![Message::user("hello there")], ..Default::default() };
        let resp = provider.chat(req).await.unwrap();
        assert_eq!(resp.content.as_deref(), Some("hello there"));
        assert!(!resp.has_tool_calls());
    }

    #[tokio::test]
    async fn scripted_provider_replays_in_order() {
        let provider = ScriptedProvider::new(vec![
            LlmResponse { content: Some("first".into()), ..Default::default() },
            LlmResponse { content: Some("second".into()), ..Default::default() },
        ]);
        let r1 = provider.chat(ChatRequest::default()).await.unwrap();
        let r2 = provider.chat(ChatRequest::default()).await.unwrap();
        assert_eq!(r1.content.as_deref(), Some("first"));
        assert_eq!(r2.content.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn scripted_provider_errors_when_exhausted() {
        let provider = ScriptedProvider::new(vec![]);
        assert!(provider.chat(ChatRequest::default()).await.is_err());
    }
}
