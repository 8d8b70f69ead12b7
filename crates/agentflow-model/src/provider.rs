// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;

use crate::types::{ChatRequest, LlmResponse};

/// A model backend the orchestrator can call.
///
/// Deliberately non-streaming: the orchestrator only needs a discrete
/// `LlmResponse` per iteration, and the runtime surfaces progress via
/// discrete progress frames rather than token deltas.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    async fn chat(&self, req: ChatRequest) -> anyhow::Result<LlmResponse>;
}
