// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
pub mod mock;
pub mod provider;
pub mod types;

pub use mock::{EchoProvider, ScriptedProvider};
pub use provider::Provider;
pub use types::{
    ChatRequest, ContentPart, LlmResponse, Message, ToolCallRequest, ToolContentPart, ToolSchema,
    ToolResultContent, Usage,
};
