// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message from a channel to the agent.
///
/// `session_key` is immutable after construction except for the lazy
/// `run_id`/`turn_id` assignment the dispatcher performs on first dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub channel: String,
    pub sender_id: String,
    pub chat_id: String,
    pub content: String,
    #[serde(default)]
    pub media: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub session_key_override: Option<String>,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub turn_id: Option<String>,
}

impl InboundMessage {
    pub fn new(channel: impl Into<String>, sender_id: impl Into<String>, chat_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            sender_id: sender_id.into(),
            chat_id: chat_id.into(),
            content: content.into(),
            media: Vec::new(),
            metadata: HashMap::new(),
            timestamp: chrono::Utc::now(),
            session_key_override: None,
            run_id: None,
            turn_id: None,
        }
    }

    pub fn session_key(&self) -> String {
        self.session_key_override.clone().unwrap_or_else(|| format!("{}:{}", self.channel, self.chat_id))
    }
}

/// A message from the agent back to a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub channel: String,
    pub chat_id: String,
    pub content: String,
    #[serde(default)]
    pub media: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    pub run_id: String,
    pub turn_id: String,
}

impl OutboundMessage {
    /// `true` when this is a transient progress frame, discardable by `/stop`.
    pub fn is_progress(&self) -> bool {
        matches!(self.metadata.get("_progress"), Some(Value::Bool(true)))
    }

    pub fn is_tool_hint(&self) -> bool {
        matches!(self.metadata.get("_tool_hint"), Some(Value::Bool(true)))
    }
}

/// Severity of a diagnostic event, carried straight into the JSONL sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

/// A structured diagnostic event, correlated to a session/run/turn where
/// applicable. Field order is not semantically significant and unknown
/// fields must be ignored by readers (the sink serializes as a flat map).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    pub event_id: String,
    pub ts: chrono::DateTime<chrono::Utc>,
    pub name: String,
    pub component: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub attrs: HashMap<String, Value>,
}

impl DiagnosticEvent {
    pub fn new(name: impl Into<String>, component: impl Into<String>, severity: Severity) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            ts: chrono::Utc::now(),
            name: name.into(),
            component: component.into(),
            severity,
            session_key: None,
            channel: None,
            chat_id: None,
            run_id: None,
            turn_id: None,
            operation: None,
            status: None,
            latency_ms: None,
            error_code: None,
            error_message: None,
            attrs: HashMap::new(),
        }
    }

    pub fn with_session(mut self, session_key: impl Into<String>) -> Self {
        self.session_key = Some(session_key.into());
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>, chat_id: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self.chat_id = Some(chat_id.into());
        self
    }

    pub fn with_correlation(mut self, run_id: Option<String>, turn_id: Option<String>) -> Self {
        self.run_id = run_id;
        self.turn_id = turn_id;
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }
}
