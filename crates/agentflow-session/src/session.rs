// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agentflow_model::Message;

/// Per-session flags that survive a turn but are not part of the message log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMetadata {
    #[serde(default)]
    pub plan_mode: bool,
    #[serde(default)]
    pub doctor_mode: bool,
    #[serde(default)]
    pub doctor_codex_session_id: Option<String>,
}

/// One conversation thread, keyed by `"<channel>:<chat_id>"` (or an override).
///
/// Invariants: `0 <= last_consolidated <= messages.len()`; `push` only ever
/// grows `messages`; `clear()` truncates to empty and resets
/// `last_consolidated` to 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub key: String,
    pub messages: Vec<Message>,
    pub last_consolidated: usize,
    #[serde(default)]
    pub metadata: SessionMetadata,
    pub updated_at: DateTime<Utc>,
    /// Approximate total token count for `messages`, kept in sync by `push`
    /// and `replace_messages` so the dispatcher can check context pressure
    /// without re-walking the whole history on every turn.
    #[serde(default)]
    pub token_count: usize,
}

impl Session {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            messages: Vec::new(),
            last_consolidated: 0,
            metadata: SessionMetadata::default(),
            updated_at: Utc::now(),
            token_count: 0,
        }
    }

    pub fn push(&mut self, message: Message) {
        self.token_count += message.approx_tokens();
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    pub fn push_many(&mut self, messages: impl IntoIterator<Item = Message>) {
        for m in messages {
            self.push(m);
        }
    }

    /// Number of messages appended since the last consolidation pass.
    pub fn uncompacted_len(&self) -> usize {
        self.messages.len().saturating_sub(self.last_consolidated)
    }

    pub fn needs_consolidation(&self, memory_window: usize) -> bool {
        self.uncompacted_len() >= memory_window
    }

    /// Drop the entire message log and reset the consolidation cursor. Used
    /// by `/new` after archiving to long-term memory.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.last_consolidated = 0;
        self.updated_at = Utc::now();
    }

    pub fn replace_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        self.token_count = self.messages.iter().map(Message::approx_tokens).sum();
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_starts_empty() {
        let s = Session::new("cli:chat-1");
        assert!(s.messages.is_empty());
        assert_eq!(s.last_consolidated, 0);
        assert_eq!(s.token_count, 0);
    }

    #[test]
    fn push_grows_messages_and_tokens() {
        let mut s = Session::new("cli:chat-1");
        s.push(Message::user("12345678"));
        assert_eq!(s.messages.len(), 1);
        assert_eq!(s.token_count, 2);
    }

    #[test]
    fn uncompacted_len_tracks_pending_messages() {
        let mut s = Session::new("cli:chat-1");
        s.push_many([Message::user("a"), Message::assistant("b"), Message::user("c")]);
        assert_eq!(s.uncompacted_len(), 3);
        s.last_consolidated = 2;
        assert_eq!(s.uncompacted_len(), 1);
    }

    #[test]
    fn needs_consolidation_respects_window() {
        let mut s = Session::new("cli:chat-1");
        for i in 0..5 {
            s.push(Message::user(format!("msg {i}")));
        }
        assert!(!s.needs_consolidation(10));
        assert!(s.needs_consolidation(5));
    }

    #[test]
    fn clear_resets_messages_and_cursor() {
        let mut s = Session::new("cli:chat-1");
        s.push_many([Message::user("a"), Message::assistant("b")]);
        s.last_consolidated = 1;
        s.clear();
        assert!(s.messages.is_empty());
        assert_eq!(s.last_consolidated, 0);
    }

    #[test]
    fn replace_messages_recomputes_token_count() {
        let mut s = Session::new("cli:chat-1");
        s.push_many([Message::user("first"), Message::assistant("second")]);
        s.replace_messages(vec![Message::user("only")]);
        assert_eq!(s.messages.len(), 1);
        assert_eq!(s.token_count, 1);
    }

    #[test]
    fn metadata_defaults_are_inert() {
        let s = Session::new("cli:chat-1");
        assert!(!s.metadata.plan_mode);
        assert!(!s.metadata.doctor_mode);
        assert!(s.metadata.doctor_codex_session_id.is_none());
    }

    #[test]
    fn roundtrips_through_json() {
        let mut s = Session::new("telegram:42");
        s.push(Message::user("hi"));
        s.metadata.plan_mode = true;
        let json = serde_json::to_string(&s).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back.key, "telegram:42");
        assert_eq!(back.messages.len(), 1);
        assert!(back.metadata.plan_mode);
    }
}
