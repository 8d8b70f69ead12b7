// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use crate::events::{DiagnosticEvent, InboundMessage, OutboundMessage};

/// A callback invoked for every diagnostic event published on the bus.
/// Failures inside the callback are logged and swallowed: a broken emitter
/// must never stall inbound/outbound message flow.
pub type DiagnosticEmitter = Arc<dyn Fn(&DiagnosticEvent) + Send + Sync>;

/// Unbounded FIFO message bus connecting channel adapters to the dispatcher.
///
/// Inbound and outbound queues are plain FIFOs; the event/progress queues
/// are keyed per session so one session's backlog never blocks another's.
pub struct MessageBus {
    inbound: Mutex<VecDeque<InboundMessage>>,
    outbound: Mutex<VecDeque<OutboundMessage>>,
    events: Mutex<HashMap<String, VecDeque<String>>>,
    progress: Mutex<VecDeque<OutboundMessage>>,
    emitter: Mutex<Option<DiagnosticEmitter>>,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    pub fn new() -> Self {
        Self {
            inbound: Mutex::new(VecDeque::new()),
            outbound: Mutex::new(VecDeque::new()),
            events: Mutex::new(HashMap::new()),
            progress: Mutex::new(VecDeque::new()),
            emitter: Mutex::new(None),
        }
    }

    pub async fn set_diagnostic_emitter(&self, emitter: DiagnosticEmitter) {
        *self.emitter.lock().await = Some(emitter);
    }

    async fn emit(&self, event: DiagnosticEvent) {
        if let Some(emitter) = self.emitter.lock().await.as_ref() {
            // The emitter runs synchronously and must not be allowed to
            // propagate a panic or error back into bus operations.
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| emitter(&event)));
            if result.is_err() {
                warn!(event = %event.name, "diagnostic emitter panicked; dropping event");
            }
        }
    }

    pub async fn publish_inbound(&self, msg: InboundMessage) {
        let event = DiagnosticEvent::new("inbound.received", "bus", crate::events::Severity::Info)
            .with_session(msg.session_key())
            .with_channel(msg.channel.clone(), msg.chat_id.clone())
            .with_correlation(msg.run_id.clone(), msg.turn_id.clone());
        self.inbound.lock().await.push_back(msg);
        self.emit(event).await;
    }

    pub async fn consume_inbound(&self) -> Option<InboundMessage> {
        self.inbound.lock().await.pop_front()
    }

    pub async fn publish_outbound(&self, msg: OutboundMessage) {
        let event = DiagnosticEvent::new("outbound.published", "bus", crate::events::Severity::Info)
            .with_channel(msg.channel.clone(), msg.chat_id.clone())
            .with_correlation(Some(msg.run_id.clone()), Some(msg.turn_id.clone()));
        if msg.is_progress() {
            self.progress.lock().await.push_back(msg);
        } else {
            self.outbound.lock().await.push_back(msg);
        }
        self.emit(event).await;
    }

    pub async fn consume_outbound(&self) -> Option<OutboundMessage> {
        self.outbound.lock().await.pop_front()
    }

    /// Pop and return every queued progress frame for `chat_id`, leaving
    /// frames for other chats untouched. A second call with nothing new
    /// published in between returns an empty vector.
    pub async fn drain_progress(&self, chat_id: &str) -> Vec<OutboundMessage> {
        let mut queue = self.progress.lock().await;
        let mut drained = Vec::new();
        let mut remaining = VecDeque::with_capacity(queue.len());
        for msg in queue.drain(..) {
            if msg.chat_id == chat_id {
                drained.push(msg);
            } else {
                remaining.push_back(msg);
            }
        }
        *queue = remaining;
        drained
    }

    pub async fn publish_event(&self, session_key: &str, text: impl Into<String>) {
        let text = text.into();
        let event = DiagnosticEvent::new("session.event.published", "bus", crate::events::Severity::Info)
            .with_session(session_key)
            .with_attr("text", text.clone());
        self.events.lock().await.entry(session_key.to_string()).or_default().push_back(text);
        self.emit(event).await;
    }

    /// Drain and join all pending event lines for `session_key` as a
    /// bullet list, or `None` if nothing is pending. Calling this twice in
    /// a row without an intervening `publish_event` returns `None` the
    /// second time.
    pub async fn check_events(&self, session_key: &str) -> Option<String> {
        let mut events = self.events.lock().await;
        let queue = events.get_mut(session_key)?;
        if queue.is_empty() {
            return None;
        }
        let joined = queue.drain(..).map(|line| format!("- {line}")).collect::<Vec<_>>().join("\n");
        Some(joined)
    }

    pub async fn inbound_size(&self) -> usize {
        self.inbound.lock().await.len()
    }

    pub async fn outbound_size(&self) -> usize {
        self.outbound.lock().await.len()
    }

    pub async fn publish_diagnostic(&self, event: DiagnosticEvent) {
        self.emit(event).await;
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
