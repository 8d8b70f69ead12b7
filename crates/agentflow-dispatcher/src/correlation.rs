// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use agentflow_bus::InboundMessage;

/// Assign `run_id`/`turn_id` to `msg` if either is missing, so every turn is
/// correlated end to end even when the channel adapter didn't set one.
pub fn ensure_correlation(msg: &mut InboundMessage) {
    if msg.run_id.is_none() {
        msg.run_id = Some(random_hex());
    }
    if msg.turn_id.is_none() {
        msg.turn_id = Some(random_hex());
    }
}

fn random_hex() -> String {
    uuid::Uuid::new_v4().simple().to_string().chars().take(12).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assigns_both_ids_when_absent() {
        let mut msg = InboundMessage::new("cli", "user-1", "chat-1", "hi");
        ensure_correlation(&mut msg);
        assert!(msg.run_id.is_some());
        assert!(msg.turn_id.is_some());
    }

    #[test]
    fn preserves_existing_run_id() {
        let mut msg = InboundMessage::new("cli", "user-1", "chat-1", "hi");
        msg.run_id = Some("existing".into());
        ensure_correlation(&mut msg);
        assert_eq!(msg.run_id.as_deref(), Some("existing"));
        assert!(msg.turn_id.is_some());
    }

    #[test]
    fn generated_ids_are_twelve_hex_chars() {
        let mut msg = InboundMessage::new("cli", "user-1", "chat-1", "hi");
        ensure_correlation(&mut msg);
        assert_eq!(msg.run_id.unwrap().len(), 12);
    }
}
