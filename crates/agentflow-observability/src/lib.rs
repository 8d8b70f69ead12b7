// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Diagnostic sink (redacted JSONL, with rotation, query, and follow) and
//! the health aggregator surfaced by the `doctor` CLI subcommand.
pub mod health;
pub mod redact;
pub mod sink;

pub use health::{collect_health_snapshot, HealthEvidence, HealthSnapshot};
pub use redact::redact_payload;
pub use sink::{Follower, JsonlSink};
