// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod bus;
mod events;

pub use bus::{DiagnosticEmitter, MessageBus};
pub use events::{DiagnosticEvent, InboundMessage, OutboundMessage, Severity};
