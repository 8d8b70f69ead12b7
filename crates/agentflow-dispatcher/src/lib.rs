// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The session dispatcher: routes inbound channel messages to per-session
//! turns, owns slash commands, doctor-mode lifecycle, and correlation-ID
//! assignment.
pub mod commands;
pub mod correlation;
pub mod dispatcher;
pub mod doctor;
pub mod interrupts;

pub use commands::{is_doctor, is_stop, parse_command, Command, HELP_TEXT};
pub use correlation::ensure_correlation;
pub use dispatcher::Dispatcher;
pub use doctor::{DoctorDriver, DoctorOutcome, DoctorStatus, FallbackDriver, DOCTOR_MODE_PREAMBLE};
pub use interrupts::BusInterruptHooks;
