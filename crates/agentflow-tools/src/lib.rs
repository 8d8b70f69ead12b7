// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Tool gateway: the [`Tool`] trait, the command sanitizer and approval
//! policy engine that gate shell execution, smart truncation and
//! content-trust tagging applied to every tool result, and the built-in
//! tool set itself.

pub mod builtin;
pub mod events;
pub mod policy;
pub mod registry;
pub mod sanitizer;
pub mod tool;
pub mod truncate;
pub mod trust;

pub use events::{TodoItem, ToolEvent};
pub use policy::{ApprovalPolicy, ToolPolicy};
pub use registry::{ToolRegistry, ToolSchema, ToolTrace};
pub use sanitizer::SanitizeResult;
pub use tool::{OutputCategory, Tool, ToolCall, ToolOutput};
pub use truncate::smart_truncate;
pub use trust::{tag_content, TrustLevel};
