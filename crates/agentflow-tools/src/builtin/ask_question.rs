// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::io::{BufRead, Write};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::policy::ApprovalPolicy;
use crate::tool::{Tool, ToolCall, ToolOutput};

#[derive(Debug, Deserialize)]
struct Question {
    prompt: String,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default)]
    allow_multiple: bool,
}

#[cfg(unix)]
fn stdin_is_tty() -> bool {
    unsafe { libc::isatty(0) != 0 }
}

#[cfg(not(unix))]
fn stdin_is_tty() -> bool {
    false
}

/// Interactive clarification tool. There is no TUI surface in this runtime,
/// so it reads structured answers from stdin when attached to one, and
/// otherwise returns a descriptive error telling the model to proceed
/// without the answer rather than block indefinitely.
pub struct AskQuestionTool {
    force_headless: bool,
}

impl AskQuestionTool {
    pub fn new() -> Self {
        Self { force_headless: false }
    }

    pub fn new_headless() -> Self {
        Self { force_headless: true }
    }
}

impl Default for AskQuestionTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for AskQuestionTool {
    fn name(&self) -> &str {
        "ask_question"
    }

    fn description(&self) -> &str {
        "Ask the user one or more clarifying questions and block for an answer. Only available \
         when connected to an interactive terminal; in headless/CI contexts the tool returns an \
         error describing the unanswered questions instead of blocking, and the model should \
         proceed with its best judgement."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "questions": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "prompt": { "type": "string" },
                            "options": { "type": "array", "items": { "type": "string" } },
                            "allow_multiple": { "type": "boolean" }
                        },
                        "required": ["prompt"]
                    }
                }
            },
            "required": ["questions"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let raw = match call.args.get("questions") {
            Some(v) => v.clone(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'questions'"),
        };
        let questions: Vec<Question> = match serde_json::from_value(raw) {
            Ok(v) => v,
            Err(e) => return ToolOutput::err(&call.id, format!("invalid questions: {e}")),
        };
        if questions.is_empty() {
            return ToolOutput::err(&call.id, "'questions' must contain at least one question");
        }

        debug!(count = questions.len(), "ask_question tool");

        if self.force_headless || !stdin_is_tty() {
            let list = questions.iter().map(|q| format!("- {}", q.prompt)).collect::<Vec<_>>().join("\n");
            return ToolOutput::err(
                &call.id,
                format!(
                    "no interactive terminal attached; the following questions went unanswered, \
                     proceed with your best judgement:\n{list}"
                ),
            );
        }

        let stdin = std::io::stdin();
        let mut answers = Vec::new();
        for q in &questions {
            print!("{}", q.prompt);
            if !q.options.is_empty() {
                print!(" [{}]", q.options.join("/"));
            }
            print!(": ");
            let _ = std::io::stdout().flush();

            let mut line = String::new();
            if stdin.lock().read_line(&mut line).is_err() {
                return ToolOutput::err(&call.id, "failed to read an answer from stdin");
            }
            answers.push(line.trim().to_string());
        }

        ToolOutput::ok(&call.id, answers.join("\n"))
    }
}
