// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The reason-act orchestrator: one bounded loop alternating model calls and
//! tool execution, with interrupt hooks and a ReAct trace for observability.
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;

use agentflow_config::{AgentConfig, ModelConfig};
use agentflow_model::{ChatRequest, Message, Provider, ToolCallRequest, ToolSchema, Usage};
use agentflow_tools::{ToolRegistry, ToolTrace};

use crate::guard::LoopGuard;
use crate::think::{extract_progress, strip_think_tags, ProgressThought};

/// Interrupt/telemetry hook invoked before each model call. Implementations
/// inject queued interrupt content into `messages` (e.g. the dispatcher
/// forwarding a user message that arrived mid-turn).
#[async_trait]
pub trait BeforeModel: Send + Sync {
    async fn call(&self, messages: &mut Vec<Message>);
}

/// Interrupt hook invoked before each tool call. Returning `true` cancels
/// this call and every remaining call in the current batch.
#[async_trait]
pub trait BeforeTool: Send + Sync {
    async fn call(&self, messages: &[Message], index: usize, all_calls: &[ToolCallRequest]) -> bool;
}

/// Progress frames surfaced during a run, for a caller wiring them onto a
/// bus or terminal.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Plan(String),
    Thought(String),
    ToolHint(String),
    ToolStarted { id: String, name: String },
    ToolFinished { id: String, name: String, ok: bool },
}

async fn emit(progress: Option<&mpsc::Sender<ProgressEvent>>, event: ProgressEvent) {
    if let Some(tx) = progress {
        let _ = tx.send(event).await;
    }
}

/// One loop iteration's contribution to the ReAct trace.
#[derive(Debug, Clone, Default)]
pub struct ReactStep {
    pub iteration: u32,
    pub thought: Option<String>,
    pub actions: Vec<ToolTrace>,
    pub observations: Vec<String>,
}

/// The outcome of `run_agent_loop`.
#[derive(Debug, Clone)]
pub struct AgentResult {
    pub final_content: String,
    pub messages: Vec<Message>,
    pub usage: Usage,
    pub hit_iteration_cap: bool,
    pub trace: Vec<ReactStep>,
}

const MAX_OBSERVATION_PREVIEW: usize = 200;

fn tool_schemas(tools: &ToolRegistry, mode: agentflow_config::AgentMode) -> Vec<ToolSchema> {
    tools
        .schemas_for_mode(mode)
        .into_iter()
        .map(|s| ToolSchema { name: s.name, description: s.description, parameters: s.parameters })
        .collect()
}

fn parse_arguments(raw: &str) -> Value {
    if let Ok(v) = serde_json::from_str::<Value>(raw) {
        if v.is_object() {
            return v;
        }
        // A JSON string literal containing an encoded object: unwrap once more.
        if let Value::String(inner) = &v {
            if let Ok(v2) = serde_json::from_str::<Value>(inner) {
                if v2.is_object() {
                    return v2;
                }
            }
        }
    }
    Value::Object(Default::default())
}

fn tool_hint(calls: &[ToolCallRequest]) -> String {
    let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
    format!("Calling: {}", names.join(", "))
}

fn preview(text: &str) -> String {
    text.chars().take(MAX_OBSERVATION_PREVIEW).collect()
}

/// Run the bounded reason-act loop to completion.
#[allow(clippy::too_many_arguments)]
pub async fn run_agent_loop(
    initial_messages: Vec<Message>,
    provider: &dyn Provider,
    tools: &ToolRegistry,
    mode: agentflow_config::AgentMode,
    agent_cfg: &AgentConfig,
    model_cfg: &ModelConfig,
    progress: Option<mpsc::Sender<ProgressEvent>>,
    before_model: Option<&dyn BeforeModel>,
    before_tool: Option<&dyn BeforeTool>,
) -> AgentResult {
    let mut messages = initial_messages;
    let mut usage = Usage::default();
    let mut trace: Vec<ReactStep> = Vec::new();
    let mut guard = LoopGuard::new(
        agent_cfg.search_tool_name.clone(),
        agent_cfg.max_consecutive_searches,
        agent_cfg.max_total_searches,
    );
    let tool_defs = tool_schemas(tools, mode);
    let mut final_content: Option<String> = None;

    for iteration in 0..agent_cfg.max_iterations {
        if let Some(hook) = before_model {
            hook.call(&mut messages).await;
        }

        let request = ChatRequest {
            messages: messages.clone(),
            tools: tool_defs.clone(),
            model: model_cfg.name.clone(),
            max_tokens: model_cfg.max_tokens,
            temperature: model_cfg.temperature,
        };
        let response = match provider.chat(request).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, iteration, "model call failed; ending loop");
                break;
            }
        };
        usage.merge(&response.usage);

        let mut step = ReactStep { iteration, ..Default::default() };

        if response.has_tool_calls() {
            let raw_content = response.content.clone().unwrap_or_default();
            match extract_progress(&raw_content) {
                ProgressThought::Plan(plan) => {
                    step.thought = Some(plan.clone());
                    emit(progress.as_ref(), ProgressEvent::Plan(plan)).await;
                }
                ProgressThought::Thought(thought) => {
                    step.thought = Some(thought.clone());
                    emit(progress.as_ref(), ProgressEvent::Thought(thought)).await;
                }
                ProgressThought::None => {}
            }
            emit(progress.as_ref(), ProgressEvent::ToolHint(tool_hint(&response.tool_calls))).await;

            let stripped_content =
                response.content.as_deref().map(strip_think_tags).filter(|s| !s.is_empty());
            messages.push(Message::assistant_with_tool_calls(stripped_content, response.tool_calls.clone()));

            let mut cancelled_from = None;
            for (index, call) in response.tool_calls.iter().enumerate() {
                if let Some(hook) = before_tool {
                    if hook.call(&messages, index, &response.tool_calls).await {
                        cancelled_from = Some(index);
                        break;
                    }
                }

                let args = parse_arguments(&call.arguments);
                emit(progress.as_ref(), ProgressEvent::ToolStarted { id: call.id.clone(), name: call.name.clone() })
                    .await;

                let is_search = call.name == agent_cfg.search_tool_name;
                let (content, ok) = if is_search && guard.search_cap_reached() {
                    ("Search limit reached for this turn.".to_string(), false)
                } else {
                    let dedup = guard.check(&call.name, &args);
                    if dedup.is_duplicate {
                        (dedup.cached_result.unwrap_or_default(), true)
                    } else {
                        let tool_call = agentflow_tools::ToolCall { id: call.id.clone(), name: call.name.clone(), args };
                        let (text, tool_trace) = tools.invoke(&tool_call).await;
                        guard.store(&call.name, &tool_call.args, &text);
                        step.actions.push(tool_trace.clone());
                        (text, tool_trace.ok)
                    }
                };
                guard.record_call(&call.name);

                emit(
                    progress.as_ref(),
                    ProgressEvent::ToolFinished { id: call.id.clone(), name: call.name.clone(), ok },
                )
                .await;
                step.observations.push(preview(&content));
                messages.push(Message::tool_result(&call.id, &call.name, content));
            }

            if let Some(from) = cancelled_from {
                for call in &response.tool_calls[from..] {
                    messages.push(Message::tool_result(&call.id, &call.name, "CANCELLED: User interrupted"));
                }
            } else if guard.search_loop_detected() {
                let history = guard.search_history().join("\n- ");
                messages.push(Message::user(format!(
                    "STOP SEARCHING. You have repeated the same kind of search too many times. \
                     Synthesize an answer NOW from what you already have. Prior searches:\n- {history}"
                )));
            }

            trace.push(step);
        } else {
            let content = strip_think_tags(&response.content.unwrap_or_default());
            messages.push(Message::assistant(&content));
            trace.push(step);
            final_content = Some(content);
            break;
        }
    }

    let hit_iteration_cap = final_content.is_none();
    let final_content = final_content.unwrap_or_else(|| {
        format!("I reached the maximum number of tool call iterations ({}) without completing the task.", agent_cfg.max_iterations)
    });

    AgentResult { final_content, messages, usage, hit_iteration_cap, trace }
}
