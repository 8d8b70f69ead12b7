// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::debug;

use crate::policy::ApprovalPolicy;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Persistent key-value memory, backed by a JSON file. Used for facts the
/// context builder's memory layer loads back in on every new session.
pub struct UpdateMemoryTool {
    memory_file: PathBuf,
    lock: Mutex<()>,
}

impl UpdateMemoryTool {
    pub fn new(memory_file: Option<String>) -> Self {
        let path = memory_file.map(PathBuf::from).unwrap_or_else(default_memory_path);
        Self { memory_file: path, lock: Mutex::new(()) }
    }
}

fn default_memory_path() -> PathBuf {
    dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("agentflow").join("memory.json")
}

type MemoryStore = BTreeMap<String, String>;

async fn load_store(path: &std::path::Path) -> MemoryStore {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => serde_json::from_str(&text).unwrap_or_default(),
        Err(_) => MemoryStore::new(),
    }
}

async fn save_store(path: &std::path::Path, store: &MemoryStore) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let text = serde_json::to_string_pretty(store)?;
    tokio::fs::write(path, text).await?;
    Ok(())
}

#[async_trait]
impl Tool for UpdateMemoryTool {
    fn name(&self) -> &str {
        "update_memory"
    }

    fn description(&self) -> &str {
        "Persist or retrieve a durable fact about the user or project, carried across sessions. \
         operation: 'set' (requires key, value), 'get' (requires key), 'delete' (requires key), \
         or 'list' (returns all stored keys and values). Keep values short and factual; this is \
         not a scratchpad."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "operation": { "type": "string", "enum": ["set", "get", "delete", "list"] },
                "key": { "type": "string" },
                "value": { "type": "string" }
            },
            "required": ["operation"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let operation = match call.args.get("operation").and_then(|v| v.as_str()) {
            Some(o) => o.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'operation'"),
        };

        debug!(operation = %operation, "update_memory tool");

        let _guard = self.lock.lock().await;
        let mut store = load_store(&self.memory_file).await;

        match operation.as_str() {
            "set" => {
                let key = match call.args.get("key").and_then(|v| v.as_str()) {
                    Some(k) => k.to_string(),
                    None => return ToolOutput::err(&call.id, "'set' requires 'key'"),
                };
                let value = match call.args.get("value").and_then(|v| v.as_str()) {
                    Some(v) => v.to_string(),
                    None => return ToolOutput::err(&call.id, "'set' requires 'value'"),
                };
                store.insert(key.clone(), value);
                match save_store(&self.memory_file, &store).await {
                    Ok(_) => ToolOutput::ok(&call.id, format!("remembered '{key}'")),
                    Err(e) => ToolOutput::err(&call.id, format!("failed to save memory: {e}")),
                }
            }
            "get" => {
                let key = match call.args.get("key").and_then(|v| v.as_str()) {
                    Some(k) => k.to_string(),
                    None => return ToolOutput::err(&call.id, "'get' requires 'key'"),
                };
                match store.get(&key) {
                    Some(v) => ToolOutput::ok(&call.id, v.clone()),
                    None => ToolOutput::ok(&call.id, format!("no memory stored for '{key}'")),
                }
            }
            "delete" => {
                let key = match call.args.get("key").and_then(|v| v.as_str()) {
                    Some(k) => k.to_string(),
                    None => return ToolOutput::err(&call.id, "'delete' requires 'key'"),
                };
                if store.remove(&key).is_some() {
                    match save_store(&self.memory_file, &store).await {
                        Ok(_) => ToolOutput::ok(&call.id, format!("deleted '{key}'")),
                        Err(e) => ToolOutput::err(&call.id, format!("failed to save memory: {e}")),
                    }
                } else {
                    ToolOutput::ok(&call.id, format!("no memory stored for '{key}'"))
                }
            }
            "list" => {
                if store.is_empty() {
                    ToolOutput::ok(&call.id, "(no memories stored)")
                } else {
                    let lines: Vec<String> = store.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                    ToolOutput::ok(&call.id, lines.join("\n"))
                }
            }
            other => ToolOutput::err(&call.id, format!("unknown operation '{other}', expected set/get/delete/list")),
        }
    }
}
