// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    /// Workspace root the agent operates in. Resolved at load time to the
    /// current directory when absent from the file.
    #[serde(default)]
    pub workspace: Option<String>,
}

impl Config {
    pub fn workspace_path(&self) -> std::path::PathBuf {
        self.workspace.as_deref().map(std::path::PathBuf::from).unwrap_or_else(|| {
            std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider identifier; "mock" and "echo" are the only built-in drivers.
    pub provider: String,
    pub name: String,
    pub api_key_env: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "mock".into(),
            name: "mock-model".into(),
            api_key_env: None,
            max_tokens: 4096,
            temperature: 0.2,
        }
    }
}

fn default_agent_mode() -> AgentMode {
    AgentMode::Agent
}
fn default_max_iterations() -> u32 {
    25
}
fn default_max_consecutive_searches() -> u32 {
    2
}
fn default_max_total_searches() -> u32 {
    4
}
fn default_memory_window() -> usize {
    40
}

/// Selects the search-tool name the per-turn dedup/loop guard watches.
fn default_search_tool_name() -> String {
    "search".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_agent_mode")]
    pub default_mode: AgentMode,
    /// Bound on model↔tool iterations within one turn.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Consecutive identical-tool-kind calls before a loop-guard nudge fires.
    #[serde(default = "default_max_consecutive_searches")]
    pub max_consecutive_searches: u32,
    /// Total search-tool invocations allowed in one turn before blocking.
    #[serde(default = "default_max_total_searches")]
    pub max_total_searches: u32,
    /// Tool name the loop guard treats as "the search tool".
    #[serde(default = "default_search_tool_name")]
    pub search_tool_name: String,
    /// Number of uncompacted messages that triggers background consolidation.
    #[serde(default = "default_memory_window")]
    pub memory_window: usize,
    #[serde(default)]
    pub compaction: CompactionConfig,
    /// System prompt override; `None` uses the built-in prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            default_mode: AgentMode::Agent,
            max_iterations: default_max_iterations(),
            max_consecutive_searches: default_max_consecutive_searches(),
            max_total_searches: default_max_total_searches(),
            search_tool_name: default_search_tool_name(),
            memory_window: default_memory_window(),
            compaction: CompactionConfig::default(),
            system_prompt: None,
        }
    }
}

/// Compaction aggressiveness, mapped to a top-N fact count in the compressor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompactionMode {
    Off,
    Conservative,
    #[default]
    Balanced,
    Aggressive,
}

fn default_recency_turns() -> usize {
    6
}
fn default_salience_threshold() -> f32 {
    0.35
}
fn default_max_facts() -> usize {
    12
}
fn default_max_summary_chars() -> usize {
    2000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    #[serde(default)]
    pub mode: CompactionMode,
    #[serde(default = "default_recency_turns")]
    pub recency_turns: usize,
    #[serde(default = "default_salience_threshold")]
    pub salience_threshold: f32,
    #[serde(default = "default_max_facts")]
    pub max_facts: usize,
    #[serde(default = "default_max_summary_chars")]
    pub max_summary_chars: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            mode: CompactionMode::Balanced,
            recency_turns: default_recency_turns(),
            salience_threshold: default_salience_threshold(),
            max_facts: default_max_facts(),
            max_summary_chars: default_max_summary_chars(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    /// Pure research – read-only tools, no writes.
    Research,
    /// Generate a structured plan, no code changes.
    Plan,
    /// Full agent with read/write tools.
    Agent,
}

impl std::fmt::Display for AgentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentMode::Research => write!(f, "research"),
            AgentMode::Plan => write!(f, "plan"),
            AgentMode::Agent => write!(f, "agent"),
        }
    }
}

fn default_tool_result_token_cap() -> usize {
    500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Shell commands auto-approved without an `Ask` round-trip.
    pub auto_approve_patterns: Vec<String>,
    /// Extra user-supplied deny regexes, evaluated after the built-in set.
    #[serde(default)]
    pub extra_deny_patterns: Vec<String>,
    /// When non-empty, only commands matching one of these patterns run.
    #[serde(default)]
    pub allow_patterns: Vec<String>,
    /// Reject commands that reference paths outside the workspace root.
    #[serde(default = "default_true")]
    pub restrict_to_workspace: bool,
    /// Timeout in seconds for a single shell tool call.
    pub timeout_secs: u64,
    /// Cap, in approximate tokens, on any single tool result persisted into
    /// session history (0 disables truncation).
    #[serde(default = "default_tool_result_token_cap")]
    pub tool_result_token_cap: usize,
    /// Wrap tool results in trust-boundary markers before returning them to
    /// the model.
    #[serde(default = "default_true")]
    pub trust_tagging: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            auto_approve_patterns: vec!["ls *".into(), "cat *".into(), "grep *".into()],
            extra_deny_patterns: Vec::new(),
            allow_patterns: Vec::new(),
            restrict_to_workspace: true,
            timeout_secs: 30,
            tool_result_token_cap: default_tool_result_token_cap(),
            trust_tagging: true,
        }
    }
}

fn default_rotate_bytes() -> u64 {
    5 * 1024 * 1024
}
fn default_max_backups() -> u32 {
    3
}
fn default_log_path() -> String {
    "data/logs/diagnostic.jsonl".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_path")]
    pub log_path: String,
    #[serde(default = "default_rotate_bytes")]
    pub rotate_bytes: u64,
    #[serde(default = "default_max_backups")]
    pub max_backups: u32,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_path: default_log_path(),
            rotate_bytes: default_rotate_bytes(),
            max_backups: default_max_backups(),
        }
    }
}

/// Per-channel config used only by the health aggregator to evaluate
/// whether an enabled channel has its required fields set. No channel
/// transports are implemented by this crate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub fields: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub channels: HashMap<String, ChannelConfig>,
}

/// Required field names per named channel kind, consulted by the health
/// aggregator when a channel in `ChannelsConfig` is enabled.
pub fn required_fields_for_channel(kind: &str) -> &'static [&'static str] {
    match kind {
        "telegram" => &["token"],
        "discord" => &["token"],
        "slack" => &["bot_token", "app_token"],
        "feishu" => &["app_id", "app_secret"],
        "whatsapp" => &["bridge_url"],
        "cli" => &[],
        _ => &[],
    }
}
