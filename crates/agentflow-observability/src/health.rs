// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Health surface: component evidence collection and a derived
//! liveness/readiness snapshot.
use std::collections::HashMap;
use std::path::Path;

use agentflow_bus::MessageBus;
use agentflow_config::{required_fields_for_channel, Config};
use serde::Serialize;

const CRITICAL_COMPONENTS: &[&str] = &["config", "workspace", "provider"];

fn status_rank(status: &str) -> u8 {
    match status {
        "ok" => 0,
        "unknown" => 1,
        "degraded" => 2,
        "failed" => 3,
        _ => 99,
    }
}

fn worst<'a>(a: &'a str, b: &'a str) -> &'a str {
    if status_rank(a) >= status_rank(b) {
        a
    } else {
        b
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthEvidence {
    pub component: String,
    pub status: String,
    pub summary: String,
    pub details: HashMap<String, serde_json::Value>,
}

impl HealthEvidence {
    fn new(component: &str, status: &str, summary: impl Into<String>) -> Self {
        Self { component: component.to_string(), status: status.to_string(), summary: summary.into(), details: HashMap::new() }
    }

    fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub liveness: String,
    pub readiness: String,
    pub degraded: bool,
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub evidence: Vec<HealthEvidence>,
}

fn has_value(value: &str) -> bool {
    !value.trim().is_empty()
}

/// Provider readiness: a model name is configured, and either an API key
/// env var is named and set, or `AGENTFLOW_API_KEY` is set as a fallback.
fn provider_evidence(config: &Config) -> HealthEvidence {
    let model = config.model.name.clone();
    if model.trim().is_empty() {
        return HealthEvidence::new("provider", "failed", "No model configured").with_detail("model", model);
    }

    let env_key = config.model.api_key_env.clone().unwrap_or_default();
    let mut has_auth = !env_key.is_empty() && std::env::var(&env_key).map(|v| has_value(&v)).unwrap_or(false);
    if !has_auth {
        has_auth = std::env::var("AGENTFLOW_API_KEY").map(|v| has_value(&v)).unwrap_or(false);
    }

    // Local/mock providers never need credentials.
    if config.model.provider == "mock" || config.model.provider == "echo" {
        return HealthEvidence::new("provider", "ok", format!("Local provider configured: {}", config.model.provider))
            .with_detail("model", model)
            .with_detail("provider", config.model.provider.clone());
    }

    if has_auth {
        HealthEvidence::new("provider", "ok", format!("Provider configured: {}", config.model.provider))
            .with_detail("model", model)
            .with_detail("provider", config.model.provider.clone())
            .with_detail("has_auth", true)
    } else {
        HealthEvidence::new("provider", "failed", format!("Provider missing credentials: {}", config.model.provider))
            .with_detail("model", model)
            .with_detail("provider", config.model.provider.clone())
            .with_detail("has_auth", false)
    }
}

fn channels_evidence(config: &Config) -> HealthEvidence {
    let mut enabled = Vec::new();
    let mut misconfigured: HashMap<String, Vec<String>> = HashMap::new();

    for (name, channel) in &config.channels.channels {
        if !channel.enabled {
            continue;
        }
        enabled.push(name.clone());
        let required = required_fields_for_channel(name);
        let missing: Vec<String> = required
            .iter()
            .filter(|field| !channel.fields.get(**field).map(|v| has_value(v)).unwrap_or(false))
            .map(|f| f.to_string())
            .collect();
        if !missing.is_empty() {
            misconfigured.insert(name.clone(), missing);
        }
    }

    let details_enabled = serde_json::Value::from(enabled.clone());
    let details_misconfigured = serde_json::to_value(&misconfigured).unwrap_or_default();

    if enabled.is_empty() {
        return HealthEvidence::new("channels", "ok", "No external channels enabled")
            .with_detail("enabled_channels", details_enabled)
            .with_detail("enabled_count", 0u64);
    }
    if !misconfigured.is_empty() {
        return HealthEvidence::new("channels", "failed", "One or more enabled channels are misconfigured")
            .with_detail("enabled_channels", details_enabled)
            .with_detail("enabled_count", enabled.len() as u64)
            .with_detail("misconfigured", details_misconfigured);
    }
    HealthEvidence::new("channels", "ok", format!("{} enabled channel(s) configured", enabled.len()))
        .with_detail("enabled_channels", details_enabled)
        .with_detail("enabled_count", enabled.len() as u64)
}

async fn runtime_queue_evidence(bus: Option<&MessageBus>) -> HealthEvidence {
    let Some(bus) = bus else {
        return HealthEvidence::new("runtime.queue", "unknown", "Runtime queue metrics unavailable in this context");
    };

    let inbound = bus.inbound_size().await;
    let outbound = bus.outbound_size().await;
    let peak = inbound.max(outbound);
    let status = if peak >= 200 {
        "failed"
    } else if peak >= 50 {
        "degraded"
    } else {
        "ok"
    };

    HealthEvidence::new("runtime.queue", status, format!("Queue sizes inbound={inbound}, outbound={outbound}"))
        .with_detail("inbound_size", inbound as u64)
        .with_detail("outbound_size", outbound as u64)
}

/// Collect a machine-readable health snapshot with per-component evidence.
pub async fn collect_health_snapshot(config: &Config, config_path: &Path, bus: Option<&MessageBus>) -> HealthSnapshot {
    let mut evidence = Vec::new();

    let config_exists = config_path.exists();
    evidence.push(
        HealthEvidence::new(
            "config",
            if config_exists { "ok" } else { "failed" },
            if config_exists { "Config file found" } else { "Config file not found" },
        )
        .with_detail("path", config_path.display().to_string()),
    );

    let workspace = config.workspace_path();
    let workspace_exists = workspace.exists();
    evidence.push(
        HealthEvidence::new(
            "workspace",
            if workspace_exists { "ok" } else { "failed" },
            if workspace_exists { "Workspace exists" } else { "Workspace missing" },
        )
        .with_detail("path", workspace.display().to_string()),
    );

    evidence.push(provider_evidence(config));
    evidence.push(channels_evidence(config));
    evidence.push(runtime_queue_evidence(bus).await);

    let mut liveness = "ok".to_string();
    for item in &evidence {
        if item.component == "config" || item.component == "workspace" {
            liveness = worst(&liveness, &item.status).to_string();
        }
    }

    let mut readiness = "ok".to_string();
    for item in &evidence {
        if CRITICAL_COMPONENTS.contains(&item.component.as_str()) {
            readiness = worst(&readiness, &item.status).to_string();
        }
    }
    if readiness == "ok" {
        if let Some(item) = evidence.iter().find(|e| e.status == "degraded" || e.status == "failed") {
            readiness = item.status.clone();
        }
    }

    let degraded = evidence.iter().any(|e| e.status == "degraded");

    HealthSnapshot { liveness, readiness, degraded, generated_at: chrono::Utc::now(), evidence }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_config::{ChannelConfig, ModelConfig};

    fn base_config() -> Config {
        Config {
            model: ModelConfig { provider: "mock".into(), name: "mock-model".into(), api_key_env: None, max_tokens: 4096, temperature: 0.2 },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn missing_config_file_reports_failed_config_component() {
        let config = base_config();
        let snapshot = collect_health_snapshot(&config, Path::new("/nonexistent/config.yaml"), None).await;
        let config_evidence = snapshot.evidence.iter().find(|e| e.component == "config").unwrap();
        assert_eq!(config_evidence.status, "failed");
        assert_eq!(snapshot.liveness, "failed");
    }

    #[tokio::test]
    async fn mock_provider_never_requires_credentials() {
        let config = base_config();
        let evidence = provider_evidence(&config);
        assert_eq!(evidence.status, "ok");
    }

    #[tokio::test]
    async fn real_provider_without_credentials_fails() {
        let mut config = base_config();
        config.model.provider = "openai".into();
        config.model.api_key_env = Some("AGENTFLOW_TEST_MISSING_KEY_VAR".into());
        let evidence = provider_evidence(&config);
        assert_eq!(evidence.status, "failed");
    }

    #[tokio::test]
    async fn no_enabled_channels_is_ok() {
        let config = base_config();
        let evidence = channels_evidence(&config);
        assert_eq!(evidence.status, "ok");
    }

    #[tokio::test]
    async fn enabled_channel_missing_required_field_fails() {
        let mut config = base_config();
        config.channels.channels.insert("telegram".into(), ChannelConfig { enabled: true, fields: HashMap::new() });
        let evidence = channels_evidence(&config);
        assert_eq!(evidence.status, "failed");
    }

    #[tokio::test]
    async fn readiness_is_failed_when_provider_failed_regardless_of_channels() {
        let mut config = base_config();
        config.model.provider = "openai".into();
        config.model.name = "gpt-4".into();
        let snapshot = collect_health_snapshot(&config, Path::new("/nonexistent/config.yaml"), None).await;
        assert_eq!(snapshot.readiness, "failed");
    }

    #[tokio::test]
    async fn runtime_queue_degrades_at_fifty_and_fails_at_two_hundred() {
        let bus = MessageBus::new();
        for _ in 0..60 {
            bus.publish_inbound(agentflow_bus::InboundMessage::new("cli", "u", "c", "x")).await;
        }
        let evidence = runtime_queue_evidence(Some(&bus)).await;
        assert_eq!(evidence.status, "degraded");
    }

    #[tokio::test]
    async fn runtime_queue_unknown_without_a_bus() {
        let evidence = runtime_queue_evidence(None).await;
        assert_eq!(evidence.status, "unknown");
    }
}
