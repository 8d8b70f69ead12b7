// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Doctor-mode diagnostic driver. The external codex-style subprocess
//! transport is out of scope (see DESIGN.md); [`FallbackDriver`] is the one
//! bundled implementation, running diagnostics through the normal provider
//! path with a doctor-mode preamble.
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use agentflow_config::ModelConfig;
use agentflow_model::{ChatRequest, Message, Provider};

pub const DOCTOR_MODE_PREAMBLE: &str = "[Doctor Mode] Diagnose the current session and environment. \
Report findings plainly; do not take destructive actions.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoctorStatus {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone)]
pub struct DoctorOutcome {
    pub message: String,
    pub status: DoctorStatus,
}

/// External diagnostic driver boundary. `start`/`status`/`cancel`/`resume`
/// mirror the sub-states a doctor session can be in.
#[async_trait]
pub trait DoctorDriver: Send + Sync {
    async fn start(&self, session_key: &str) -> DoctorOutcome;
    async fn status(&self, session_key: &str) -> DoctorStatus;
    async fn cancel(&self, session_key: &str);
    async fn resume(&self, session_key: &str) -> DoctorOutcome;
}

/// Runs diagnostics through the configured model provider. Blocks with
/// setup guidance when the provider is unconfigured instead of attempting
/// a call that can only fail.
pub struct FallbackDriver {
    provider: Arc<dyn Provider>,
    model_cfg: ModelConfig,
    states: Mutex<HashMap<String, DoctorStatus>>,
}

impl FallbackDriver {
    pub fn new(provider: Arc<dyn Provider>, model_cfg: ModelConfig) -> Self {
        Self { provider, model_cfg, states: Mutex::new(HashMap::new()) }
    }

    fn provider_configured(&self) -> bool {
        !self.model_cfg.name.trim().is_empty()
    }

    async fn set_status(&self, session_key: &str, status: DoctorStatus) {
        self.states.lock().await.insert(session_key.to_string(), status);
    }

    async fn run_diagnostic(&self, session_key: &str) -> DoctorOutcome {
        if !self.provider_configured() {
            self.set_status(session_key, DoctorStatus::Failed).await;
            return DoctorOutcome {
                message: "Provider is not configured. Set `model.name` (and credentials) before running diagnostics.".into(),
                status: DoctorStatus::Failed,
            };
        }

        self.set_status(session_key, DoctorStatus::Running).await;
        let request = ChatRequest {
            messages: vec![Message::system(DOCTOR_MODE_PREAMBLE), Message::user("Run a basic diagnostic check.")],
            tools: Vec::new(),
            model: self.model_cfg.name.clone(),
            max_tokens: self.model_cfg.max_tokens,
            temperature: self.model_cfg.temperature,
        };

        match self.provider.chat(request).await {
            Ok(response) => {
                self.set_status(session_key, DoctorStatus::Completed).await;
                DoctorOutcome { message: response.content.unwrap_or_default(), status: DoctorStatus::Completed }
            }
            Err(e) => {
                self.set_status(session_key, DoctorStatus::Failed).await;
                DoctorOutcome { message: format!("diagnostic run failed: {e}"), status: DoctorStatus::Failed }
            }
        }
    }
}

#[async_trait]
impl DoctorDriver for FallbackDriver {
    async fn start(&self, session_key: &str) -> DoctorOutcome {
        self.run_diagnostic(session_key).await
    }

    async fn status(&self, session_key: &str) -> DoctorStatus {
        self.states.lock().await.get(session_key).copied().unwrap_or(DoctorStatus::Idle)
    }

    async fn cancel(&self, session_key: &str) {
        self.set_status(session_key, DoctorStatus::Cancelled).await;
    }

    async fn resume(&self, session_key: &str) -> DoctorOutcome {
        self.run_diagnostic(session_key).await
    }
}
