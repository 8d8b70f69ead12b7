// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use agentflow_bus::{DiagnosticEvent, InboundMessage, MessageBus};
use agentflow_config::Config;
use agentflow_dispatcher::{Dispatcher, FallbackDriver};
use agentflow_model::{EchoProvider, Provider};
use agentflow_observability::{collect_health_snapshot, JsonlSink};
use agentflow_session::SessionStore;
use agentflow_tools::builtin::{
    AskQuestionTool, EditFileTool, FindFileTool, GrepTool, ListDirTool, ReadFileTool, SearchTool, ShellTool,
    SwitchModeTool, TodoWriteTool, UpdateMemoryTool, WriteFileTool,
};
use agentflow_tools::ToolRegistry;
use cli::{Cli, Commands};

use tokio::sync::{mpsc, Mutex};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.config.clone().unwrap_or_else(|| PathBuf::from(".agentflow/config.yaml"));
    let config = agentflow_config::load(cli.config.as_deref())?;

    match cli.command_or_default() {
        Commands::Doctor { json } => run_doctor(&config, &config_path, json).await,
        Commands::Run => run_loop(cli, config).await,
    }
}

/// Build a `Provider` for the configured model. Only the local test double
/// (`mock`/`echo`, both driven by [`EchoProvider`]) is bundled; a real HTTP
/// provider transport is a non-goal of this runtime.
fn build_provider(_config: &Config) -> Arc<dyn Provider> {
    Arc::new(EchoProvider)
}

fn build_tool_registry(config: &Config, workspace_root: &std::path::Path) -> ToolRegistry {
    let mut registry = ToolRegistry::new(&config.tools);

    registry.register(ShellTool::new(
        workspace_root.to_path_buf(),
        config.tools.extra_deny_patterns.iter().filter_map(|p| regex::Regex::new(p).ok()).collect(),
        config.tools.allow_patterns.iter().filter_map(|p| regex::Regex::new(p).ok()).collect(),
        config.tools.restrict_to_workspace,
        config.tools.timeout_secs,
    ));
    registry.register(ReadFileTool);
    registry.register(WriteFileTool);
    registry.register(EditFileTool);
    registry.register(FindFileTool);
    registry.register(SearchTool);
    registry.register(GrepTool);
    registry.register(ListDirTool);
    registry.register(AskQuestionTool::new_headless());
    registry.register(UpdateMemoryTool::new(None));

    let mode = Arc::new(Mutex::new(config.agent.default_mode));
    let (tool_tx, _tool_rx) = mpsc::channel(64);
    registry.register(TodoWriteTool::new(tool_tx.clone()));
    registry.register(SwitchModeTool::new(mode, tool_tx));

    registry
}

/// Resolve a configured path that may be relative to the workspace root.
fn resolve_under(workspace_root: &std::path::Path, path: &str) -> PathBuf {
    let p = PathBuf::from(path);
    if p.is_absolute() {
        p
    } else {
        workspace_root.join(p)
    }
}

async fn run_loop(cli: Cli, config: Config) -> anyhow::Result<()> {
    let workspace_root = cli.workspace.clone().unwrap_or_else(|| config.workspace_path());
    std::fs::create_dir_all(&workspace_root).with_context(|| format!("creating workspace {}", workspace_root.display()))?;

    let sink = Arc::new(JsonlSink::new(
        resolve_under(&workspace_root, &config.observability.log_path),
        config.observability.rotate_bytes,
        config.observability.max_backups,
    ));

    let bus = Arc::new(MessageBus::new());
    {
        let sink = sink.clone();
        bus.set_diagnostic_emitter(Arc::new(move |event: &DiagnosticEvent| {
            let sink = sink.clone();
            let event = event.clone();
            tokio::spawn(async move {
                if let Err(err) = sink.emit(&event).await {
                    tracing::warn!(error = %err, "failed to write diagnostic event");
                }
            });
        }))
        .await;
    }

    let store = SessionStore::new(workspace_root.join("data"));
    let tools = Arc::new(build_tool_registry(&config, &workspace_root));
    let provider = build_provider(&config);
    let doctor = Arc::new(FallbackDriver::new(provider.clone(), config.model.clone()));

    let dispatcher = Arc::new(Dispatcher::new(
        bus.clone(),
        store,
        workspace_root.clone(),
        tools,
        provider,
        config.agent.clone(),
        config.model.clone(),
        Vec::new(),
        doctor,
    ));

    let dispatch_handle = tokio::spawn(dispatcher.clone().run());
    let outbound_handle = tokio::spawn(print_outbound(bus.clone()));

    feed_stdin(&bus).await?;

    dispatch_handle.abort();
    outbound_handle.abort();
    Ok(())
}

/// Read lines from stdin and publish each as an inbound message on the
/// local `cli` channel, until stdin is closed.
async fn feed_stdin(bus: &MessageBus) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        io::stdout().flush().ok();
        let Some(line) = lines.next() else { break };
        let line = line.context("reading stdin")?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        bus.publish_inbound(InboundMessage::new("cli", "local", "session", trimmed)).await;
        // Give the dispatcher a moment to process and publish its reply
        // before prompting for the next line.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    Ok(())
}

async fn print_outbound(bus: Arc<MessageBus>) {
    loop {
        match bus.consume_outbound().await {
            Some(msg) => println!("{}", msg.content),
            None => tokio::time::sleep(std::time::Duration::from_millis(100)).await,
        }
    }
}

async fn run_doctor(config: &Config, config_path: &std::path::Path, as_json: bool) -> anyhow::Result<()> {
    let snapshot = collect_health_snapshot(config, config_path, None).await;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!("liveness:  {}", snapshot.liveness);
        println!("readiness: {}", snapshot.readiness);
        println!("degraded:  {}", snapshot.degraded);
        for item in &snapshot.evidence {
            println!("  [{:<8}] {:<14} {}", item.status, item.component, item.summary);
        }
    }

    let code = match snapshot.readiness.as_str() {
        "ok" => 0,
        "degraded" => 1,
        _ => 2,
    };
    std::process::exit(code);
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
