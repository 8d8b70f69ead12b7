// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Append-only JSONL diagnostic sink with size-based rotation, bounded
//! query, and a tail-follow mode that survives rotation and truncation.
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use agentflow_bus::DiagnosticEvent;
use anyhow::{Context, Result};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::info;

use crate::redact::redact_payload;

/// Serialized, redacted diagnostic log. Rotation and the write lock are
/// inline with `emit` so readers never observe a half-rotated file.
pub struct JsonlSink {
    path: PathBuf,
    rotate_bytes: u64,
    max_backups: u32,
    lock: Mutex<()>,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>, rotate_bytes: u64, max_backups: u32) -> Self {
        Self { path: path.into(), rotate_bytes, max_backups, lock: Mutex::new(()) }
    }

    pub fn from_config(cfg: &agentflow_config::ObservabilityConfig) -> Self {
        Self::new(&cfg.log_path, cfg.rotate_bytes, cfg.max_backups)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Redact `event` and append it as one JSON line, rotating first if the
    /// write would push the active file past `rotate_bytes`.
    pub async fn emit(&self, event: &DiagnosticEvent) -> Result<()> {
        let payload = serde_json::to_value(event).context("serializing diagnostic event")?;
        let redacted = redact_payload(payload);
        let line = serde_json::to_string(&redacted).context("encoding diagnostic line")?;

        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        let rotate_bytes = self.rotate_bytes;
        let max_backups = self.max_backups;
        tokio::task::spawn_blocking(move || append_line_sync(&path, &line, rotate_bytes, max_backups))
            .await
            .context("join sink writer task")??;
        Ok(())
    }

    fn log_files_oldest_first(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for index in (1..=self.max_backups).rev() {
            let candidate = backup_path(&self.path, index);
            if candidate.exists() {
                files.push(candidate);
            }
        }
        if self.path.exists() {
            files.push(self.path.clone());
        }
        files
    }

    /// Scan every log file oldest-first, keep the last `limit` matching rows.
    pub async fn query(&self, session_key: Option<&str>, run_id: Option<&str>, limit: usize) -> Result<Vec<Value>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let files = self.log_files_oldest_first();
        let session_key = session_key.map(str::to_string);
        let run_id = run_id.map(str::to_string);
        tokio::task::spawn_blocking(move || query_sync(&files, session_key.as_deref(), run_id.as_deref(), limit))
            .await
            .context("join sink query task")?
    }
}

fn append_line_sync(path: &Path, line: &str, rotate_bytes: u64, max_backups: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let encoded_len = line.len() as u64 + 1;
    let current_len = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    if path.exists() && current_len + encoded_len > rotate_bytes {
        rotate_sync(path, max_backups)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path).with_context(|| format!("opening {}", path.display()))?;
    writeln!(file, "{line}").with_context(|| format!("appending to {}", path.display()))?;
    Ok(())
}

fn backup_path(path: &Path, index: u32) -> PathBuf {
    let mut name = path.file_name().and_then(|n| n.to_str()).unwrap_or("diagnostic.jsonl").to_string();
    name.push_str(&format!(".{index}"));
    path.with_file_name(name)
}

fn rotate_sync(path: &Path, max_backups: u32) -> Result<()> {
    if max_backups == 0 {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        return Ok(());
    }

    let oldest = backup_path(path, max_backups);
    if oldest.exists() {
        std::fs::remove_file(&oldest)?;
    }
    for index in (1..max_backups).rev() {
        let src = backup_path(path, index);
        let dst = backup_path(path, index + 1);
        if src.exists() {
            std::fs::rename(&src, &dst)?;
        }
    }
    if path.exists() {
        std::fs::rename(path, backup_path(path, 1))?;
        info!(path = %path.display(), "rotated diagnostic sink");
    }
    Ok(())
}

fn decode_line(raw: &str) -> Option<Value> {
    let line = raw.trim();
    if line.is_empty() {
        return None;
    }
    serde_json::from_str::<Value>(line).ok().filter(Value::is_object)
}

fn matches(event: &Value, session_key: Option<&str>, run_id: Option<&str>) -> bool {
    if let Some(key) = session_key {
        if event.get("session_key").and_then(Value::as_str) != Some(key) {
            return false;
        }
    }
    if let Some(id) = run_id {
        if event.get("run_id").and_then(Value::as_str) != Some(id) {
            return false;
        }
    }
    true
}

fn query_sync(files: &[PathBuf], session_key: Option<&str>, run_id: Option<&str>, limit: usize) -> Result<Vec<Value>> {
    let mut rows: Vec<Value> = Vec::new();
    for path in files {
        let contents = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        for raw in contents.lines() {
            let Some(event) = decode_line(raw) else { continue };
            if matches(&event, session_key, run_id) {
                rows.push(event);
                if rows.len() > limit {
                    rows.drain(0..rows.len() - limit);
                }
            }
        }
    }
    Ok(rows)
}

/// Tail-follow cursor over the active log file. Detects rotation (inode
/// change on unix) and truncation, reopening/rewinding transparently.
pub struct Follower {
    path: PathBuf,
    session_key: Option<String>,
    run_id: Option<String>,
    poll_interval: Duration,
    file: std::fs::File,
    offset: u64,
}

impl Follower {
    fn open(path: &Path) -> Result<std::fs::File> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).read(true).open(path).with_context(|| format!("opening {}", path.display()))
    }

    pub fn new(path: impl Into<PathBuf>, session_key: Option<String>, run_id: Option<String>, poll_interval: Duration) -> Result<Self> {
        let path = path.into();
        let file = Self::open(&path)?;
        let offset = file.metadata()?.len();
        Ok(Self { path, session_key, run_id, poll_interval, file, offset })
    }

    #[cfg(unix)]
    fn identity(meta: &std::fs::Metadata) -> (u64, u64) {
        use std::os::unix::fs::MetadataExt;
        (meta.ino(), meta.dev())
    }

    #[cfg(not(unix))]
    fn identity(_meta: &std::fs::Metadata) -> (u64, u64) {
        (0, 0)
    }

    fn reopen_if_rotated_or_truncated(&mut self) -> Result<()> {
        let latest = std::fs::metadata(&self.path);
        let Ok(latest) = latest else {
            self.file = Self::open(&self.path)?;
            self.offset = 0;
            return Ok(());
        };
        let current = self.file.metadata()?;
        if Self::identity(&current) != Self::identity(&latest) {
            self.file = Self::open(&self.path)?;
            self.offset = 0;
        } else if latest.len() < self.offset {
            self.offset = 0;
        }
        Ok(())
    }

    /// Block until the next matching event, polling `poll_interval` while idle.
    pub async fn next(&mut self) -> Result<Value> {
        loop {
            let (line, new_offset) = {
                use std::io::{Read, Seek, SeekFrom};
                self.file.seek(SeekFrom::Start(self.offset))?;
                let mut buf = String::new();
                self.file.read_to_string(&mut buf)?;
                let mut lines = buf.lines();
                match lines.next() {
                    Some(first) => {
                        let consumed = first.len() as u64 + 1;
                        (Some(first.to_string()), self.offset + consumed)
                    }
                    None => (None, self.offset),
                }
            };

            if let Some(raw) = line {
                self.offset = new_offset;
                if let Some(event) = decode_line(&raw) {
                    if matches(&event, self.session_key.as_deref(), self.run_id.as_deref()) {
                        return Ok(event);
                    }
                }
                continue;
            }

            tokio::time::sleep(self.poll_interval).await;
            self.reopen_if_rotated_or_truncated()?;
        }
    }
}
