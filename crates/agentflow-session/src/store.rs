// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::session::Session;

/// Filesystem-backed session snapshot store: one JSON file per session key
/// under `<data_dir>/sessions/`.
pub struct SessionStore {
    data_dir: PathBuf,
}

/// Session keys carry `:` and `/` (e.g. `telegram:1234`); neither is safe as
/// a filename component on every platform, so non-alphanumeric bytes are
/// mapped to `_` to derive a stable, collision-resistant file stem.
fn sanitize_key(key: &str) -> String {
    key.chars().map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' }).collect()
}

impl SessionStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.data_dir.join("sessions").join(format!("{}.json", sanitize_key(key)))
    }

    pub async fn load(&self, key: &str) -> Result<Option<Session>> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => {
                let session = serde_json::from_str(&text)
                    .with_context(|| format!("parsing session snapshot {}", path.display()))?;
                Ok(Some(session))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading session snapshot {}", path.display())),
        }
    }

    pub async fn save(&self, session: &Session) -> Result<()> {
        let path = self.path_for(&session.key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(session)?;
        tokio::fs::write(&path, json).await.with_context(|| format!("writing session snapshot {}", path.display()))?;
        debug!(key = %session.key, path = %path.display(), "saved session snapshot");
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("deleting session snapshot {}", path.display())),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_model::Message;

    #[tokio::test]
    async fn load_missing_session_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        assert!(store.load("cli:chat-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let mut session = Session::new("cli:chat-1");
        session.push(Message::user("hello"));
        store.save(&session).await.unwrap();

        let loaded = store.load("cli:chat-1").await.unwrap().unwrap();
        assert_eq!(loaded.key, "cli:chat-1");
        assert_eq!(loaded.messages.len(), 1);
    }

    #[tokio::test]
    async fn sanitizes_key_with_colon_into_filename() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let session = Session::new("telegram:9999");
        store.save(&session).await.unwrap();
        assert!(store.path_for("telegram:9999").exists());
    }

    #[tokio::test]
    async fn delete_removes_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let session = Session::new("cli:chat-1");
        store.save(&session).await.unwrap();
        store.delete("cli:chat-1").await.unwrap();
        assert!(store.load("cli:chat-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_missing_session_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store.delete("nope").await.unwrap();
    }
}
