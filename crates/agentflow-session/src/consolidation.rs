// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::debug;

use agentflow_model::Message;

use crate::session::Session;

/// Fixed marker words scanned to derive `topic_tags` for a history entry.
/// Deliberately small and unrelated to the context compressor's salience
/// keyword set — this is a coarse topical label, not a relevance score.
const TAG_MARKERS: &[&str] = &[
    "bug", "error", "deploy", "release", "refactor", "test", "security", "config", "api",
    "migration", "performance", "docs",
];

fn extract_topic_tags(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut tags: Vec<String> = TAG_MARKERS.iter().filter(|m| lower.contains(**m)).map(|m| m.to_string()).collect();
    tags.sort();
    tags.dedup();
    tags
}

/// Render a message slice as plain `"<role>: <text>"` lines for the
/// consolidation body, skipping messages with no extractable text.
fn serialize_turns(messages: &[Message]) -> String {
    messages
        .iter()
        .filter_map(|m| m.as_text().map(|text| format!("{}: {text}", m.role_name())))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Append one entry block to `workspace/memory/HISTORY.md`, creating the
/// directory and file as needed.
async fn write_history_entry(
    workspace_root: &Path,
    entry_id: &str,
    timestamp: &str,
    topic_tags: &[String],
    source_turn_range: &str,
    body: &str,
) -> Result<()> {
    let dir = workspace_root.join("memory");
    tokio::fs::create_dir_all(&dir).await.with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join("HISTORY.md");

    let block = format!(
        "### entry_id: {entry_id}\n- timestamp: {timestamp}\n- topic_tags: {}\n- source_turn_range: {source_turn_range}\n\n{body}\n\n",
        topic_tags.join(","),
    );

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    use tokio::io::AsyncWriteExt;
    file.write_all(block.as_bytes()).await.with_context(|| format!("appending to {}", path.display()))?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ConsolidationReport {
    pub entry_id: Option<String>,
    pub archived_messages: usize,
    pub cleared: bool,
}

/// Archive messages from `session.last_consolidated` (or from the start, when
/// `archive_all`) up to the current end of the log into a HISTORY.md entry,
/// then advance the consolidation cursor. `archive_all` additionally clears
/// the session (used by `/new`); a windowed background pass only advances
/// the cursor, per the invariant that `push` is the only way messages shrink.
pub async fn consolidate(session: &mut Session, workspace_root: &Path, archive_all: bool) -> Result<ConsolidationReport> {
    let start = if archive_all { 0 } else { session.last_consolidated };
    let end = session.messages.len();

    if start >= end {
        return Ok(ConsolidationReport { entry_id: None, archived_messages: 0, cleared: false });
    }

    let slice = &session.messages[start..end];
    let body = serialize_turns(slice);
    let tags = extract_topic_tags(&body);

    let now = Utc::now();
    let entry_id = now.format("%Y%m%d%H%M%S%6f").to_string();
    let timestamp = now.format("%Y-%m-%d %H:%M:%S").to_string();
    let source_turn_range = format!("{start}-{end}");

    write_history_entry(workspace_root, &entry_id, &timestamp, &tags, &source_turn_range, &body).await?;
    debug!(key = %session.key, entry_id, archived = slice.len(), "consolidated session history");

    let archived = slice.len();
    if archive_all {
        session.clear();
        Ok(ConsolidationReport { entry_id: Some(entry_id), archived_messages: archived, cleared: true })
    } else {
        session.last_consolidated = end;
        Ok(ConsolidationReport { entry_id: Some(entry_id), archived_messages: archived, cleared: false })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn consolidate_writes_history_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new("cli:chat-1");
        session.push_many([Message::user("There is a bug in the deploy pipeline"), Message::assistant("Investigating.")]);

        let report = consolidate(&mut session, dir.path(), false).await.unwrap();
        assert_eq!(report.archived_messages, 2);
        assert!(!report.cleared);
        assert_eq!(session.last_consolidated, 2);

        let history = tokio::fs::read_to_string(dir.path().join("memory/HISTORY.md")).await.unwrap();
        assert!(history.contains("### entry_id:"));
        assert!(history.contains("bug"));
        assert!(history.contains("source_turn_range: 0-2"));
    }

    #[tokio::test]
    async fn archive_all_clears_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new("cli:chat-1");
        session.push_many([Message::user("hi"), Message::assistant("hello")]);

        let report = consolidate(&mut session, dir.path(), true).await.unwrap();
        assert!(report.cleared);
        assert!(session.messages.is_empty());
        assert_eq!(session.last_consolidated, 0);
    }

    #[tokio::test]
    async fn nothing_to_consolidate_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new("cli:chat-1");
        session.push(Message::user("hi"));
        session.last_consolidated = 1;

        let report = consolidate(&mut session, dir.path(), false).await.unwrap();
        assert_eq!(report.archived_messages, 0);
        assert!(report.entry_id.is_none());
        assert!(!dir.path().join("memory/HISTORY.md").exists());
    }

    #[tokio::test]
    async fn second_consolidation_only_archives_new_messages() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new("cli:chat-1");
        session.push_many([Message::user("first"), Message::assistant("ack")]);
        consolidate(&mut session, dir.path(), false).await.unwrap();

        session.push_many([Message::user("second"), Message::assistant("ack again")]);
        let report = consolidate(&mut session, dir.path(), false).await.unwrap();
        assert_eq!(report.archived_messages, 2);

        let history = tokio::fs::read_to_string(dir.path().join("memory/HISTORY.md")).await.unwrap();
        assert_eq!(history.matches("### entry_id:").count(), 2);
        assert!(history.contains("source_turn_range: 2-4"));
    }

    #[test]
    fn topic_tags_extracted_from_body() {
        let tags = extract_topic_tags("We found a bug during deploy; needs a security review.");
        assert!(tags.contains(&"bug".to_string()));
        assert!(tags.contains(&"deploy".to_string()));
        assert!(tags.contains(&"security".to_string()));
    }

    #[test]
    fn topic_tags_empty_when_no_markers() {
        assert!(extract_topic_tags("just chatting about the weather").is_empty());
    }

    #[test]
    fn serialize_turns_skips_empty_text() {
        let msgs = vec![Message::user("hello"), Message::user_with_parts(vec![])];
        let body = serialize_turns(&msgs);
        assert_eq!(body, "user: hello");
    }
}
