// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::Path;

use agentflow_model::{ContentPart, Message};
use agentflow_tools::{tag_content, TrustLevel};
use base64::Engine;
use chrono::Local;

fn guess_mime(path: &Path) -> Option<&'static str> {
    match path.extension().and_then(|e| e.to_str()).map(str::to_lowercase).as_deref() {
        Some("png") => Some("image/png"),
        Some("jpg") | Some("jpeg") => Some("image/jpeg"),
        Some("gif") => Some("image/gif"),
        Some("webp") => Some("image/webp"),
        Some("bmp") => Some("image/bmp"),
        _ => None,
    }
}

/// Attempt to turn one media path into a data-URL image part. Returns `None`
/// when the file is missing or not an `image/*` MIME — silently dropped per
/// the context-builder contract, not an error.
fn media_to_part(path: &str) -> Option<ContentPart> {
    let p = Path::new(path);
    let mime = guess_mime(p)?;
    let bytes = std::fs::read(p).ok()?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Some(ContentPart::image(format!("data:{mime};base64,{encoded}")))
}

/// Render the runtime-metadata block injected just before the current user
/// turn: current timestamp, timezone, channel, and chat id, wrapped as
/// `UNTRUSTED` content since it is not an instruction from the user.
fn runtime_metadata_message(channel: &str, chat_id: &str) -> Message {
    let now = Local::now();
    let body = format!(
        "timestamp: {}\ntimezone: {}\nchannel: {channel}\nchat_id: {chat_id}",
        now.format("%Y-%m-%dT%H:%M:%S%:z"),
        now.format("%Z"),
    );
    Message::user(tag_content(TrustLevel::Untrusted, "runtime_metadata", &body))
}

/// Assemble the full message list sent to the provider for one turn:
/// `[system, …history, runtime_metadata, user]`.
///
/// `media` is a list of local file paths; each is attached as a data-URL
/// image part to the user message when it exists and resolves to an
/// `image/*` MIME, otherwise it is dropped without error.
pub fn build_messages(
    system_prompt: &str,
    history: &[Message],
    current: &str,
    media: &[String],
    channel: &str,
    chat_id: &str,
) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 3);
    messages.push(Message::system(system_prompt));
    messages.extend_from_slice(history);
    messages.push(runtime_metadata_message(channel, chat_id));

    let mut parts = vec![ContentPart::text(current)];
    parts.extend(media.iter().filter_map(|m| media_to_part(m)));
    messages.push(Message::user_with_parts(parts));

    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_shape_without_media() {
        let history = vec![Message::user("hi"), Message::assistant("hello")];
        let out = build_messages("You are helpful.", &history, "how are you?", &[], "cli", "chat-1");
        assert_eq!(out.len(), 5);
        assert_eq!(out[0].role_name(), "system");
        assert_eq!(out[1].role_name(), "user");
        assert_eq!(out[2].role_name(), "assistant");
        assert_eq!(out[3].role_name(), "user");
        assert_eq!(out[4].role_name(), "user");
    }

    #[test]
    fn runtime_metadata_is_untrusted_tagged() {
        let out = build_messages("sys", &[], "hi", &[], "cli", "chat-1");
        let metadata = out[out.len() - 2].as_text().unwrap();
        assert!(metadata.contains("BEGIN UNTRUSTED CONTENT: runtime_metadata"));
        assert!(metadata.contains("channel: cli"));
        assert!(metadata.contains("chat_id: chat-1"));
    }

    #[test]
    fn missing_media_file_is_silently_dropped() {
        let out = build_messages("sys", &[], "hi", &["/no/such/file.png".to_string()], "cli", "chat-1");
        let user_msg = out.last().unwrap();
        assert_eq!(user_msg.image_urls().len(), 0);
    }

    #[test]
    fn non_image_media_is_silently_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello").unwrap();
        let out = build_messages("sys", &[], "hi", &[path.to_string_lossy().to_string()], "cli", "chat-1");
        let user_msg = out.last().unwrap();
        assert_eq!(user_msg.image_urls().len(), 0);
    }

    #[test]
    fn image_media_attaches_as_data_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pic.png");
        std::fs::write(&path, b"\x89PNG\r\n\x1a\n").unwrap();
        let out = build_messages("sys", &[], "look at this", &[path.to_string_lossy().to_string()], "cli", "chat-1");
        let user_msg = out.last().unwrap();
        let urls = user_msg.image_urls();
        assert_eq!(urls.len(), 1);
        assert!(urls[0].starts_with("data:image/png;base64,"));
    }

    #[test]
    fn system_prompt_is_preserved_verbatim() {
        let out = build_messages("Custom system prompt.", &[], "hi", &[], "cli", "chat-1");
        assert_eq!(out[0].as_text(), Some("Custom system prompt."));
    }
}
