// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Slash-command recognition for the dispatcher's main loop.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Stop,
    New,
    Help,
    Plan,
    Normal,
    DoctorStart,
    DoctorStatus,
    DoctorCancel,
    DoctorResume,
}

pub const HELP_TEXT: &str = "\
Available commands:
/new     - archive this conversation to long-term memory and start fresh
/help    - show this message
/plan    - switch to plan mode (clarify and propose before acting)
/normal  - leave plan mode
/doctor [start|status|cancel|resume] - run or manage a diagnostic session
/stop    - cancel any in-progress task for this conversation";

pub fn is_stop(content: &str) -> bool {
    first_token(content).as_deref() == Some("/stop")
}

pub fn is_doctor(content: &str) -> bool {
    first_token(content).as_deref().map(|t| t.starts_with("/doctor")).unwrap_or(false)
}

/// Parse a slash command from the first whitespace-split token. Returns
/// `None` for ordinary conversational content.
pub fn parse_command(content: &str) -> Option<Command> {
    let token = first_token(content)?;
    match token.as_str() {
        "/stop" => Some(Command::Stop),
        "/new" => Some(Command::New),
        "/help" => Some(Command::Help),
        "/plan" => Some(Command::Plan),
        "/normal" => Some(Command::Normal),
        t if t.starts_with("/doctor") => Some(parse_doctor_subcommand(content)),
        _ => None,
    }
}

fn parse_doctor_subcommand(content: &str) -> Command {
    match content.split_whitespace().nth(1).map(str::to_lowercase).as_deref() {
        Some("status") => Command::DoctorStatus,
        Some("cancel") => Command::DoctorCancel,
        Some("resume") => Command::DoctorResume,
        _ => Command::DoctorStart,
    }
}

fn first_token(content: &str) -> Option<String> {
    content.split_whitespace().next().map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_stop() {
        assert_eq!(parse_command("/stop"), Some(Command::Stop));
        assert!(is_stop("/STOP"));
    }

    #[test]
    fn recognizes_plain_doctor_as_start() {
        assert_eq!(parse_command("/doctor"), Some(Command::DoctorStart));
    }

    #[test]
    fn recognizes_doctor_subcommands() {
        assert_eq!(parse_command("/doctor status"), Some(Command::DoctorStatus));
        assert_eq!(parse_command("/doctor cancel"), Some(Command::DoctorCancel));
        assert_eq!(parse_command("/doctor resume"), Some(Command::DoctorResume));
    }

    #[test]
    fn recognizes_mode_toggles() {
        assert_eq!(parse_command("/plan"), Some(Command::Plan));
        assert_eq!(parse_command("/normal"), Some(Command::Normal));
    }

    #[test]
    fn ordinary_text_is_not_a_command() {
        assert_eq!(parse_command("what's the weather?"), None);
    }

    #[test]
    fn command_is_case_insensitive() {
        assert_eq!(parse_command("/NEW"), Some(Command::New));
    }

    #[test]
    fn is_doctor_matches_any_subcommand() {
        assert!(is_doctor("/doctor status"));
        assert!(!is_doctor("/new"));
    }
}
