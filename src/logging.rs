//! Structured logging module for Hearth
//!
//! Writes logs to ~/.hearth/logs/ (override with HEARTH_LOG_DIR) with categories:
//! - PROFILE: Personality profile changes (merges, clears)
//! - TURN: Turn processing (model calls, replies)
//! - PARSER: Payload extraction from model output
//! - CONVERSATION: Session lifecycle (start, reset)
//! - ERROR: Errors and degradations

use chrono::{Local, Utc};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use once_cell::sync::Lazy;

/// Log categories for structured logging
#[derive(Debug, Clone, Copy)]
pub enum LogCategory {
    Profile,      // Personality profile changes
    Turn,         // Turn processing
    Parser,       // Payload extraction
    Conversation, // Session lifecycle
    Error,        // Errors and degradations
}

impl LogCategory {
    fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Profile => "PROFILE",
            LogCategory::Turn => "TURN",
            LogCategory::Parser => "PARSER",
            LogCategory::Conversation => "CONVERSATION",
            LogCategory::Error => "ERROR",
        }
    }
}

/// Global log file handle
static LOG_FILE: Lazy<Mutex<Option<PathBuf>>> = Lazy::new(|| Mutex::new(None));

/// Get the log directory path
fn get_log_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("HEARTH_LOG_DIR") {
        return PathBuf::from(dir);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".hearth/logs")
}

/// Get today's log file path
fn get_log_file_path() -> PathBuf {
    let today = Local::now().format("%Y-%m-%d").to_string();
    get_log_dir().join(format!("hearth-{}.log", today))
}

/// Initialize the logging system - creates log directory if needed
pub fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let log_dir = get_log_dir();

    // Create log directory if it doesn't exist
    if !log_dir.exists() {
        fs::create_dir_all(&log_dir)?;
    }

    // Store the current log file path
    let log_path = get_log_file_path();
    *LOG_FILE.lock().unwrap() = Some(log_path.clone());

    // Log startup
    log(LogCategory::Conversation, None, "Hearth logging initialized");

    Ok(())
}

/// Log a message with category and optional session context
pub fn log(category: LogCategory, session_id: Option<&str>, message: &str) {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let session_context = session_id
        .map(|id| format!("session={} | ", &id[..8.min(id.len())]))
        .unwrap_or_default();

    let log_line = format!(
        "[{}] [{}] {}{}\n",
        timestamp,
        category.as_str(),
        session_context,
        message
    );

    // Always print to console (for dev)
    print!("{}", log_line);

    // Write to file
    let log_path = get_log_file_path();
    if let Ok(mut file) = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        let _ = file.write_all(log_line.as_bytes());
    }
}

/// Log a profile event (trait merged, profile cleared)
pub fn log_profile(session_id: Option<&str>, message: &str) {
    log(LogCategory::Profile, session_id, message);
}

/// Log a turn-processing event
pub fn log_turn(session_id: Option<&str>, message: &str) {
    log(LogCategory::Turn, session_id, message);
}

/// Log a payload-extraction event
pub fn log_parser(session_id: Option<&str>, message: &str) {
    log(LogCategory::Parser, session_id, message);
}

/// Log a session lifecycle event
pub fn log_conversation(session_id: Option<&str>, message: &str) {
    log(LogCategory::Conversation, session_id, message);
}

/// Log an error
pub fn log_error(session_id: Option<&str>, message: &str) {
    log(LogCategory::Error, session_id, message);
}

/// Clean up old log files (keep last 7 days)
pub fn cleanup_old_logs() -> Result<usize, Box<dyn std::error::Error>> {
    let log_dir = get_log_dir();
    let mut deleted = 0;

    if !log_dir.exists() {
        return Ok(0);
    }

    let cutoff = Utc::now() - chrono::Duration::days(7);

    for entry in fs::read_dir(&log_dir)? {
        let entry = entry?;
        let path = entry.path();

        if let Ok(metadata) = entry.metadata() {
            if let Ok(modified) = metadata.modified() {
                let modified_time: chrono::DateTime<Utc> = modified.into();
                if modified_time < cutoff {
                    if fs::remove_file(&path).is_ok() {
                        deleted += 1;
                    }
                }
            }
        }
    }

    Ok(deleted)
}
