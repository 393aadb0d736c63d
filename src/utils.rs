use anyhow::Result;
use chrono::{DateTime, Local};
use log::{LevelFilter, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Mutex;

use murmur::{ChatSnapshot, DeliveryStatus, Direction, MessageKind, Notice, NoticeLevel};

// Logging and terminal helpers for the murmur binary.

pub struct SimpleLogger {
    log_file: Option<Mutex<File>>,
}

impl SimpleLogger {
    pub fn new(log_file_path: Option<&str>) -> Result<Self> {
        let log_file = match log_file_path {
            Some(path) => Some(Mutex::new(OpenOptions::new().create(true).append(true).open(path)?)),
            None => None,
        };

        Ok(SimpleLogger { log_file })
    }
}

impl log::Log for SimpleLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let now: DateTime<Local> = Local::now();
        let log_message = format!(
            "[{}] {} [{}:{}] {}\n",
            now.format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.file().unwrap_or("unknown"),
            record.line().unwrap_or(0),
            record.args()
        );

        match &self.log_file {
            Some(file) => {
                if let Ok(mut file) = file.lock() {
                    let _ = file.write_all(log_message.as_bytes());
                }
            }
            // The terminal belongs to the REPL when logging to a file
            None => eprint!("{}", log_message),
        }
    }

    fn flush(&self) {
        match &self.log_file {
            Some(file) => {
                if let Ok(mut file) = file.lock() {
                    let _ = file.flush();
                }
            }
            None => {
                let _ = std::io::stderr().flush();
            }
        }
    }
}

pub fn setup_logging(log_file: Option<&str>, level: LevelFilter) -> Result<()> {
    let logger = SimpleLogger::new(log_file)?;
    log::set_boxed_logger(Box::new(logger)).map(|()| log::set_max_level(level))?;

    log::info!("Logging initialized at level: {}", level);
    log::info!("App version: {} ({})", env!("CARGO_PKG_VERSION"), env!("CARGO_PKG_NAME"));

    Ok(())
}

pub fn format_notice(notice: &Notice) -> String {
    let tag = match notice.level {
        NoticeLevel::Info => "info",
        NoticeLevel::Success => "ok",
        NoticeLevel::Error => "error",
    };
    match &notice.detail {
        Some(detail) => format!("[{}] {}: {}", tag, notice.title, detail),
        None => format!("[{}] {}", tag, notice.title),
    }
}

pub fn format_contacts(snapshot: &ChatSnapshot) -> String {
    let mut out = format!("Contacts ({} unread)\n", snapshot.total_unread);
    for contact in &snapshot.contacts {
        let marker = if snapshot.active_contact == Some(contact.id) { '>' } else { ' ' };
        let presence = if contact.online { "●" } else { "○" };
        let unread = match contact.unread_count {
            0 => String::new(),
            n => format!(" ({})", n),
        };
        out.push_str(&format!(
            "{} {:>3} {} {} {}{}  {}  {}\n",
            marker,
            contact.id,
            presence,
            contact.avatar,
            contact.name,
            unread,
            contact.last_activity_time,
            contact.last_message_preview
        ));
    }
    out
}

pub fn format_conversation(snapshot: &ChatSnapshot) -> String {
    let Some(active) = snapshot.active_contact else {
        return "No conversation open. Use /open <id>.\n".to_string();
    };
    let name = snapshot
        .contacts
        .iter()
        .find(|c| c.id == active)
        .map(|c| c.name.as_str())
        .unwrap_or("?");

    let mut out = format!("--- {} ---\n", name);
    for message in &snapshot.conversation {
        let who = match message.direction {
            Direction::Mine => "me",
            Direction::Theirs => name,
        };
        let kind = match message.kind {
            MessageKind::Video => format!(" [{}]", message.kind.as_str()),
            MessageKind::Text => String::new(),
        };
        let status = match message.status {
            DeliveryStatus::Pending => " …",
            DeliveryStatus::Failed => " ✗ not sent",
            DeliveryStatus::Confirmed => "",
        };
        out.push_str(&format!("{} {}:{} {}{}\n", message.time, who, kind, message.text, status));
    }
    if snapshot.loading {
        out.push_str("(loading…)\n");
    }
    if snapshot.typing {
        out.push_str(&format!("{} is typing…\n", name));
    }
    out
}
