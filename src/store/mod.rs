// Local chat state: contact directory, per-contact logs and the derived
// unread total. Owned by the sync engine, which is the only writer.

pub mod directory;
pub mod message_log;
pub mod unread;

pub use directory::{ContactDirectory, UpsertMode};
pub use message_log::MessageLog;
pub use unread::UnreadAggregator;

use crate::error::ChatResult;
use crate::models::{ContactId, Message};

#[derive(Debug, Default)]
pub struct ChatStore {
    directory: ContactDirectory,
    log: MessageLog,
}

impl ChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn directory(&self) -> &ContactDirectory {
        &self.directory
    }

    pub fn directory_mut(&mut self) -> &mut ContactDirectory {
        &mut self.directory
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut MessageLog {
        &mut self.log
    }

    pub fn append(&mut self, contact_id: ContactId, message: Message) -> ChatResult<()> {
        self.log.append(&self.directory, contact_id, message)
    }

    /// Point the contact's preview at the newest message in its log.
    pub fn refresh_preview(&mut self, contact_id: ContactId) -> ChatResult<()> {
        let Some(last) = self.log.last(contact_id) else {
            return Ok(());
        };
        let (text, time) = (last.text.clone(), last.time.clone());
        self.directory.touch(contact_id, &text, &time)
    }
}
