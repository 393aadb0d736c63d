// Per-contact message logs
// Append-only: messages are never reordered or removed once appended. The only
// in-place changes are reconciling a provisional id and flagging a failed send.

use std::collections::HashMap;

use log::{debug, warn};

use crate::error::{ChatError, ChatResult};
use crate::models::{ContactId, DeliveryStatus, Message, MessageId};
use super::directory::ContactDirectory;

#[derive(Debug, Default)]
pub struct MessageLog {
    logs: HashMap<ContactId, Vec<Message>>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(
        &mut self,
        directory: &ContactDirectory,
        contact_id: ContactId,
        message: Message,
    ) -> ChatResult<()> {
        if !directory.contains(contact_id) {
            return Err(ChatError::InvalidContact(contact_id));
        }
        let log = self.logs.entry(contact_id).or_default();
        if log.iter().any(|m| m.id == message.id) {
            return Err(ChatError::validation(format!(
                "message {} already exists for contact {}",
                message.id, contact_id
            )));
        }
        debug!("Appending message {} to contact {}", message.id, contact_id);
        log.push(message);
        Ok(())
    }

    /// Messages for a contact, empty if the log was never loaded.
    pub fn get(&self, contact_id: ContactId) -> &[Message] {
        self.logs.get(&contact_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn last(&self, contact_id: ContactId) -> Option<&Message> {
        self.get(contact_id).last()
    }

    pub fn is_loaded(&self, contact_id: ContactId) -> bool {
        self.logs.contains_key(&contact_id)
    }

    /// Replace a log with a fetched sequence. Local messages the backend has
    /// not confirmed yet are carried over after the fetched ones, so a refresh
    /// landing during a send neither drops nor duplicates them.
    pub fn replace(&mut self, contact_id: ContactId, fetched: Vec<Message>) -> usize {
        let carried: Vec<Message> = self
            .logs
            .remove(&contact_id)
            .unwrap_or_default()
            .into_iter()
            .filter(|m| m.is_unconfirmed() && !fetched.iter().any(|f| f.id == m.id))
            .collect();

        if !carried.is_empty() {
            debug!(
                "Keeping {} unconfirmed local messages for contact {} across refresh",
                carried.len(),
                contact_id
            );
        }

        let mut log = fetched;
        log.extend(carried);
        let len = log.len();
        self.logs.insert(contact_id, log);
        len
    }

    /// Swap a provisional id for the server-assigned one after a confirmed send.
    /// If a refresh already brought in the server's copy, the provisional
    /// entry is dropped instead so ids stay unique.
    pub fn replace_local_id(
        &mut self,
        contact_id: ContactId,
        provisional: &MessageId,
        final_id: MessageId,
        final_time: &str,
    ) -> ChatResult<()> {
        if self.get(contact_id).iter().any(|m| m.id == final_id) {
            self.find_single(contact_id, provisional)?;
            debug!(
                "Message {} for contact {} already fetched, dropping {}",
                final_id, contact_id, provisional
            );
            if let Some(log) = self.logs.get_mut(&contact_id) {
                log.retain(|m| &m.id != provisional);
            }
            return Ok(());
        }

        let message = self.find_single(contact_id, provisional)?;
        message.id = final_id;
        message.time = final_time.to_string();
        message.status = DeliveryStatus::Confirmed;
        Ok(())
    }

    /// Flag a provisional message whose send failed. It stays in the log.
    pub fn mark_failed(&mut self, contact_id: ContactId, provisional: &MessageId) -> ChatResult<()> {
        let message = self.find_single(contact_id, provisional)?;
        message.status = DeliveryStatus::Failed;
        Ok(())
    }

    fn find_single(
        &mut self,
        contact_id: ContactId,
        provisional: &MessageId,
    ) -> ChatResult<&mut Message> {
        let mismatch = || ChatError::ReconciliationMismatch {
            contact_id,
            provisional: provisional.clone(),
        };
        let log = self.logs.get_mut(&contact_id).ok_or_else(mismatch)?;

        let matches = log.iter().filter(|m| &m.id == provisional).count();
        if matches != 1 {
            warn!(
                "Expected one message {} for contact {}, found {}",
                provisional, contact_id, matches
            );
            return Err(mismatch());
        }
        log.iter_mut().find(|m| &m.id == provisional).ok_or_else(mismatch)
    }
}
