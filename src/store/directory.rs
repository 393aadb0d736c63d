// Contact directory
// Keeps contacts in load order. Every mutation recomputes the unread total.

use log::{debug, info};

use crate::error::{ChatError, ChatResult};
use crate::models::{Contact, ContactId, ContactPatch};
use super::unread::UnreadAggregator;

/// How `upsert` treats an id the directory has not seen yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertMode {
    /// Unknown ids fail with `NotFound`
    UpdateOnly,
    /// Unknown ids are inserted if the patch is complete (add-contact and reload flows)
    InsertOrUpdate,
}

#[derive(Debug, Default)]
pub struct ContactDirectory {
    contacts: Vec<Contact>,
    unread: UnreadAggregator,
}

impl ContactDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contacts in load order. No recency ordering is applied here.
    pub fn list(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn get(&self, id: ContactId) -> Option<&Contact> {
        self.contacts.iter().find(|c| c.id == id)
    }

    pub fn contains(&self, id: ContactId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn total_unread(&self) -> u32 {
        self.unread.total()
    }

    pub fn unread(&self) -> &UnreadAggregator {
        &self.unread
    }

    pub fn upsert(&mut self, patch: ContactPatch, mode: UpsertMode) -> ChatResult<()> {
        match self.position(patch.id) {
            Some(idx) => {
                apply_patch(&mut self.contacts[idx], patch);
            }
            None => {
                if mode != UpsertMode::InsertOrUpdate || !patch.is_complete() {
                    return Err(ChatError::NotFound(patch.id));
                }
                let mut contact = Contact::new(patch.id, "", "");
                let id = patch.id;
                apply_patch(&mut contact, patch);
                debug!("Inserted contact {} ({})", id, contact.name);
                self.contacts.push(contact);
            }
        }
        self.recompute();
        Ok(())
    }

    pub fn set_unread(&mut self, id: ContactId, count: u32) -> ChatResult<()> {
        let contact = self.get_mut(id)?;
        contact.unread_count = count;
        self.recompute();
        Ok(())
    }

    pub fn increment_unread(&mut self, id: ContactId) -> ChatResult<()> {
        let contact = self.get_mut(id)?;
        contact.unread_count = contact.unread_count.saturating_add(1);
        self.recompute();
        Ok(())
    }

    /// Update preview and activity time. Unread is left alone.
    pub fn touch(&mut self, id: ContactId, preview: &str, time: &str) -> ChatResult<()> {
        let contact = self.get_mut(id)?;
        contact.last_message_preview = preview.to_string();
        contact.last_activity_time = time.to_string();
        self.recompute();
        Ok(())
    }

    /// Merge a freshly fetched contact list. Known contacts keep their place,
    /// new ones are appended and nothing is removed.
    pub fn reload(&mut self, fetched: Vec<Contact>) {
        let before = self.contacts.len();
        for contact in fetched {
            match self.position(contact.id) {
                Some(idx) => self.contacts[idx] = contact,
                None => self.contacts.push(contact),
            }
        }
        info!(
            "Directory reloaded: {} contacts ({} new)",
            self.contacts.len(),
            self.contacts.len() - before
        );
        self.recompute();
    }

    fn position(&self, id: ContactId) -> Option<usize> {
        self.contacts.iter().position(|c| c.id == id)
    }

    fn get_mut(&mut self, id: ContactId) -> ChatResult<&mut Contact> {
        self.contacts
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(ChatError::NotFound(id))
    }

    fn recompute(&self) {
        self.unread.recompute(&self.contacts);
    }
}

fn apply_patch(contact: &mut Contact, patch: ContactPatch) {
    if let Some(name) = patch.name {
        contact.name = name;
    }
    if let Some(avatar) = patch.avatar {
        contact.avatar = avatar;
    }
    if let Some(preview) = patch.last_message_preview {
        contact.last_message_preview = preview;
    }
    if let Some(time) = patch.last_activity_time {
        contact.last_activity_time = time;
    }
    if let Some(unread) = patch.unread_count {
        contact.unread_count = unread;
    }
    if let Some(online) = patch.online {
        contact.online = online;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(id: ContactId, name: &str, unread: u32) -> Contact {
        let mut c = Contact::new(id, name, "*");
        c.unread_count = unread;
        c
    }

    fn sum(directory: &ContactDirectory) -> u32 {
        directory.list().iter().map(|c| c.unread_count).sum()
    }

    #[test]
    fn test_upsert_unknown_partial_fails() {
        let mut directory = ContactDirectory::new();
        let mut patch = ContactPatch::new(42);
        patch.online = Some(true);

        assert!(matches!(
            directory.upsert(patch.clone(), UpsertMode::UpdateOnly),
            Err(ChatError::NotFound(42))
        ));
        // Incomplete patch is rejected even when inserting is allowed
        assert!(matches!(
            directory.upsert(patch, UpsertMode::InsertOrUpdate),
            Err(ChatError::NotFound(42))
        ));
        assert!(directory.is_empty());
    }

    #[test]
    fn test_upsert_insert_then_update() {
        let mut directory = ContactDirectory::new();
        directory
            .upsert(contact(1, "Anna", 2).into(), UpsertMode::InsertOrUpdate)
            .unwrap();

        let mut patch = ContactPatch::new(1);
        patch.online = Some(true);
        directory.upsert(patch, UpsertMode::UpdateOnly).unwrap();

        let anna = directory.get(1).unwrap();
        assert_eq!(anna.name, "Anna");
        assert!(anna.online);
        assert_eq!(directory.total_unread(), 2);
    }

    #[test]
    fn test_touch_keeps_unread() {
        let mut directory = ContactDirectory::new();
        directory.reload(vec![contact(1, "Anna", 3)]);

        directory.touch(1, "hi", "10:31").unwrap();
        let anna = directory.get(1).unwrap();
        assert_eq!(anna.last_message_preview, "hi");
        assert_eq!(anna.last_activity_time, "10:31");
        assert_eq!(anna.unread_count, 3);

        assert!(matches!(directory.touch(9, "x", "y"), Err(ChatError::NotFound(9))));
    }

    #[test]
    fn test_reload_preserves_order_and_keeps_missing() {
        let mut directory = ContactDirectory::new();
        directory.reload(vec![contact(1, "Anna", 0), contact(2, "Max", 1)]);
        directory.reload(vec![contact(3, "Maria", 4), contact(1, "Anna I.", 2)]);

        let ids: Vec<ContactId> = directory.list().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(directory.get(1).unwrap().name, "Anna I.");
        assert_eq!(directory.total_unread(), 7);
    }

    #[test]
    fn test_total_matches_sum_after_every_mutation() {
        let mut directory = ContactDirectory::new();
        directory.reload(vec![contact(1, "Anna", 2), contact(2, "Class 6B", 5)]);
        assert_eq!(directory.total_unread(), sum(&directory));

        directory.set_unread(1, 0).unwrap();
        assert_eq!(directory.total_unread(), sum(&directory));

        directory.increment_unread(2).unwrap();
        assert_eq!(directory.total_unread(), sum(&directory));
        assert_eq!(directory.total_unread(), 6);

        directory.touch(2, "Homework?", "09:15").unwrap();
        assert_eq!(directory.total_unread(), sum(&directory));

        let mut patch = ContactPatch::new(3);
        patch.name = Some("Maria".to_string());
        patch.unread_count = Some(1);
        directory.upsert(patch, UpsertMode::InsertOrUpdate).unwrap();
        assert_eq!(directory.total_unread(), sum(&directory));
        assert_eq!(directory.total_unread(), 7);
    }
}
