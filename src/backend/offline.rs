// In-memory backend for the offline variant
// Behaves like the remote service: it assigns message and contact ids, stamps
// times, and marks a conversation's incoming messages read when it is fetched.

use std::collections::HashMap;

use async_trait::async_trait;
use log::{debug, info};
use tokio::sync::Mutex as TokioMutex;

use super::{ChatBackend, NewContact, OutgoingMessage, SendReceipt, DEFAULT_AVATAR};
use crate::error::{ChatError, ChatResult};
use crate::models::{
    current_time_label, Contact, ContactId, DeliveryStatus, Direction, Message, MessageId,
    MessageKind,
};

#[derive(Debug, Clone)]
struct StoredMessage {
    id: i64,
    from_me: bool,
    text: String,
    kind: MessageKind,
    time: String,
    read: bool,
}

impl StoredMessage {
    fn to_message(&self) -> Message {
        Message {
            id: MessageId::Server(self.id),
            text: self.text.clone(),
            time: self.time.clone(),
            direction: if self.from_me { Direction::Mine } else { Direction::Theirs },
            kind: self.kind,
            status: DeliveryStatus::Confirmed,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredContact {
    id: ContactId,
    name: String,
    avatar: String,
    online: bool,
}

#[derive(Debug, Default)]
struct OfflineState {
    contacts: Vec<StoredContact>,
    messages: HashMap<ContactId, Vec<StoredMessage>>,
    next_message_id: i64,
    next_contact_id: ContactId,
}

impl OfflineState {
    fn push_message(&mut self, contact_id: ContactId, from_me: bool, text: &str, kind: MessageKind, time: &str, read: bool) -> StoredMessage {
        self.next_message_id += 1;
        let stored = StoredMessage {
            id: self.next_message_id,
            from_me,
            text: text.to_string(),
            kind,
            time: time.to_string(),
            read,
        };
        self.messages.entry(contact_id).or_default().push(stored.clone());
        stored
    }

    fn add_contact(&mut self, name: &str, avatar: &str, online: bool) -> ContactId {
        self.next_contact_id += 1;
        let id = self.next_contact_id;
        self.contacts.push(StoredContact {
            id,
            name: name.to_string(),
            avatar: avatar.to_string(),
            online,
        });
        id
    }

    fn contains(&self, id: ContactId) -> bool {
        self.contacts.iter().any(|c| c.id == id)
    }
}

#[derive(Debug, Default)]
pub struct OfflineBackend {
    state: TokioMutex<OfflineState>,
}

impl OfflineBackend {
    /// An empty backend with no contacts.
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend pre-populated with a handful of demo conversations.
    pub fn with_demo_data() -> Self {
        let mut state = OfflineState::default();

        let anna = state.add_contact("Anna Ivanova", "👩‍💼", true);
        state.push_message(anna, false, "Hi! How are you?", MessageKind::Text, "10:25", true);
        state.push_message(anna, true, "Great! And you?", MessageKind::Text, "10:27", true);
        state.push_message(anna, false, "Good too 😊", MessageKind::Text, "10:28", false);
        state.push_message(anna, false, "Are we still on for tonight?", MessageKind::Text, "10:30", false);

        let class = state.add_contact("Class 6B", "🎓", false);
        state.push_message(class, true, "Exercises 5-10 from the textbook", MessageKind::Text, "09:10", true);
        for text in ["Homework for tomorrow?", "Anyone?", "Is it due Friday?", "Please reply", "Homework for tomorrow?"] {
            state.push_message(class, false, text, MessageKind::Text, "09:15", false);
        }

        let max = state.add_contact("Max Petrov", "👨‍💻", false);
        state.push_message(max, false, "Hi!", MessageKind::Text, "Yesterday", true);
        state.push_message(max, false, "Look at this clip", MessageKind::Video, "Yesterday", true);

        let maria = state.add_contact("Maria Smirnova", "👩‍🎨", true);
        state.push_message(maria, false, "Thanks a lot!", MessageKind::Text, "Yesterday", true);
        state.push_message(maria, true, "Any time! 😊", MessageKind::Text, "Yesterday", true);

        Self {
            state: TokioMutex::new(state),
        }
    }

    /// Record a message from the other party, as if it arrived at the server.
    pub async fn deliver_incoming(&self, contact_id: ContactId, text: &str) -> ChatResult<Message> {
        let mut state = self.state.lock().await;
        if !state.contains(contact_id) {
            return Err(ChatError::NotFound(contact_id));
        }
        let stored = state.push_message(contact_id, false, text, MessageKind::Text, &current_time_label(), false);
        debug!("Delivered simulated message {} from contact {}", stored.id, contact_id);
        Ok(stored.to_message())
    }
}

#[async_trait]
impl ChatBackend for OfflineBackend {
    async fn fetch_contacts(&self, _user_id: ContactId) -> ChatResult<Vec<Contact>> {
        let state = self.state.lock().await;
        let contacts = state
            .contacts
            .iter()
            .map(|c| {
                let messages = state.messages.get(&c.id).map(Vec::as_slice).unwrap_or(&[]);
                let last = messages.last();
                Contact {
                    id: c.id,
                    name: c.name.clone(),
                    avatar: c.avatar.clone(),
                    last_message_preview: last.map(|m| m.text.clone()).unwrap_or_default(),
                    last_activity_time: last.map(|m| m.time.clone()).unwrap_or_default(),
                    unread_count: messages.iter().filter(|m| !m.from_me && !m.read).count() as u32,
                    online: c.online,
                }
            })
            .collect();
        Ok(contacts)
    }

    async fn fetch_messages(&self, _user_id: ContactId, contact_id: ContactId) -> ChatResult<Vec<Message>> {
        let mut state = self.state.lock().await;
        let Some(messages) = state.messages.get_mut(&contact_id) else {
            return Ok(Vec::new());
        };
        for message in messages.iter_mut().filter(|m| !m.from_me) {
            message.read = true;
        }
        Ok(messages.iter().map(StoredMessage::to_message).collect())
    }

    async fn send_message(&self, _user_id: ContactId, message: &OutgoingMessage) -> ChatResult<SendReceipt> {
        let mut state = self.state.lock().await;
        if !state.contains(message.receiver_id) {
            return Err(ChatError::network(format!("unknown receiver {}", message.receiver_id)));
        }
        let stored = state.push_message(
            message.receiver_id,
            true,
            &message.text,
            message.kind,
            &current_time_label(),
            true,
        );
        Ok(SendReceipt {
            message_id: stored.id,
            time: stored.time,
        })
    }

    async fn add_contact(&self, _user_id: ContactId, contact: &NewContact) -> ChatResult<Option<ContactId>> {
        let mut state = self.state.lock().await;
        let avatar = contact.avatar.as_deref().unwrap_or(DEFAULT_AVATAR);
        let id = state.add_contact(&contact.name, avatar, false);
        info!("Offline backend added contact {} ({})", id, contact.name);
        Ok(Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_demo_data_unread_counts() {
        let backend = OfflineBackend::with_demo_data();
        let contacts = backend.fetch_contacts(1).await.unwrap();
        let unread: Vec<u32> = contacts.iter().map(|c| c.unread_count).collect();
        assert_eq!(unread, vec![2, 5, 0, 0]);
        assert_eq!(contacts[0].last_message_preview, "Are we still on for tonight?");
    }

    #[tokio::test]
    async fn test_fetch_messages_marks_read() {
        let backend = OfflineBackend::with_demo_data();
        let messages = backend.fetch_messages(1, 1).await.unwrap();
        assert_eq!(messages.len(), 4);

        let contacts = backend.fetch_contacts(1).await.unwrap();
        assert_eq!(contacts[0].unread_count, 0);
    }

    #[tokio::test]
    async fn test_send_and_add_contact() {
        let backend = OfflineBackend::new();
        let id = backend
            .add_contact(1, &NewContact { name: "X".into(), avatar: None, phone: None })
            .await
            .unwrap()
            .unwrap();

        let receipt = backend
            .send_message(1, &OutgoingMessage { receiver_id: id, text: "hi".into(), kind: MessageKind::Text })
            .await
            .unwrap();
        let messages = backend.fetch_messages(1, id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, MessageId::Server(receipt.message_id));
        assert!(messages[0].is_mine());

        let contacts = backend.fetch_contacts(1).await.unwrap();
        assert_eq!(contacts[0].avatar, DEFAULT_AVATAR);
        assert_eq!(contacts[0].last_message_preview, "hi");
    }

    #[tokio::test]
    async fn test_deliver_incoming_unknown_contact() {
        let backend = OfflineBackend::new();
        assert!(matches!(
            backend.deliver_incoming(5, "hello").await,
            Err(ChatError::NotFound(5))
        ));
    }
}
