//! Remote collaborator contract
//!
//! The engine needs exactly four calls from a backend: list contacts, list
//! the messages exchanged with one contact, send a message and add a contact.
//! Any implementation of [`ChatBackend`] is interchangeable; the crate ships an
//! HTTP one and an in-memory one for the offline variant.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChatResult;
use crate::models::{Contact, ContactId, DeliveryStatus, Direction, Message, MessageId, MessageKind};

pub mod http;
pub mod offline;

pub use http::HttpBackend;
pub use offline::OfflineBackend;

/// Avatar used when an add-contact request does not carry one.
pub const DEFAULT_AVATAR: &str = "👤";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub receiver_id: ContactId,
    pub text: String,
    pub kind: MessageKind,
}

/// Server confirmation of a sent message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_id: i64,
    pub time: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContact {
    pub name: String,
    pub avatar: Option<String>,
    pub phone: Option<String>,
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn fetch_contacts(&self, user_id: ContactId) -> ChatResult<Vec<Contact>>;

    async fn fetch_messages(&self, user_id: ContactId, contact_id: ContactId) -> ChatResult<Vec<Message>>;

    async fn send_message(&self, user_id: ContactId, message: &OutgoingMessage) -> ChatResult<SendReceipt>;

    /// Returns the new contact's id when the backend reports one.
    async fn add_contact(&self, user_id: ContactId, contact: &NewContact) -> ChatResult<Option<ContactId>>;
}

// Wire records. Field names follow the JSON the backend speaks.

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRecord {
    pub id: ContactId,
    pub name: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub last_message: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub unread: u32,
}

impl From<ContactRecord> for Contact {
    fn from(record: ContactRecord) -> Self {
        Contact {
            id: record.id,
            name: record.name,
            avatar: record.avatar,
            last_message_preview: record.last_message,
            last_activity_time: record.time,
            unread_count: record.unread,
            online: record.online,
        }
    }
}

impl From<&Contact> for ContactRecord {
    fn from(contact: &Contact) -> Self {
        ContactRecord {
            id: contact.id,
            name: contact.name.clone(),
            avatar: contact.avatar.clone(),
            online: contact.online,
            last_message: contact.last_message_preview.clone(),
            time: contact.last_activity_time.clone(),
            unread: contact.unread_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: i64,
    pub is_mine: bool,
    pub text: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: MessageKind,
    #[serde(default)]
    pub time: String,
}

fn default_kind() -> MessageKind {
    MessageKind::Text
}

impl From<MessageRecord> for Message {
    fn from(record: MessageRecord) -> Self {
        Message {
            id: MessageId::Server(record.id),
            text: record.text,
            time: record.time,
            direction: if record.is_mine { Direction::Mine } else { Direction::Theirs },
            kind: record.kind,
            status: DeliveryStatus::Confirmed,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ContactsResponse {
    pub contacts: Vec<ContactRecord>,
}

#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    pub messages: Vec<MessageRecord>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PostRequest<'a> {
    #[serde(rename_all = "camelCase")]
    SendMessage {
        receiver_id: ContactId,
        text: &'a str,
        #[serde(rename = "type")]
        kind: MessageKind,
    },
    AddContact {
        name: &'a str,
        avatar: &'a str,
        phone: Option<&'a str>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub success: bool,
    pub message_id: Option<i64>,
    pub time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddContactResponse {
    pub success: bool,
    pub contact_id: Option<ContactId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_record_from_wire() {
        let json = r#"{"id":1,"name":"Anna","avatar":"A","online":true,
                       "lastMessage":"Hi! How are you?","time":"10:30","unread":2}"#;
        let record: ContactRecord = serde_json::from_str(json).unwrap();
        let contact = Contact::from(record);
        assert_eq!(contact.last_message_preview, "Hi! How are you?");
        assert_eq!(contact.last_activity_time, "10:30");
        assert_eq!(contact.unread_count, 2);
        assert!(contact.online);
    }

    #[test]
    fn test_message_record_from_wire() {
        let json = r#"{"id":2,"isMine":false,"text":"Look at this","type":"video","time":"Yesterday"}"#;
        let message = Message::from(serde_json::from_str::<MessageRecord>(json).unwrap());
        assert_eq!(message.id, MessageId::Server(2));
        assert_eq!(message.direction, Direction::Theirs);
        assert_eq!(message.kind, MessageKind::Video);
        assert_eq!(message.status, DeliveryStatus::Confirmed);
    }

    #[test]
    fn test_post_request_shapes() {
        let send = PostRequest::SendMessage {
            receiver_id: 4,
            text: "hi",
            kind: MessageKind::Text,
        };
        assert_eq!(
            serde_json::to_value(&send).unwrap(),
            serde_json::json!({"action": "send_message", "receiverId": 4, "text": "hi", "type": "text"})
        );

        let add = PostRequest::AddContact {
            name: "X",
            avatar: DEFAULT_AVATAR,
            phone: None,
        };
        assert_eq!(
            serde_json::to_value(&add).unwrap(),
            serde_json::json!({"action": "add_contact", "name": "X", "avatar": DEFAULT_AVATAR, "phone": null})
        );
    }
}
