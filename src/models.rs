use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Server-assigned contact identity.
pub type ContactId = i64;

/// Placeholder text carried by video attachment messages.
pub const VIDEO_PLACEHOLDER_TEXT: &str = "Sent a video";

/// Wall-clock time in the `HH:MM` form used for message and activity times.
pub fn current_time_label() -> String {
    chrono::Local::now().format("%H:%M").to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub name: String,
    pub avatar: String,
    pub last_message_preview: String,
    pub last_activity_time: String,
    pub unread_count: u32,
    pub online: bool,
}

impl Contact {
    pub fn new(id: ContactId, name: &str, avatar: &str) -> Self {
        Contact {
            id,
            name: name.to_string(),
            avatar: avatar.to_string(),
            last_message_preview: String::new(),
            last_activity_time: String::new(),
            unread_count: 0,
            online: false,
        }
    }
}

/// Partial contact update. `None` fields are left untouched on an existing
/// contact; inserting a new contact requires at least a name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactPatch {
    pub id: ContactId,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub last_message_preview: Option<String>,
    pub last_activity_time: Option<String>,
    pub unread_count: Option<u32>,
    pub online: Option<bool>,
}

impl ContactPatch {
    pub fn new(id: ContactId) -> Self {
        ContactPatch {
            id,
            ..Default::default()
        }
    }

    /// True when the patch carries enough to build a contact from scratch.
    pub fn is_complete(&self) -> bool {
        self.name.is_some()
    }
}

impl From<Contact> for ContactPatch {
    fn from(contact: Contact) -> Self {
        ContactPatch {
            id: contact.id,
            name: Some(contact.name),
            avatar: Some(contact.avatar),
            last_message_preview: Some(contact.last_message_preview),
            last_activity_time: Some(contact.last_activity_time),
            unread_count: Some(contact.unread_count),
            online: Some(contact.online),
        }
    }
}

/// Identity of a message within one contact's log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageId {
    /// Local id handed out before the server has confirmed the message
    Provisional(Uuid),
    /// Id assigned by the backend
    Server(i64),
}

impl MessageId {
    pub fn provisional() -> Self {
        MessageId::Provisional(Uuid::new_v4())
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, MessageId::Provisional(_))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Provisional(id) => write!(f, "local-{}", id),
            MessageId::Server(id) => write!(f, "{}", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Mine,
    Theirs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Video,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Video => "video",
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum DeliveryStatus {
    Pending,   // Appended optimistically, waiting for the backend
    Confirmed, // Backend assigned the final id and time
    Failed,    // Backend rejected or never answered; message stays in the log
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    pub time: String,
    pub direction: Direction,
    pub kind: MessageKind,
    pub status: DeliveryStatus,
}

impl Message {
    /// A message of ours that the backend has not confirmed yet.
    pub fn outgoing(text: &str, kind: MessageKind, time: &str) -> Self {
        Message {
            id: MessageId::provisional(),
            text: text.to_string(),
            time: time.to_string(),
            direction: Direction::Mine,
            kind,
            status: DeliveryStatus::Pending,
        }
    }

    pub fn is_mine(&self) -> bool {
        self.direction == Direction::Mine
    }

    /// Local messages that a refetch from the backend would not know about yet.
    pub fn is_unconfirmed(&self) -> bool {
        self.id.is_provisional() && self.status != DeliveryStatus::Confirmed
    }
}

/// Load state of one conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationState {
    #[default]
    Unopened,
    Loading,
    Loaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// Transient, fire-and-forget notification for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub detail: Option<String>,
}

impl Notice {
    pub fn info(title: impl Into<String>, detail: impl Into<String>) -> Self {
        Notice {
            level: NoticeLevel::Info,
            title: title.into(),
            detail: Some(detail.into()),
        }
    }

    pub fn success(title: impl Into<String>) -> Self {
        Notice {
            level: NoticeLevel::Success,
            title: title.into(),
            detail: None,
        }
    }

    pub fn error(title: impl Into<String>, detail: impl fmt::Display) -> Self {
        Notice {
            level: NoticeLevel::Error,
            title: title.into(),
            detail: Some(detail.to_string()),
        }
    }
}

/// Immutable view of engine state handed to the presentation layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatSnapshot {
    pub rev: u64,
    pub contacts: Vec<Contact>,
    pub active_contact: Option<ContactId>,
    pub conversation: Vec<Message>,
    pub conversation_state: ConversationState,
    pub loading: bool,
    pub sending: bool,
    pub adding_contact: bool,
    pub typing: bool,
    pub total_unread: u32,
}
