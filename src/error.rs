use thiserror::Error;

use crate::models::{ContactId, MessageId};

/// Errors that can occur in the chat engine
#[derive(Debug, Error)]
pub enum ChatError {
    /// A backend call failed in transport or returned a non-success answer
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    /// An intent was rejected before any backend call was issued
    #[error("Validation failure: {0}")]
    ValidationFailure(String),

    /// A confirmed send could not find its provisional message
    #[error("No single message {provisional} in the log of contact {contact_id}")]
    ReconciliationMismatch {
        contact_id: ContactId,
        provisional: MessageId,
    },

    /// An operation referenced a contact the directory does not know
    #[error("Contact {0} not found")]
    NotFound(ContactId),

    /// A message was appended to the log of an unknown contact
    #[error("Cannot append to the log of unknown contact {0}")]
    InvalidContact(ContactId),
}

impl ChatError {
    pub fn validation(reason: impl Into<String>) -> Self {
        ChatError::ValidationFailure(reason.into())
    }

    pub fn network(reason: impl std::fmt::Display) -> Self {
        ChatError::NetworkFailure(reason.to_string())
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::NetworkFailure(err.to_string())
    }
}

pub type ChatResult<T> = std::result::Result<T, ChatError>;
