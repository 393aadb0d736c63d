// HTTP backend speaking the action/query protocol
// GET  ?action=contacts&userId=..               -> { contacts }
// GET  ?action=messages&userId=..&contactId=..  -> { messages }
// POST ?userId=.. { action: "send_message" | "add_contact", .. }

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info};
use serde::de::DeserializeOwned;

use super::{
    AddContactResponse, ChatBackend, ContactsResponse, MessagesResponse, NewContact,
    OutgoingMessage, PostRequest, SendReceipt, SendResponse, DEFAULT_AVATAR,
};
use crate::error::{ChatError, ChatResult};
use crate::models::{Contact, ContactId, Message};

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> ChatResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        info!("Using HTTP backend at {}", base_url);
        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, query: &[(&str, String)]) -> ChatResult<T> {
        debug!("GET {} {:?}", self.base_url, query);
        let response = self
            .client
            .get(&self.base_url)
            .query(query)
            .send()
            .await?;
        decode(response).await
    }

    async fn post<T: DeserializeOwned>(&self, user_id: ContactId, body: &PostRequest<'_>) -> ChatResult<T> {
        debug!("POST {} {:?}", self.base_url, body);
        let response = self
            .client
            .post(&self.base_url)
            .query(&[("userId", user_id.to_string())])
            .json(body)
            .send()
            .await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> ChatResult<T> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        error!("Backend answered {}: {}", status, text);
        return Err(ChatError::network(format!("backend answered {status}: {text}")));
    }
    response
        .json()
        .await
        .map_err(|e| ChatError::network(format!("could not decode backend response: {e}")))
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn fetch_contacts(&self, user_id: ContactId) -> ChatResult<Vec<Contact>> {
        let response: ContactsResponse = self
            .get(&[
                ("action", "contacts".to_string()),
                ("userId", user_id.to_string()),
            ])
            .await?;
        Ok(response.contacts.into_iter().map(Contact::from).collect())
    }

    async fn fetch_messages(&self, user_id: ContactId, contact_id: ContactId) -> ChatResult<Vec<Message>> {
        let response: MessagesResponse = self
            .get(&[
                ("action", "messages".to_string()),
                ("userId", user_id.to_string()),
                ("contactId", contact_id.to_string()),
            ])
            .await?;
        Ok(response.messages.into_iter().map(Message::from).collect())
    }

    async fn send_message(&self, user_id: ContactId, message: &OutgoingMessage) -> ChatResult<SendReceipt> {
        let request = PostRequest::SendMessage {
            receiver_id: message.receiver_id,
            text: &message.text,
            kind: message.kind,
        };
        let response: SendResponse = self.post(user_id, &request).await?;
        match response {
            SendResponse {
                success: true,
                message_id: Some(message_id),
                time: Some(time),
            } => Ok(SendReceipt { message_id, time }),
            SendResponse { success: true, .. } => Err(ChatError::network(
                "backend confirmed the send without a message id or time",
            )),
            SendResponse { success: false, .. } => {
                Err(ChatError::network("backend rejected the message"))
            }
        }
    }

    async fn add_contact(&self, user_id: ContactId, contact: &NewContact) -> ChatResult<Option<ContactId>> {
        let request = PostRequest::AddContact {
            name: &contact.name,
            avatar: contact.avatar.as_deref().unwrap_or(DEFAULT_AVATAR),
            phone: contact.phone.as_deref(),
        };
        let response: AddContactResponse = self.post(user_id, &request).await?;
        if !response.success {
            return Err(ChatError::network("backend rejected the new contact"));
        }
        Ok(response.contact_id)
    }
}
