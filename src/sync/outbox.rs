// Outgoing traffic: optimistic sends with reconciliation, and contact creation

use log::{debug, info, warn};

use super::{InternalEvent, PendingSend, SyncEngine};
use crate::backend::{NewContact, OutgoingMessage, SendReceipt};
use crate::error::{ChatError, ChatResult};
use crate::models::{
    current_time_label, ContactId, Message, MessageId, MessageKind, Notice, VIDEO_PLACEHOLDER_TEXT,
};

impl SyncEngine {
    /// Append `text` to the conversation right away and send it in the background.
    ///
    /// Only one send may be outstanding at a time. The returned id is the
    /// provisional one; it is swapped for the server id once the send is confirmed.
    pub fn send_message(
        &mut self,
        contact_id: ContactId,
        text: &str,
        kind: MessageKind,
    ) -> ChatResult<MessageId> {
        let text = text.trim();
        if text.is_empty() {
            debug!("Ignoring empty message for {}", contact_id);
            return Err(ChatError::validation("message text is empty"));
        }
        if let Some(pending) = &self.send_in_flight {
            debug!("Send to {} already in flight, ignoring new send", pending.contact_id);
            return Err(ChatError::validation("another message is still being sent"));
        }
        self.require_contact(contact_id)?;

        let message = Message::outgoing(text, kind, &current_time_label());
        let provisional = message.id.clone();
        self.store.append(contact_id, message)?;
        self.send_in_flight = Some(PendingSend {
            contact_id,
            provisional: provisional.clone(),
        });
        debug!("Sending {} {} to {}", kind.as_str(), provisional, contact_id);

        let backend = self.backend.clone();
        let user_id = self.config.user_id;
        let outgoing = OutgoingMessage {
            receiver_id: contact_id,
            text: text.to_string(),
            kind,
        };
        let event_provisional = provisional.clone();
        self.spawn_detached(async move {
            let result = backend.send_message(user_id, &outgoing).await;
            InternalEvent::SendFinished {
                contact_id,
                provisional: event_provisional,
                text: outgoing.text,
                kind,
                result,
            }
        });
        Ok(provisional)
    }

    pub fn send_video_attachment(&mut self, contact_id: ContactId) -> ChatResult<MessageId> {
        self.send_message(contact_id, VIDEO_PLACEHOLDER_TEXT, MessageKind::Video)
    }

    pub(super) fn on_send_finished(
        &mut self,
        contact_id: ContactId,
        provisional: MessageId,
        text: &str,
        kind: MessageKind,
        result: ChatResult<SendReceipt>,
    ) {
        match self.send_in_flight.take() {
            Some(pending) if pending.provisional == provisional => {}
            other => {
                warn!("Send result for {} does not match outstanding send {:?}", provisional, other);
                self.send_in_flight = other;
            }
        }

        match result {
            Ok(receipt) => {
                let reconciled = self.store.log_mut().replace_local_id(
                    contact_id,
                    &provisional,
                    MessageId::Server(receipt.message_id),
                    &receipt.time,
                );
                if let Err(e) = reconciled {
                    warn!("Could not reconcile {} for {}: {}", provisional, contact_id, e);
                    self.notify(Notice::error("Could not confirm message", &e));
                    return;
                }
                if let Err(e) = self.store.directory_mut().touch(contact_id, text, &receipt.time) {
                    warn!("Could not update preview for {}: {}", contact_id, e);
                }
                info!("Message {} to {} confirmed", receipt.message_id, contact_id);
                self.notify(Notice::success(match kind {
                    MessageKind::Text => "Sent!",
                    MessageKind::Video => "Video sent!",
                }));
            }
            Err(e) => {
                warn!("Send of {} to {} failed: {}", provisional, contact_id, e);
                if let Err(mark) = self.store.log_mut().mark_failed(contact_id, &provisional) {
                    warn!("Could not flag {} as failed: {}", provisional, mark);
                }
                self.notify(Notice::error("Could not send message", &e));
            }
        }
    }

    /// Create a contact on the backend, then reload the whole directory.
    pub fn add_contact(
        &mut self,
        name: &str,
        avatar: Option<String>,
        phone: Option<String>,
    ) -> ChatResult<()> {
        let name = name.trim();
        if name.is_empty() {
            debug!("Ignoring add-contact without a name");
            return Err(ChatError::validation("contact name is empty"));
        }
        if self.adding_contact {
            debug!("Add-contact already in flight");
            return Err(ChatError::validation("a contact is already being added"));
        }
        self.adding_contact = true;

        let contact = NewContact {
            name: name.to_string(),
            avatar: avatar.filter(|a| !a.trim().is_empty()),
            phone: phone.filter(|p| !p.trim().is_empty()),
        };
        let backend = self.backend.clone();
        let user_id = self.config.user_id;
        self.spawn_detached(async move {
            let result = backend.add_contact(user_id, &contact).await;
            InternalEvent::ContactAdded {
                name: contact.name,
                result,
            }
        });
        Ok(())
    }

    pub(super) fn on_contact_added(&mut self, name: &str, result: ChatResult<Option<ContactId>>) {
        self.adding_contact = false;
        match result {
            Ok(id) => {
                info!("Added contact {} ({:?})", name, id);
                self.notify(Notice::success(format!("Added {}", name)));
                self.load_contacts();
            }
            Err(e) => {
                warn!("Failed to add contact {}: {}", name, e);
                self.notify(Notice::error("Could not add contact", &e));
            }
        }
    }
}
