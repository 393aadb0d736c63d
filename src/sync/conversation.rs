// Conversation loading: open, poll, and applying fetched message lists

use log::{debug, info, warn};

use super::{FetchOrigin, InternalEvent, PendingFetch, SyncEngine};
use crate::error::ChatResult;
use crate::models::{ContactId, ConversationState, Message, Notice};

impl SyncEngine {
    /// Make `contact_id` the active conversation and load its messages.
    ///
    /// A never-loaded conversation goes `Unopened -> Loading`; its unread count is
    /// cleared only once the fetch succeeds. An already loaded one has its
    /// unread cleared right away and is refreshed in the background. Opening a
    /// conversation that is already being opened does not issue a second fetch.
    pub fn open_conversation(&mut self, contact_id: ContactId) -> ChatResult<()> {
        if let Err(e) = self.require_contact(contact_id) {
            self.notify(Notice::error("Unknown contact", &e));
            return Err(e);
        }

        if self.active != Some(contact_id) {
            self.close_conversation();
            self.active = Some(contact_id);
            self.schedule_for_active(contact_id);
            info!("Opened conversation with {}", contact_id);
        }

        let prior = match self.fetches.get(&contact_id) {
            Some(fetch) if fetch.origin == FetchOrigin::Open => {
                debug!("Open of {} already in flight, coalescing", contact_id);
                return Ok(());
            }
            // A poll is in flight; the open supersedes it
            Some(fetch) => fetch.prior,
            None => self.conversation_state(contact_id),
        };

        if prior == ConversationState::Loaded {
            self.store.directory_mut().set_unread(contact_id, 0)?;
        }
        self.issue_fetch(contact_id, FetchOrigin::Open, prior);
        Ok(())
    }

    /// Refresh the open conversation. Returns whether a fetch was issued.
    ///
    /// Skipped when nothing is open, or while an open or a send for that
    /// conversation is still in flight.
    pub fn poll_active_conversation(&mut self) -> bool {
        let Some(contact_id) = self.active else {
            return false;
        };
        if self.fetches.contains_key(&contact_id) {
            debug!("Skipping poll of {}: fetch in flight", contact_id);
            return false;
        }
        if matches!(&self.send_in_flight, Some(send) if send.contact_id == contact_id) {
            debug!("Skipping poll of {}: send in flight", contact_id);
            return false;
        }
        let prior = self.conversation_state(contact_id);
        self.issue_fetch(contact_id, FetchOrigin::Poll, prior);
        true
    }

    fn issue_fetch(&mut self, contact_id: ContactId, origin: FetchOrigin, prior: ConversationState) {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.conversations.insert(contact_id, ConversationState::Loading);

        let backend = self.backend.clone();
        let user_id = self.config.user_id;
        let task = self.spawn_remote("fetch messages", async move {
            let result = backend.fetch_messages(user_id, contact_id).await;
            InternalEvent::MessagesFetched {
                contact_id,
                ticket,
                result,
            }
        });

        debug!("Fetching messages for {} ({:?}, ticket {})", contact_id, origin, ticket);
        // Replacing an older fetch drops its handle, which aborts it
        self.fetches.insert(
            contact_id,
            PendingFetch {
                ticket,
                origin,
                prior,
                _task: task,
            },
        );
    }

    pub(super) fn on_messages_fetched(
        &mut self,
        contact_id: ContactId,
        ticket: u64,
        result: ChatResult<Vec<Message>>,
    ) {
        let current = self.fetches.get(&contact_id).map(|fetch| fetch.ticket);
        if current != Some(ticket) {
            debug!(
                "Discarding stale message list for {} (ticket {}, current {:?})",
                contact_id, ticket, current
            );
            return;
        }
        let Some(fetch) = self.fetches.remove(&contact_id) else {
            return;
        };

        match result {
            Ok(messages) => {
                let count = self.store.log_mut().replace(contact_id, messages);
                self.conversations.insert(contact_id, ConversationState::Loaded);
                debug!("Conversation with {} now holds {} messages", contact_id, count);

                if let Err(e) = self.store.refresh_preview(contact_id) {
                    warn!("Could not refresh preview for {}: {}", contact_id, e);
                }
                if self.active == Some(contact_id) {
                    if let Err(e) = self.store.directory_mut().set_unread(contact_id, 0) {
                        warn!("Could not clear unread for {}: {}", contact_id, e);
                    }
                } else {
                    info!("Loaded {} after navigating away; leaving its unread count", contact_id);
                }
            }
            Err(e) => {
                warn!("Failed to fetch messages for {}: {}", contact_id, e);
                self.conversations.insert(contact_id, fetch.prior);
                let title = match fetch.origin {
                    FetchOrigin::Open => "Could not load messages",
                    FetchOrigin::Poll => "Could not refresh messages",
                };
                self.notify(Notice::error(title, &e));
            }
        }
    }
}
