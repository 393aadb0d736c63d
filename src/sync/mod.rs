//! Chat state synchronization engine
//!
//! The engine owns the local chat state and is its only writer. Intents from
//! the presentation layer and internal events (backend results, timer ticks)
//! are handled one at a time, each to completion, so no locking is needed.
//! Backend calls run on spawned tasks that post their results back as
//! internal events keyed by contact id.
//!
//! Presentation reads [`ChatSnapshot`]s from a watch channel and receives
//! [`Notice`]s on a bounded channel that the engine never blocks on.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};
use tokio::sync::{mpsc, watch};

use crate::backend::{ChatBackend, OfflineBackend, SendReceipt};
use crate::error::{ChatError, ChatResult};
use crate::models::{
    ChatSnapshot, Contact, ContactId, ConversationState, Message, MessageId, MessageKind, Notice,
};
use crate::store::ChatStore;

pub mod conversation;
pub mod outbox;
pub mod scheduler;
pub mod simulator;

pub use scheduler::ScheduledTask;
pub use simulator::{PeerSimulator, SimulatorConfig};

const EVENT_CHANNEL_CAPACITY: usize = 100;
const NOTICE_CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub user_id: ContactId,
    /// `None` disables polling of the open conversation
    pub poll_interval: Option<Duration>,
    /// Only used by [`SyncEngine::offline`]
    pub simulator: Option<SimulatorConfig>,
}

/// User intents forwarded by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    LoadContacts,
    OpenConversation(ContactId),
    CloseConversation,
    SendText { contact_id: ContactId, text: String },
    SendVideo { contact_id: ContactId },
    AddContact {
        name: String,
        avatar: Option<String>,
        phone: Option<String>,
    },
}

/// Results and ticks posted back to the engine by its background tasks.
#[derive(Debug)]
pub enum InternalEvent {
    ContactsFetched(ChatResult<Vec<Contact>>),
    MessagesFetched {
        contact_id: ContactId,
        ticket: u64,
        result: ChatResult<Vec<Message>>,
    },
    SendFinished {
        contact_id: ContactId,
        provisional: MessageId,
        text: String,
        kind: MessageKind,
        result: ChatResult<SendReceipt>,
    },
    ContactAdded {
        name: String,
        result: ChatResult<Option<ContactId>>,
    },
    PollTick { contact_id: ContactId },
    PeerTick { contact_id: ContactId },
    PeerMessage {
        contact_id: ContactId,
        result: ChatResult<Message>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FetchOrigin {
    Open,
    Poll,
}

#[derive(Debug)]
pub(crate) struct PendingFetch {
    pub(crate) ticket: u64,
    pub(crate) origin: FetchOrigin,
    /// State to return to if the fetch fails or is aborted
    pub(crate) prior: ConversationState,
    pub(crate) _task: ScheduledTask,
}

#[derive(Debug, Clone)]
pub(crate) struct PendingSend {
    pub(crate) contact_id: ContactId,
    pub(crate) provisional: MessageId,
}

pub struct SyncEngine {
    config: EngineConfig,
    backend: Arc<dyn ChatBackend>,
    store: ChatStore,
    conversations: HashMap<ContactId, ConversationState>,
    fetches: HashMap<ContactId, PendingFetch>,
    active: Option<ContactId>,
    send_in_flight: Option<PendingSend>,
    adding_contact: bool,
    contacts_loading: bool,
    typing: Option<ContactId>,
    next_ticket: u64,
    poller: Option<ScheduledTask>,
    simulator: Option<PeerSimulator>,
    events_tx: mpsc::Sender<InternalEvent>,
    events_rx: mpsc::Receiver<InternalEvent>,
    notice_tx: mpsc::Sender<Notice>,
    snapshot_tx: watch::Sender<ChatSnapshot>,
    rev: u64,
}

impl SyncEngine {
    pub fn new(config: EngineConfig, backend: Arc<dyn ChatBackend>) -> (Self, mpsc::Receiver<Notice>) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (notice_tx, notice_rx) = mpsc::channel(NOTICE_CHANNEL_CAPACITY);
        let (snapshot_tx, _) = watch::channel(ChatSnapshot::default());

        (Self {
            config,
            backend,
            store: ChatStore::new(),
            conversations: HashMap::new(),
            fetches: HashMap::new(),
            active: None,
            send_in_flight: None,
            adding_contact: false,
            contacts_loading: false,
            typing: None,
            next_ticket: 0,
            poller: None,
            simulator: None,
            events_tx,
            events_rx,
            notice_tx,
            snapshot_tx,
            rev: 0,
        }, notice_rx)
    }

    /// Offline variant: in-memory demo backend plus the peer simulator.
    pub fn offline(config: EngineConfig) -> (Self, mpsc::Receiver<Notice>) {
        let backend = Arc::new(OfflineBackend::with_demo_data());
        let simulator = config
            .simulator
            .clone()
            .map(|sim_config| PeerSimulator::new(sim_config, backend.clone()));
        let (engine, notice_rx) = Self::new(config, backend);
        (engine.with_simulator(simulator), notice_rx)
    }

    pub fn with_simulator(mut self, simulator: Option<PeerSimulator>) -> Self {
        self.simulator = simulator;
        self
    }

    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    pub fn active_contact(&self) -> Option<ContactId> {
        self.active
    }

    pub fn conversation_state(&self, contact_id: ContactId) -> ConversationState {
        self.conversations.get(&contact_id).copied().unwrap_or_default()
    }

    pub fn is_sending(&self) -> bool {
        self.send_in_flight.is_some()
    }

    pub fn is_adding_contact(&self) -> bool {
        self.adding_contact
    }

    pub fn is_typing(&self) -> bool {
        self.typing.is_some() && self.typing == self.active
    }

    pub fn total_unread(&self) -> u32 {
        self.store.directory().total_unread()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn subscribe_unread(&self) -> watch::Receiver<u32> {
        self.store.directory().unread().subscribe()
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        let conversation_state = self
            .active
            .map(|id| self.conversation_state(id))
            .unwrap_or_default();
        ChatSnapshot {
            rev: self.rev,
            contacts: self.store.directory().list().to_vec(),
            active_contact: self.active,
            conversation: self
                .active
                .map(|id| self.store.log().get(id).to_vec())
                .unwrap_or_default(),
            conversation_state,
            loading: self.contacts_loading || conversation_state == ConversationState::Loading,
            sending: self.is_sending(),
            adding_contact: self.adding_contact,
            typing: self.is_typing(),
            total_unread: self.total_unread(),
        }
    }

    /// Dispatch one intent. Rejected intents leave state untouched.
    pub fn apply(&mut self, intent: Intent) -> ChatResult<()> {
        debug!("Applying intent {:?}", intent);
        let result = match intent {
            Intent::LoadContacts => {
                self.load_contacts();
                Ok(())
            }
            Intent::OpenConversation(contact_id) => self.open_conversation(contact_id),
            Intent::CloseConversation => {
                self.close_conversation();
                Ok(())
            }
            Intent::SendText { contact_id, text } => self
                .send_message(contact_id, &text, MessageKind::Text)
                .map(|_| ()),
            Intent::SendVideo { contact_id } => {
                self.send_video_attachment(contact_id).map(|_| ())
            }
            Intent::AddContact { name, avatar, phone } => self.add_contact(&name, avatar, phone),
        };
        self.publish();
        result
    }

    /// Wait for the next internal event and handle it. Returns false once no
    /// more events can arrive.
    pub async fn process_next_event(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(event) => {
                self.handle_event(event);
                true
            }
            None => false,
        }
    }

    /// Drive the engine until the intent channel closes.
    pub async fn run(mut self, mut intents: mpsc::Receiver<Intent>) {
        info!("Sync engine running for user {}", self.config.user_id);
        self.publish();
        loop {
            tokio::select! {
                intent = intents.recv() => match intent {
                    Some(intent) => {
                        if let Err(e) = self.apply(intent) {
                            debug!("Intent rejected: {}", e);
                        }
                    }
                    None => break,
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event),
            }
        }
        self.close_conversation();
        if let Some(simulator) = self.simulator.as_mut() {
            simulator.cancel_reply();
        }
        info!("Intent channel closed, sync engine stopped");
    }

    pub fn handle_event(&mut self, event: InternalEvent) {
        match event {
            InternalEvent::ContactsFetched(result) => self.on_contacts_fetched(result),
            InternalEvent::MessagesFetched { contact_id, ticket, result } => {
                self.on_messages_fetched(contact_id, ticket, result)
            }
            InternalEvent::SendFinished { contact_id, provisional, text, kind, result } => {
                self.on_send_finished(contact_id, provisional, &text, kind, result)
            }
            InternalEvent::ContactAdded { name, result } => self.on_contact_added(&name, result),
            InternalEvent::PollTick { contact_id } => {
                if self.active == Some(contact_id) {
                    self.poll_active_conversation();
                }
            }
            InternalEvent::PeerTick { contact_id } => {
                if self.active == Some(contact_id) {
                    self.simulate_peer_tick();
                }
            }
            InternalEvent::PeerMessage { contact_id, result } => {
                self.on_peer_message(contact_id, result)
            }
        }
        self.publish();
    }

    /// Fetch the full contact list and merge it into the directory.
    pub fn load_contacts(&mut self) {
        if self.contacts_loading {
            debug!("Contact reload already in flight");
            return;
        }
        self.contacts_loading = true;
        let backend = self.backend.clone();
        let user_id = self.config.user_id;
        self.spawn_detached(async move {
            InternalEvent::ContactsFetched(backend.fetch_contacts(user_id).await)
        });
    }

    fn on_contacts_fetched(&mut self, result: ChatResult<Vec<Contact>>) {
        self.contacts_loading = false;
        match result {
            Ok(contacts) => {
                info!("Fetched {} contacts", contacts.len());
                self.store.directory_mut().reload(contacts);
            }
            Err(e) => {
                error!("Failed to load contacts: {}", e);
                self.notify(Notice::error("Could not load contacts", &e));
            }
        }
    }

    /// Leave the open conversation and stop everything scheduled for it.
    pub fn close_conversation(&mut self) {
        let Some(previous) = self.active.take() else {
            return;
        };
        debug!("Leaving conversation with {}", previous);
        self.poller = None;
        if let Some(simulator) = self.simulator.as_mut() {
            simulator.stop();
        }

        let polling = self
            .fetches
            .get(&previous)
            .map_or(false, |fetch| fetch.origin == FetchOrigin::Poll);
        if polling {
            if let Some(fetch) = self.fetches.remove(&previous) {
                debug!("Aborted poll of {} on navigation", previous);
                self.conversations.insert(previous, fetch.prior);
            }
        }
    }

    fn schedule_for_active(&mut self, contact_id: ContactId) {
        if let Some(period) = self.config.poll_interval {
            self.poller = Some(ScheduledTask::every(
                "poll",
                period,
                self.events_tx.clone(),
                move || InternalEvent::PollTick { contact_id },
            ));
        }
        let events_tx = self.events_tx.clone();
        if let Some(simulator) = self.simulator.as_mut() {
            simulator.start(contact_id, events_tx);
        }
    }

    /// Remote call whose result may be abandoned by dropping the handle.
    fn spawn_remote<F>(&self, name: &'static str, future: F) -> ScheduledTask
    where
        F: Future<Output = InternalEvent> + Send + 'static,
    {
        ScheduledTask::after(name, Duration::ZERO, self.events_tx.clone(), future)
    }

    /// Remote call that always runs to completion.
    fn spawn_detached<F>(&self, future: F)
    where
        F: Future<Output = InternalEvent> + Send + 'static,
    {
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            let event = future.await;
            if let Err(e) = events_tx.send(event).await {
                error!("Engine gone, dropping backend result: {:?}", e.0);
            }
        });
    }

    fn require_contact(&self, contact_id: ContactId) -> ChatResult<&Contact> {
        self.store
            .directory()
            .get(contact_id)
            .ok_or(ChatError::NotFound(contact_id))
    }

    fn notify(&self, notice: Notice) {
        debug!("Notice: {:?}", notice);
        if let Err(e) = self.notice_tx.try_send(notice) {
            debug!("Dropping notice: {}", e);
        }
    }

    fn publish(&mut self) {
        self.rev += 1;
        let snapshot = self.snapshot();
        self.snapshot_tx.send_replace(snapshot);
    }
}
