// Common test utilities for integration tests
// A scripted in-memory backend with failure injection, plus helpers to pump
// the engine's internal events from a test.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, LevelFilter};
use tokio::sync::{mpsc, Semaphore};
use tokio::time::{timeout, Instant};

use murmur::backend::{ChatBackend, NewContact, OutgoingMessage, SendReceipt, DEFAULT_AVATAR};
use murmur::{
    ChatError, ChatResult, Contact, ContactId, DeliveryStatus, Direction, EngineConfig, Message,
    MessageId, MessageKind, Notice, SyncEngine,
};

// Initialize logging once
static INIT_LOGGER: Once = Once::new();

/// Set up the logger for the tests
pub fn setup_logging() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::Builder::new()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .try_init();
    });
}

pub const USER_ID: ContactId = 1;

#[derive(Default)]
struct Script {
    contacts: Vec<Contact>,
    messages: HashMap<ContactId, Vec<Message>>,
    next_message_id: i64,
    send_time: String,
    next_contact_id: ContactId,
}

/// Backend whose answers are set up by the test.
pub struct ScriptedBackend {
    script: Mutex<Script>,
    fail_contacts: AtomicBool,
    fail_messages: AtomicBool,
    fail_send: AtomicBool,
    fail_add: AtomicBool,
    /// While set, message fetches wait for a permit from `gate`
    gated: AtomicBool,
    gate: Semaphore,
    /// While set, send responses wait for a permit from `send_gate` after
    /// the message is stored
    sends_gated: AtomicBool,
    send_gate: Semaphore,
    pub contact_calls: AtomicUsize,
    pub message_calls: AtomicUsize,
    pub send_calls: AtomicUsize,
    pub add_calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        ScriptedBackend {
            script: Mutex::new(Script {
                next_message_id: 100,
                send_time: "12:00".to_string(),
                next_contact_id: 100,
                ..Script::default()
            }),
            fail_contacts: AtomicBool::new(false),
            fail_messages: AtomicBool::new(false),
            fail_send: AtomicBool::new(false),
            fail_add: AtomicBool::new(false),
            gated: AtomicBool::new(false),
            gate: Semaphore::new(0),
            sends_gated: AtomicBool::new(false),
            send_gate: Semaphore::new(0),
            contact_calls: AtomicUsize::new(0),
            message_calls: AtomicUsize::new(0),
            send_calls: AtomicUsize::new(0),
            add_calls: AtomicUsize::new(0),
        }
    }

    /// Anna (id 1, 2 unread, 3 messages) and Max (id 2, 1 unread, 1 message).
    pub fn with_two_contacts() -> Self {
        let backend = Self::new();
        backend.add_contact_record(contact(1, "Anna Ivanova", 2, "Are we still on?", "10:30"));
        backend.push_message(1, incoming(1, "Hi! How are you?", "10:25"));
        backend.push_message(1, outgoing(2, "Great! And you?", "10:27"));
        backend.push_message(1, incoming(3, "Are we still on?", "10:30"));

        backend.add_contact_record(contact(2, "Max Petrov", 1, "Look at this", "Yesterday"));
        backend.push_message(2, incoming(4, "Look at this", "Yesterday"));
        backend
    }

    pub fn add_contact_record(&self, contact: Contact) {
        let mut script = self.script.lock().unwrap();
        script.contacts.retain(|c| c.id != contact.id);
        script.contacts.push(contact);
    }

    pub fn set_unread(&self, contact_id: ContactId, unread: u32) {
        let mut script = self.script.lock().unwrap();
        if let Some(contact) = script.contacts.iter_mut().find(|c| c.id == contact_id) {
            contact.unread_count = unread;
        }
    }

    pub fn push_message(&self, contact_id: ContactId, message: Message) {
        let mut script = self.script.lock().unwrap();
        script.messages.entry(contact_id).or_default().push(message);
    }

    /// Id and time the next successful send is confirmed with.
    pub fn confirm_next_send(&self, message_id: i64, time: &str) {
        let mut script = self.script.lock().unwrap();
        script.next_message_id = message_id;
        script.send_time = time.to_string();
    }

    pub fn fail_contacts(&self, fail: bool) {
        self.fail_contacts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_messages(&self, fail: bool) {
        self.fail_messages.store(fail, Ordering::SeqCst);
    }

    pub fn fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    pub fn fail_add(&self, fail: bool) {
        self.fail_add.store(fail, Ordering::SeqCst);
    }

    /// Hold message fetches until `release_messages` is called.
    pub fn hold_messages(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }

    /// Let `count` held fetches through and stop holding new ones.
    pub fn release_messages(&self, count: usize) {
        self.gated.store(false, Ordering::SeqCst);
        self.gate.add_permits(count);
    }

    /// Store sent messages right away but hold the response.
    pub fn hold_sends(&self) {
        self.sends_gated.store(true, Ordering::SeqCst);
    }

    pub fn release_sends(&self, count: usize) {
        self.sends_gated.store(false, Ordering::SeqCst);
        self.send_gate.add_permits(count);
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn fetch_contacts(&self, _user_id: ContactId) -> ChatResult<Vec<Contact>> {
        self.contact_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_contacts.load(Ordering::SeqCst) {
            return Err(ChatError::network("contacts unavailable"));
        }
        Ok(self.script.lock().unwrap().contacts.clone())
    }

    async fn fetch_messages(&self, _user_id: ContactId, contact_id: ContactId) -> ChatResult<Vec<Message>> {
        self.message_calls.fetch_add(1, Ordering::SeqCst);
        if self.gated.load(Ordering::SeqCst) {
            debug!("Holding message fetch for {}", contact_id);
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
        }
        if self.fail_messages.load(Ordering::SeqCst) {
            return Err(ChatError::network("messages unavailable"));
        }
        let script = self.script.lock().unwrap();
        Ok(script.messages.get(&contact_id).cloned().unwrap_or_default())
    }

    async fn send_message(&self, _user_id: ContactId, message: &OutgoingMessage) -> ChatResult<SendReceipt> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(ChatError::network("send rejected"));
        }
        let receipt = {
            let mut script = self.script.lock().unwrap();
            let receipt = SendReceipt {
                message_id: script.next_message_id,
                time: script.send_time.clone(),
            };
            script.next_message_id += 1;
            let mut stored = Message::outgoing(&message.text, message.kind, &receipt.time);
            stored.id = MessageId::Server(receipt.message_id);
            stored.status = DeliveryStatus::Confirmed;
            script.messages.entry(message.receiver_id).or_default().push(stored);
            receipt
        };
        if self.sends_gated.load(Ordering::SeqCst) {
            debug!("Holding send response for {}", message.receiver_id);
            if let Ok(permit) = self.send_gate.acquire().await {
                permit.forget();
            }
        }
        Ok(receipt)
    }

    async fn add_contact(&self, _user_id: ContactId, new_contact: &NewContact) -> ChatResult<Option<ContactId>> {
        self.add_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_add.load(Ordering::SeqCst) {
            return Err(ChatError::network("add rejected"));
        }
        let mut script = self.script.lock().unwrap();
        script.next_contact_id += 1;
        let id = script.next_contact_id;
        let avatar = new_contact.avatar.as_deref().unwrap_or(DEFAULT_AVATAR);
        script.contacts.push(Contact::new(id, &new_contact.name, avatar));
        Ok(Some(id))
    }
}

pub fn contact(id: ContactId, name: &str, unread: u32, preview: &str, time: &str) -> Contact {
    Contact {
        unread_count: unread,
        last_message_preview: preview.to_string(),
        last_activity_time: time.to_string(),
        online: true,
        ..Contact::new(id, name, "🙂")
    }
}

pub fn incoming(id: i64, text: &str, time: &str) -> Message {
    Message {
        id: MessageId::Server(id),
        text: text.to_string(),
        time: time.to_string(),
        direction: Direction::Theirs,
        kind: MessageKind::Text,
        status: DeliveryStatus::Confirmed,
    }
}

pub fn outgoing(id: i64, text: &str, time: &str) -> Message {
    Message {
        direction: Direction::Mine,
        ..incoming(id, text, time)
    }
}

/// Engine without polling or simulator, so only the test drives it.
pub fn quiet_engine(backend: Arc<ScriptedBackend>) -> (SyncEngine, mpsc::Receiver<Notice>) {
    setup_logging();
    let config = EngineConfig {
        user_id: USER_ID,
        poll_interval: None,
        simulator: None,
    };
    SyncEngine::new(config, backend)
}

/// Quiet engine with its contact list already loaded.
pub async fn loaded_engine(backend: Arc<ScriptedBackend>) -> (SyncEngine, mpsc::Receiver<Notice>) {
    let (mut engine, notices) = quiet_engine(backend);
    engine.load_contacts();
    drain_events(&mut engine).await;
    (engine, notices)
}

const IDLE: Duration = Duration::from_millis(100);
const PUMP_LIMIT: Duration = Duration::from_secs(3);

/// Handle internal events until none arrives for a short while.
pub async fn drain_events(engine: &mut SyncEngine) -> usize {
    let deadline = Instant::now() + PUMP_LIMIT;
    let mut handled = 0;
    while Instant::now() < deadline {
        match timeout(IDLE, engine.process_next_event()).await {
            Ok(true) => handled += 1,
            _ => break,
        }
    }
    handled
}

/// Handle internal events until `done` holds. Returns false on timeout.
pub async fn pump_until<F>(engine: &mut SyncEngine, mut done: F) -> bool
where
    F: FnMut(&SyncEngine) -> bool,
{
    let deadline = Instant::now() + PUMP_LIMIT;
    while !done(engine) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return false;
        }
        match timeout(remaining, engine.process_next_event()).await {
            Ok(true) => {}
            _ => return done(engine),
        }
    }
    true
}

/// Everything currently queued on the notice channel.
pub fn drain_notices(notices: &mut mpsc::Receiver<Notice>) -> Vec<Notice> {
    let mut out = Vec::new();
    while let Ok(notice) = notices.try_recv() {
        out.push(notice);
    }
    out
}

pub fn unread_of(engine: &SyncEngine, contact_id: ContactId) -> u32 {
    engine
        .store()
        .directory()
        .get(contact_id)
        .map(|c| c.unread_count)
        .unwrap_or_default()
}
