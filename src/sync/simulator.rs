// Peer simulator for the offline variant
// While a conversation is open, periodically pretends the other party is
// typing and then replies with a canned phrase. Replies go through the
// offline backend first so a later fetch returns them too.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;

use super::{InternalEvent, ScheduledTask, SyncEngine};
use crate::backend::OfflineBackend;
use crate::error::ChatResult;
use crate::models::{ContactId, Message, Notice};

pub const DEFAULT_PHRASES: &[&str] = &[
    "Sounds good!",
    "Can't talk right now, call you later",
    "Haha 😄",
    "Did you see the news?",
    "Sure, let's do it",
    "Thanks!",
    "On my way",
    "What time works for you?",
];

#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorConfig {
    /// How often the simulator considers replying
    pub interval: Duration,
    /// Chance of a reply on each tick, clamped to 0..=1
    pub probability: f64,
    /// How long the typing indicator shows before the reply lands
    pub typing_delay: Duration,
    pub phrases: Vec<String>,
    /// Fixed seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            interval: Duration::from_secs(7),
            probability: 0.4,
            typing_delay: Duration::from_millis(1500),
            phrases: DEFAULT_PHRASES.iter().map(|p| p.to_string()).collect(),
            seed: None,
        }
    }
}

pub struct PeerSimulator {
    config: SimulatorConfig,
    rng: StdRng,
    sink: Arc<OfflineBackend>,
    ticker: Option<ScheduledTask>,
    reply: Option<ScheduledTask>,
}

impl PeerSimulator {
    pub fn new(config: SimulatorConfig, sink: Arc<OfflineBackend>) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        PeerSimulator {
            config,
            rng,
            sink,
            ticker: None,
            reply: None,
        }
    }

    /// Start ticking for `contact_id`, replacing any earlier ticker.
    pub fn start(&mut self, contact_id: ContactId, tx: mpsc::Sender<InternalEvent>) {
        self.ticker = None;
        if self.config.interval.is_zero() {
            debug!("Peer simulator disabled (zero interval)");
            return;
        }
        self.ticker = Some(ScheduledTask::every(
            "peer tick",
            self.config.interval,
            tx,
            move || InternalEvent::PeerTick { contact_id },
        ));
    }

    /// Stop ticking. A reply that is already being typed still lands.
    pub fn stop(&mut self) {
        self.ticker = None;
    }

    /// Drop the reply being typed, if any.
    pub fn cancel_reply(&mut self) {
        self.reply = None;
    }

    /// Decide whether to reply on this tick, and with what.
    pub fn roll(&mut self) -> Option<String> {
        let probability = self.config.probability.clamp(0.0, 1.0);
        if !self.rng.gen_bool(probability) {
            return None;
        }
        self.config.phrases.choose(&mut self.rng).cloned()
    }

    pub fn schedule_reply(&mut self, contact_id: ContactId, phrase: String, tx: mpsc::Sender<InternalEvent>) {
        let sink = self.sink.clone();
        self.reply = Some(ScheduledTask::after(
            "peer reply",
            self.config.typing_delay,
            tx,
            async move {
                let result = sink.deliver_incoming(contact_id, &phrase).await;
                InternalEvent::PeerMessage { contact_id, result }
            },
        ));
    }

    /// A reply is scheduled and has not landed yet.
    pub fn is_typing(&self) -> bool {
        self.reply.as_ref().map_or(false, |task| !task.is_finished())
    }

    fn reply_delivered(&mut self) {
        self.reply = None;
    }
}

impl SyncEngine {
    /// One simulator tick. Returns whether a reply was scheduled.
    pub fn simulate_peer_tick(&mut self) -> bool {
        let Some(contact_id) = self.active else {
            return false;
        };
        if self.typing.is_some() {
            return false;
        }
        let sending_here = self
            .send_in_flight
            .as_ref()
            .map_or(false, |send| send.contact_id == contact_id);
        if self.fetches.contains_key(&contact_id) || sending_here {
            debug!("Contact {} busy, skipping peer tick", contact_id);
            return false;
        }
        let events_tx = self.events_tx.clone();
        let Some(simulator) = self.simulator.as_mut() else {
            return false;
        };
        let Some(phrase) = simulator.roll() else {
            return false;
        };
        debug!("Contact {} starts typing {:?}", contact_id, phrase);
        simulator.schedule_reply(contact_id, phrase, events_tx);
        self.typing = Some(contact_id);
        true
    }

    pub(super) fn on_peer_message(&mut self, contact_id: ContactId, result: ChatResult<Message>) {
        if self.typing == Some(contact_id) {
            self.typing = None;
        }
        if let Some(simulator) = self.simulator.as_mut() {
            simulator.reply_delivered();
        }

        let message = match result {
            Ok(message) => message,
            Err(e) => {
                warn!("Simulated reply from {} was not delivered: {}", contact_id, e);
                return;
            }
        };
        let (text, time) = (message.text.clone(), message.time.clone());
        if let Err(e) = self.store.append(contact_id, message) {
            warn!("Could not append simulated reply from {}: {}", contact_id, e);
            return;
        }
        if let Err(e) = self.store.directory_mut().touch(contact_id, &text, &time) {
            warn!("Could not update preview for {}: {}", contact_id, e);
        }
        if self.active != Some(contact_id) {
            if let Err(e) = self.store.directory_mut().increment_unread(contact_id) {
                warn!("Could not count unread reply from {}: {}", contact_id, e);
            }
        }

        let name = self
            .store
            .directory()
            .get(contact_id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| contact_id.to_string());
        info!("Simulated reply from {}", name);
        self.notify(Notice::info(format!("New message from {}", name), text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simulator(probability: f64, seed: u64) -> PeerSimulator {
        let config = SimulatorConfig {
            probability,
            seed: Some(seed),
            ..SimulatorConfig::default()
        };
        PeerSimulator::new(config, Arc::new(OfflineBackend::new()))
    }

    #[test]
    fn test_roll_extremes() {
        let mut always = simulator(1.0, 3);
        let mut never = simulator(0.0, 3);
        for _ in 0..20 {
            let phrase = always.roll().unwrap();
            assert!(DEFAULT_PHRASES.contains(&phrase.as_str()));
            assert_eq!(never.roll(), None);
        }
    }

    #[test]
    fn test_roll_is_deterministic_with_seed() {
        let mut a = simulator(0.5, 42);
        let mut b = simulator(0.5, 42);
        let rolls_a: Vec<_> = (0..30).map(|_| a.roll()).collect();
        let rolls_b: Vec<_> = (0..30).map(|_| b.roll()).collect();
        assert_eq!(rolls_a, rolls_b);
    }

    #[test]
    fn test_out_of_range_probability_is_clamped() {
        let mut sim = simulator(7.5, 1);
        assert!(sim.roll().is_some());
        let mut sim = simulator(-1.0, 1);
        assert!(sim.roll().is_none());
    }

    #[test]
    fn test_empty_phrase_set_never_replies() {
        let config = SimulatorConfig {
            probability: 1.0,
            phrases: Vec::new(),
            seed: Some(9),
            ..SimulatorConfig::default()
        };
        let mut sim = PeerSimulator::new(config, Arc::new(OfflineBackend::new()));
        assert_eq!(sim.roll(), None);
    }
}
