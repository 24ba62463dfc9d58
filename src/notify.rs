//! In-process publish/subscribe with bounded history replay.
//!
//! Each topic keeps its own subscriber list and a ring of recent events.
//! A new subscriber first receives the latest `replay` events of the topic,
//! then live events as they are published. Delivery is best-effort and
//! at-most-once: a subscriber whose receiver was dropped is pruned on the
//! next publish.

use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Topic the renderer publishes on.
pub const MOSAIC_TOPIC: &str = "mosaic";

pub const DEFAULT_HISTORY_SIZE: usize = 10;
pub const DEFAULT_SEND_HISTORY: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub topic: String,
    pub payload: Value,
}

/// Payload announcing a freshly rendered mosaic at `url`.
pub fn mosaic_updated(url: &str) -> Value {
    json!({ "action": "mosaic_updated", "path": url })
}

/// Generic typed message payload.
pub fn message(kind: &str, data: Value) -> Value {
    json!({ "type": kind, "data": data })
}

#[derive(Default)]
struct Topic {
    subscribers: Vec<Sender<Event>>,
    history: VecDeque<Event>,
}

pub struct Notifier {
    topics: Mutex<HashMap<String, Topic>>,
    history_size: usize,
    replay: usize,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE, DEFAULT_SEND_HISTORY)
    }
}

impl Notifier {
    /// `replay` is capped at `history_size`.
    pub fn new(history_size: usize, replay: usize) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            history_size,
            replay: replay.min(history_size),
        }
    }

    fn topics(&self) -> MutexGuard<'_, HashMap<String, Topic>> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to `topic`, receiving recent history first.
    pub fn subscribe(&self, topic: &str) -> Receiver<Event> {
        let (tx, rx) = channel();
        let mut topics = self.topics();
        let state = topics.entry(topic.to_string()).or_default();

        let skip = state.history.len().saturating_sub(self.replay);
        for event in state.history.iter().skip(skip) {
            // The receiver is still in hand, so this cannot fail
            let _ = tx.send(event.clone());
        }
        state.subscribers.push(tx);
        debug!(
            topic,
            replayed = state.history.len() - skip,
            subscribers = state.subscribers.len(),
            "subscriber added"
        );
        rx
    }

    /// Deliver `payload` to every live subscriber of `topic` and record it.
    ///
    /// Returns the number of subscribers it was delivered to.
    pub fn publish(&self, topic: &str, payload: Value) -> usize {
        let event = Event {
            topic: topic.to_string(),
            payload,
        };
        let mut topics = self.topics();
        let state = topics.entry(topic.to_string()).or_default();

        state
            .subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());
        let delivered = state.subscribers.len();

        if self.history_size > 0 {
            if state.history.len() == self.history_size {
                state.history.pop_front();
            }
            state.history.push_back(event);
        }
        trace!(topic, delivered, "event published");
        delivered
    }

    /// Publish the `mosaic_updated` event for a render at `url`.
    pub fn publish_mosaic_updated(&self, url: &str) -> usize {
        self.publish(MOSAIC_TOPIC, mosaic_updated(url))
    }

    /// Recorded events of `topic`, oldest first.
    pub fn history(&self, topic: &str) -> Vec<Event> {
        self.topics()
            .get(topic)
            .map(|t| t.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics()
            .get(topic)
            .map(|t| t.subscribers.len())
            .unwrap_or(0)
    }
}
