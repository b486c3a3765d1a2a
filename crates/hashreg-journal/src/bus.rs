use std::sync::{PoisonError, RwLock};

use tokio::sync::broadcast;

use hashreg_core::{EventKind, RegistryEvent};
use hashreg_types::Fingerprint;

/// Filter for subscribing to a subset of registry events.
#[derive(Clone, Debug, Default)]
pub struct EventFilter {
    /// If set, only events of these kinds are delivered.
    pub kinds: Option<Vec<EventKind>>,
    /// If set, only events about these fingerprints are delivered.
    pub fingerprints: Option<Vec<Fingerprint>>,
}

impl EventFilter {
    pub fn kinds(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        Self {
            kinds: Some(kinds.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn matches(&self, event: &RegistryEvent) -> bool {
        if let Some(ref kinds) = self.kinds {
            if !kinds.contains(&event.kind()) {
                return false;
            }
        }
        if let Some(ref fingerprints) = self.fingerprints {
            match event.body.fingerprint() {
                Some(fp) if fingerprints.contains(fp) => {}
                _ => return false,
            }
        }
        true
    }
}

/// Receiver half handed to monitors.
pub type EventStream = broadcast::Receiver<RegistryEvent>;

struct Subscriber {
    filter: EventFilter,
    sender: broadcast::Sender<RegistryEvent>,
}

/// Fan-out of committed events to monitors.
///
/// Each subscriber gets its own bounded channel; a slow monitor lags on its
/// own channel without holding back the registry.
pub struct EventBus {
    subscribers: RwLock<Vec<Subscriber>>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self, filter: EventFilter) -> EventStream {
        let (sender, receiver) = broadcast::channel(self.capacity);
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber { filter, sender });
        receiver
    }

    /// Deliver events, in order, to every matching subscriber. Subscribers
    /// whose receivers are gone are pruned.
    pub fn publish(&self, events: &[RegistryEvent]) {
        let mut subs = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        subs.retain(|sub| {
            for event in events {
                if sub.filter.matches(event) && sub.sender.send(event.clone()).is_err() {
                    return false;
                }
            }
            sub.sender.receiver_count() > 0
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
