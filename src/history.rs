//! Bounded navigation history
//!
//! Keeps the most recent finalized navigation events, newest first. When the
//! window is full the oldest event is evicted before the new one is inserted.

use crate::event::NavigationEvent;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default history window in events
pub const DEFAULT_HISTORY_CAPACITY: usize = 6;

/// Fixed-capacity history store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "StoredHistory")]
pub struct HistoryStore {
    /// Events, newest at the front
    events: VecDeque<NavigationEvent>,
    /// Maximum number of events retained
    capacity: usize,
}

/// Unchecked serialized form of [`HistoryStore`]
#[derive(Deserialize)]
struct StoredHistory {
    events: VecDeque<NavigationEvent>,
    capacity: usize,
}

impl TryFrom<StoredHistory> for HistoryStore {
    type Error = String;

    fn try_from(stored: StoredHistory) -> Result<Self, Self::Error> {
        if stored.events.len() > stored.capacity {
            return Err(format!(
                "history holds {} events but its capacity is {}",
                stored.events.len(),
                stored.capacity
            ));
        }
        Ok(Self {
            events: stored.events,
            capacity: stored.capacity,
        })
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HistoryStore {
    /// Create an empty store holding at most `capacity` events
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert an event at the head, evicting the oldest one when full
    pub fn push(&mut self, event: NavigationEvent) {
        if self.capacity == 0 {
            return;
        }
        while self.events.len() >= self.capacity {
            self.events.pop_back();
        }
        self.events.push_front(event);
    }

    /// Remove every event
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Iterate over the current contents, newest first
    pub fn items(&self) -> impl Iterator<Item = &NavigationEvent> + Clone + '_ {
        self.events.iter()
    }

    /// Owned copy of the current contents, newest first
    pub fn snapshot(&self) -> Vec<NavigationEvent> {
        self.events.iter().cloned().collect()
    }

    /// Serialize the window as comma-joined `<retention>:<screen_id>` tokens
    pub fn serialize(&self) -> String {
        self.items()
            .map(NavigationEvent::to_history_token)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.events.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
