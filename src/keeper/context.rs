//! Execution context of the block a message is applied in

use crate::events::CrosschainEvent;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct BlockContext {
    pub height: u64,
    /// Block time; identical on every replica
    pub time: DateTime<Utc>,
    events: Vec<CrosschainEvent>,
}

impl BlockContext {
    pub fn new(height: u64, time: DateTime<Utc>) -> Self {
        Self {
            height,
            time,
            events: Vec::new(),
        }
    }

    /// Block time in unix seconds
    pub fn timestamp(&self) -> i64 {
        self.time.timestamp()
    }

    pub fn emit(&mut self, event: CrosschainEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[CrosschainEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<CrosschainEvent> {
        self.events
    }
}
