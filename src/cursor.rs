/*
 * Chatter - Discord Auto-Chat & Auto-Reply Companion
 * File Path: src/cursor.rs
 * Responsibility: In-memory seen-message cursor per channel (reset on restart)
 */

use std::collections::{HashMap, HashSet, VecDeque};

/// Handled ids remembered per channel before the oldest are forgotten.
pub const HANDLED_CAPACITY: usize = 256;

#[derive(Debug, Default, Clone)]
pub struct ChannelCursor {
    last: Option<String>,
    handled: HashSet<String>,
    order: VecDeque<String>,
}

impl ChannelCursor {
    pub fn last(&self) -> Option<&str> {
        self.last.as_deref()
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.last.as_deref() == Some(message_id) || self.handled.contains(message_id)
    }

    fn record(&mut self, message_id: &str) {
        self.last = Some(message_id.to_string());
        if self.handled.insert(message_id.to_string()) {
            self.order.push_back(message_id.to_string());
            while self.order.len() > HANDLED_CAPACITY {
                if let Some(evicted) = self.order.pop_front() {
                    self.handled.remove(&evicted);
                }
            }
        }
    }
}

/// Channel id -> cursor. Ids are compared by equality only.
#[derive(Debug, Default, Clone)]
pub struct CursorStore {
    channels: HashMap<u64, ChannelCursor>,
}

impl CursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, channel_id: u64) -> Option<&ChannelCursor> {
        self.channels.get(&channel_id)
    }

    pub fn last(&self, channel_id: u64) -> Option<&str> {
        self.get(channel_id).and_then(ChannelCursor::last)
    }

    pub fn is_handled(&self, channel_id: u64, message_id: &str) -> bool {
        self.get(channel_id).is_some_and(|c| c.contains(message_id))
    }

    /// Advance the channel's cursor to `message_id`.
    pub fn record(&mut self, channel_id: u64, message_id: &str) {
        self.channels.entry(channel_id).or_default().record(message_id);
    }
}
