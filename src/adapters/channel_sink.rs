//! Cross-thread event forwarding.
//!
//! [`ChannelSink`] implements [`EventSink`] by pushing into a bounded
//! embassy channel; the notifier thread drains it. A full channel drops the
//! event with a warning rather than stall the frame path or the worker.

use std::sync::Arc;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::warn;

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Event channel depth.
pub const EVENT_QUEUE_DEPTH: usize = 32;

pub type EventQueue = Channel<CriticalSectionRawMutex, AppEvent, EVENT_QUEUE_DEPTH>;

#[derive(Clone)]
pub struct ChannelSink {
    queue: Arc<EventQueue>,
}

impl ChannelSink {
    pub fn new(queue: Arc<EventQueue>) -> Self {
        Self { queue }
    }

    /// Take the next queued event, if any.
    pub fn try_next(&self) -> Option<AppEvent> {
        self.queue.try_receive().ok()
    }
}

impl EventSink for ChannelSink {
    fn emit(&mut self, event: &AppEvent) {
        if self.queue.try_send(event.clone()).is_err() {
            warn!("EVENTS: queue full, dropping {:?}", event);
        }
    }
}
