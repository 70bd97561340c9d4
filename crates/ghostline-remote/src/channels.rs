//! Event fan-out channels
//!
//! Inbound events travel from IPC handlers to the bridge event loop through
//! three independently bounded queues. Offering never blocks: when a queue is
//! full the newest event is discarded with a warning and counted, so the IPC
//! read loop keeps decoding regardless of how far behind the consumer is.

use crate::types::{Message, ReadReceipt, TypingNotification};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Capacities of the event queues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Incoming message queue depth
    pub message_capacity: usize,
    /// Read receipt queue depth
    pub receipt_capacity: usize,
    /// Typing notification queue depth
    pub typing_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            message_capacity: 256,
            receipt_capacity: 32,
            typing_capacity: 32,
        }
    }
}

impl ChannelConfig {
    /// Whether every queue can hold at least one event
    pub fn is_valid(&self) -> bool {
        self.message_capacity > 0 && self.receipt_capacity > 0 && self.typing_capacity > 0
    }
}

/// Outcome of offering an event to a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// The event was queued
    Queued,
    /// The queue was full; the event was discarded
    Dropped,
    /// The consumer is gone; the event was discarded
    Closed,
}

#[derive(Debug, Default)]
struct DropCounters {
    messages: AtomicU64,
    receipts: AtomicU64,
    typing: AtomicU64,
}

/// Events discarded per queue because it was full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Dropped incoming messages
    pub dropped_messages: u64,
    /// Dropped read receipts
    pub dropped_receipts: u64,
    /// Dropped typing notifications
    pub dropped_typing: u64,
}

/// Producer side of the three event queues
#[derive(Debug, Clone)]
pub struct EventSenders {
    messages: mpsc::Sender<Message>,
    receipts: mpsc::Sender<ReadReceipt>,
    typing: mpsc::Sender<TypingNotification>,
    drops: Arc<DropCounters>,
}

/// Consumer side of the three event queues
#[derive(Debug)]
pub struct EventReceivers {
    /// Incoming messages
    pub messages: mpsc::Receiver<Message>,
    /// Incoming read receipts
    pub receipts: mpsc::Receiver<ReadReceipt>,
    /// Incoming typing notifications
    pub typing: mpsc::Receiver<TypingNotification>,
}

/// Create the three bounded queues
pub fn event_channels(config: ChannelConfig) -> (EventSenders, EventReceivers) {
    let (messages_tx, messages_rx) = mpsc::channel(config.message_capacity.max(1));
    let (receipts_tx, receipts_rx) = mpsc::channel(config.receipt_capacity.max(1));
    let (typing_tx, typing_rx) = mpsc::channel(config.typing_capacity.max(1));
    (
        EventSenders {
            messages: messages_tx,
            receipts: receipts_tx,
            typing: typing_tx,
            drops: Arc::new(DropCounters::default()),
        },
        EventReceivers {
            messages: messages_rx,
            receipts: receipts_rx,
            typing: typing_rx,
        },
    )
}

fn offer<T>(queue: &'static str, sender: &mpsc::Sender<T>, counter: &AtomicU64, event: T) -> Offer {
    match sender.try_send(event) {
        Ok(()) => Offer::Queued,
        Err(TrySendError::Full(_)) => {
            let dropped = counter.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(
                queue,
                capacity = sender.max_capacity(),
                dropped,
                "Event queue full, dropping newest event"
            );
            Offer::Dropped
        }
        Err(TrySendError::Closed(_)) => {
            debug!(queue, "Event queue closed, dropping event");
            Offer::Closed
        }
    }
}

impl EventSenders {
    /// Queue an incoming message without blocking
    pub fn offer_message(&self, message: Message) -> Offer {
        offer("message", &self.messages, &self.drops.messages, message)
    }

    /// Queue a read receipt without blocking
    pub fn offer_receipt(&self, receipt: ReadReceipt) -> Offer {
        offer("read_receipt", &self.receipts, &self.drops.receipts, receipt)
    }

    /// Queue a typing notification without blocking
    pub fn offer_typing(&self, notification: TypingNotification) -> Offer {
        offer("typing", &self.typing, &self.drops.typing, notification)
    }

    /// Drop counters so far
    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            dropped_messages: self.drops.messages.load(Ordering::Relaxed),
            dropped_receipts: self.drops.receipts.load(Ordering::Relaxed),
            dropped_typing: self.drops.typing.load(Ordering::Relaxed),
        }
    }
}
