//! Live feed fan-out to listeners
//!
//! Each listener owns a bounded queue. Sends never block: a listener whose
//! queue is full misses that batch, a listener whose receiver is gone is
//! pruned.

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use tokenagg_core::{now_ms, Aggregate, ChangeEvent, FeedConfig, FeedMessage};

pub type ListenerId = Uuid;

/// Receiving end handed to a connected client
#[derive(Debug)]
pub struct Listener {
    pub id: ListenerId,
    receiver: mpsc::Receiver<FeedMessage>,
}

impl Listener {
    pub async fn recv(&mut self) -> Option<FeedMessage> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<FeedMessage> {
        self.receiver.try_recv().ok()
    }
}

struct ListenerSlot {
    sender: mpsc::Sender<FeedMessage>,
    subscribed: AtomicBool,
}

/// Registry of connected listeners
pub struct Broadcaster {
    listeners: DashMap<ListenerId, ListenerSlot>,
    buffer: usize,
    snapshot_size: usize,
    batches_sent: AtomicU64,
    batches_dropped: AtomicU64,
}

impl Broadcaster {
    pub fn new(buffer: usize, snapshot_size: usize) -> Self {
        Self {
            listeners: DashMap::new(),
            buffer: buffer.max(1),
            snapshot_size,
            batches_sent: AtomicU64::new(0),
            batches_dropped: AtomicU64::new(0),
        }
    }

    pub fn from_feed(config: &FeedConfig) -> Self {
        Self::new(config.listener_buffer, config.snapshot_size)
    }

    /// Register a listener and queue the initial snapshot for it
    pub fn connect(&self, snapshot: &Aggregate) -> Listener {
        let id = Uuid::new_v4();
        let (sender, receiver) = mpsc::channel(self.buffer);

        let initial = FeedMessage::InitialData {
            tokens: snapshot.top(self.snapshot_size),
            timestamp: now_ms(),
        };
        // Fresh queue with capacity >= 1, cannot be full
        let _ = sender.try_send(initial);

        self.listeners.insert(
            id,
            ListenerSlot {
                sender,
                subscribed: AtomicBool::new(false),
            },
        );
        info!("Listener connected: {}", id);

        Listener { id, receiver }
    }

    /// Opt a listener into update batches
    pub fn subscribe(&self, id: &ListenerId) -> bool {
        self.set_subscribed(id, true)
    }

    pub fn unsubscribe(&self, id: &ListenerId) -> bool {
        self.set_subscribed(id, false)
    }

    pub fn disconnect(&self, id: &ListenerId) -> bool {
        let removed = self.listeners.remove(id).is_some();
        if removed {
            info!("Listener disconnected: {}", id);
        }
        removed
    }

    /// Deliver one cycle's events as a single batch, returns listeners reached
    pub fn broadcast(&self, events: Vec<ChangeEvent>) -> usize {
        if events.is_empty() {
            return 0;
        }

        let message = FeedMessage::TokenUpdate(events);
        let mut delivered = 0;
        let mut closed = Vec::new();

        for slot in self.listeners.iter() {
            if !slot.subscribed.load(Ordering::Acquire) {
                continue;
            }

            match slot.sender.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    self.batches_dropped.fetch_add(1, Ordering::Relaxed);
                    warn!("Listener {} is lagging, dropping update batch", slot.key());
                }
                Err(TrySendError::Closed(_)) => closed.push(*slot.key()),
            }
        }

        for id in closed {
            self.listeners.remove(&id);
            debug!("Pruned closed listener {}", id);
        }

        self.batches_sent
            .fetch_add(delivered as u64, Ordering::Relaxed);
        delivered
    }

    pub fn broadcast_one(&self, event: ChangeEvent) -> usize {
        self.broadcast(vec![event])
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners
            .iter()
            .filter(|slot| slot.subscribed.load(Ordering::Acquire))
            .count()
    }

    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            listeners: self.listener_count(),
            subscribers: self.subscriber_count(),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            batches_dropped: self.batches_dropped.load(Ordering::Relaxed),
        }
    }

    fn set_subscribed(&self, id: &ListenerId, subscribed: bool) -> bool {
        match self.listeners.get(id) {
            Some(slot) => {
                slot.subscribed.store(subscribed, Ordering::Release);
                debug!("Listener {} subscribed={}", id, subscribed);
                true
            }
            None => false,
        }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::from_feed(&FeedConfig::default())
    }
}

/// Broadcaster statistics
#[derive(Debug, Clone)]
pub struct BroadcastStats {
    pub listeners: usize,
    pub subscribers: usize,
    pub batches_sent: u64,
    pub batches_dropped: u64,
}
