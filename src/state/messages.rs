//! Bounded per-target store of recent messages.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// How often the background sweep re-applies the per-target cap.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// What a stored message was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Private,
    Notice,
    Channel,
    Server,
}

/// The sender identity captured at store time, so replayed lines keep
/// the prefix they were sent with even if the user is gone.
#[derive(Debug, Clone)]
pub struct SenderInfo {
    pub nick: String,
    pub username: String,
    pub host: String,
}

/// One stored message.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: Uuid,
    pub sender: SenderInfo,
    /// Channel name or nickname the message was addressed to.
    pub target: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub kind: MessageKind,
}

impl StoredMessage {
    pub fn new(sender: SenderInfo, target: impl Into<String>, content: impl Into<String>, kind: MessageKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            target: target.into(),
            content: content.into(),
            timestamp: Utc::now(),
            kind,
        }
    }
}

/// Ring buffer of recent messages per target, capped at `max_per_target`.
pub struct MessageStore {
    messages: RwLock<HashMap<String, VecDeque<StoredMessage>>>,
    max_per_target: usize,
}

impl MessageStore {
    pub fn new(max_per_target: usize) -> Self {
        Self {
            messages: RwLock::new(HashMap::new()),
            max_per_target,
        }
    }

    /// Append a message, dropping from the front past the cap.
    pub async fn store(&self, message: StoredMessage) {
        let mut messages = self.messages.write().await;
        let ring = messages.entry(message.target.clone()).or_default();
        ring.push_back(message);
        while ring.len() > self.max_per_target {
            ring.pop_front();
        }
    }

    /// The most recent `limit` messages for a target, oldest first.
    pub async fn get(&self, target: &str, limit: usize) -> Vec<StoredMessage> {
        let messages = self.messages.read().await;
        match messages.get(target) {
            Some(ring) => {
                let skip = ring.len().saturating_sub(limit);
                ring.iter().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Messages for a target with `timestamp >= cutoff`, oldest first.
    pub async fn get_since(&self, target: &str, cutoff: DateTime<Utc>) -> Vec<StoredMessage> {
        let messages = self.messages.read().await;
        match messages.get(target) {
            Some(ring) => ring
                .iter()
                .filter(|m| m.timestamp >= cutoff)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Drop everything stored for a target.
    pub async fn clear(&self, target: &str) {
        self.messages.write().await.remove(target);
    }

    /// Re-apply the cap to every ring. `store` already maintains it;
    /// the hourly sweep keeps any drift from becoming unbounded.
    pub async fn prune(&self) {
        let mut messages = self.messages.write().await;
        for (target, ring) in messages.iter_mut() {
            if ring.len() > self.max_per_target {
                let excess = ring.len() - self.max_per_target;
                ring.drain(..excess);
                debug!(target = %target, excess, "pruned message ring");
            }
        }
    }

    /// Spawn the periodic sweep task.
    pub fn spawn_sweeper(store: Arc<MessageStore>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.tick().await; // skip the immediate first tick
            loop {
                ticker.tick().await;
                store.prune().await;
            }
        })
    }
}
