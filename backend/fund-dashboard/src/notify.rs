//! User-facing progress and failure notifications.
//!
//! A notification is keyed by a correlation id; publishing a second one with
//! the same id replaces the first, so "Sending transaction..." turns into
//! "Transaction complete!" in place.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{error, info};
use uuid::Uuid;

const DEFAULT_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Loading,
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub level: Level,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Notification {
    pub fn new(id: Uuid, level: Level, message: impl Into<String>) -> Self {
        Self {
            id,
            level,
            message: message.into(),
            at: Utc::now(),
        }
    }

    /// A standalone error with a fresh correlation id.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Uuid::new_v4(), Level::Error, message)
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: Notification);
}

/// Bounded in-memory board of the latest notifications, newest last.
pub struct Toasts {
    entries: RwLock<VecDeque<Notification>>,
    capacity: usize,
}

impl Toasts {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    pub async fn recent(&self) -> Vec<Notification> {
        self.entries.read().await.iter().cloned().collect()
    }
}

impl Default for Toasts {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationSink for Toasts {
    async fn notify(&self, notification: Notification) {
        match notification.level {
            Level::Error => error!("[{}] {}", notification.id, notification.message),
            _ => info!("[{}] {}", notification.id, notification.message),
        }

        let mut entries = self.entries.write().await;
        if let Some(existing) = entries.iter_mut().find(|n| n.id == notification.id) {
            *existing = notification;
            return;
        }
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(notification);
    }
}
