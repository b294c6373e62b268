//! Shared message store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::backend::{MemoryBackend, MessageBackend};
use super::maildir::MaildirBackend;
use super::message::{Message, MessageId, MessageSummary, SearchKind};
use crate::config::{StorageConfig, StorageKind};
use crate::{MailhogError, Result};

/// Capacity of the store event channel.
const EVENT_CAPACITY: usize = 256;

/// Change notification published after a mutation is committed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StoreEvent {
    /// A message was stored.
    Added(MessageSummary),
    /// A message was deleted.
    Deleted(MessageId),
    /// All messages were deleted.
    Cleared,
}

#[derive(Default)]
struct Index {
    order: Vec<MessageId>,
    by_id: HashMap<MessageId, Arc<Message>>,
}

impl Index {
    fn insert(&mut self, message: Arc<Message>) {
        self.order.push(message.id);
        self.by_id.insert(message.id, message);
    }

    fn remove(&mut self, id: &MessageId) -> bool {
        if self.by_id.remove(id).is_none() {
            return false;
        }
        self.order.retain(|m| m != id);
        true
    }

    fn ordered(&self) -> impl Iterator<Item = &Arc<Message>> {
        self.order.iter().filter_map(|id| self.by_id.get(id))
    }
}

struct Inner {
    writer: Mutex<Box<dyn MessageBackend>>,
    index: RwLock<Index>,
    events: broadcast::Sender<StoreEvent>,
}

/// Handle to the message store.
///
/// Cheap to clone; every clone refers to the same messages.
#[derive(Clone)]
pub struct MessageStore {
    inner: Arc<Inner>,
}

impl MessageStore {
    /// Open the store described by `config`, loading any persisted messages.
    pub fn open(config: &StorageConfig) -> Result<Self> {
        let backend: Box<dyn MessageBackend> = match config.kind {
            StorageKind::Maildir => Box::new(MaildirBackend::open(&config.path)?),
            StorageKind::Memory => Box::new(MemoryBackend),
        };
        Self::with_backend(backend)
    }

    /// Store that keeps messages in memory only.
    pub fn in_memory() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                writer: Mutex::new(Box::new(MemoryBackend)),
                index: RwLock::new(Index::default()),
                events,
            }),
        }
    }

    /// Create a store over an arbitrary backend.
    pub fn with_backend(mut backend: Box<dyn MessageBackend>) -> Result<Self> {
        let mut index = Index::default();
        for message in backend.load()? {
            index.insert(Arc::new(message));
        }
        info!(
            backend = backend.name(),
            "Message store ready with {} message(s)",
            index.order.len()
        );

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            inner: Arc::new(Inner {
                writer: Mutex::new(backend),
                index: RwLock::new(index),
                events,
            }),
        })
    }

    /// Persist a message and make it visible.
    pub async fn put(&self, message: Message) -> Result<MessageId> {
        let message = Arc::new(message);
        let stored = Arc::clone(&message);

        self.write(move |backend, inner| {
            backend.persist(&stored)?;
            write_index(inner).insert(stored);
            Ok(())
        })
        .await?;

        debug!(id = %message.id, size = message.size, "Message stored");
        self.publish(StoreEvent::Added(message.summary()));
        Ok(message.id)
    }

    /// Fetch a message.
    pub fn get(&self, id: &MessageId) -> Result<Arc<Message>> {
        read_index(&self.inner)
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| MailhogError::NotFound(format!("message {id}")))
    }

    /// Summaries of every message in insertion order.
    pub fn list(&self) -> Vec<MessageSummary> {
        read_index(&self.inner)
            .ordered()
            .map(|m| m.summary())
            .collect()
    }

    /// Snapshot of every message in insertion order.
    pub fn messages(&self) -> Vec<Arc<Message>> {
        read_index(&self.inner).ordered().cloned().collect()
    }

    /// Messages matching a case-insensitive search, in insertion order.
    pub fn search(&self, kind: SearchKind, query: &str) -> Vec<Arc<Message>> {
        let needle = query.to_lowercase();
        read_index(&self.inner)
            .ordered()
            .filter(|m| m.matches(kind, &needle))
            .cloned()
            .collect()
    }

    /// Delete one message.
    pub async fn delete(&self, id: &MessageId) -> Result<()> {
        let id = *id;
        self.write(move |backend, inner| {
            if !read_index(inner).by_id.contains_key(&id) {
                return Err(MailhogError::NotFound(format!("message {id}")));
            }
            backend.remove(&id)?;
            write_index(inner).remove(&id);
            Ok(())
        })
        .await?;

        debug!(id = %id, "Message deleted");
        self.publish(StoreEvent::Deleted(id));
        Ok(())
    }

    /// Delete every message.
    pub async fn clear(&self) -> Result<()> {
        self.write(|backend, inner| {
            backend.clear()?;
            *write_index(inner) = Index::default();
            Ok(())
        })
        .await?;

        info!("Message store cleared");
        self.publish(StoreEvent::Cleared);
        Ok(())
    }

    /// Number of stored messages.
    pub fn len(&self) -> usize {
        read_index(&self.inner).order.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribe to store events.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    /// Run a mutation on the blocking pool while holding the writer lock.
    async fn write<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut dyn MessageBackend, &Inner) -> Result<()> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut backend = inner
                .writer
                .lock()
                .map_err(|_| MailhogError::Storage("store writer lock poisoned".to_string()))?;
            f(backend.as_mut(), &inner)
        })
        .await
        .map_err(|e| MailhogError::Storage(format!("store task failed: {e}")))?
    }

    fn publish(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }
}

fn read_index(inner: &Inner) -> std::sync::RwLockReadGuard<'_, Index> {
    inner.index.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_index(inner: &Inner) -> std::sync::RwLockWriteGuard<'_, Index> {
    inner.index.write().unwrap_or_else(PoisonError::into_inner)
}
