//! Storage backend trait.

use super::message::{Message, MessageId};
use crate::Result;

/// Persistence backend behind the message store.
///
/// The store serializes all calls through its writer lock, so
/// implementations never see concurrent mutations. A call that returns
/// `Ok` must leave the change durable; a call that fails must leave the
/// previously persisted state readable by `load`.
pub trait MessageBackend: Send {
    /// Name of the backend, for logging.
    fn name(&self) -> &'static str;

    /// Read back every persisted message in insertion order.
    fn load(&mut self) -> Result<Vec<Message>>;

    /// Persist a new message.
    fn persist(&mut self, message: &Message) -> Result<()>;

    /// Remove a persisted message.
    fn remove(&mut self, id: &MessageId) -> Result<()>;

    /// Remove every persisted message.
    fn clear(&mut self) -> Result<()>;
}

/// Backend that keeps nothing outside the in-memory index.
#[derive(Debug, Default)]
pub struct MemoryBackend;

impl MessageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn load(&mut self) -> Result<Vec<Message>> {
        Ok(Vec::new())
    }

    fn persist(&mut self, _message: &Message) -> Result<()> {
        Ok(())
    }

    fn remove(&mut self, _id: &MessageId) -> Result<()> {
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        Ok(())
    }
}
