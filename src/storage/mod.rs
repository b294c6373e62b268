//! Message storage module.
//!
//! Captured messages are kept in an in-memory index backed by a
//! [`MessageBackend`]. The default maildir backend writes each message to
//! its own file and records every mutation in an append-only journal so the
//! store survives restarts.

mod backend;
mod maildir;
mod message;
mod store;

pub use backend::{MemoryBackend, MessageBackend};
pub use maildir::MaildirBackend;
pub use message::{
    canonical_header_name, Headers, Message, MessageId, MessageSummary, MimePart, SearchKind,
};
pub use store::{MessageStore, StoreEvent};
