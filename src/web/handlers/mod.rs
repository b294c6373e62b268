//! API handlers.

pub mod chaos;
pub mod events;
pub mod messages;
pub mod release;

pub use chaos::*;
pub use events::*;
pub use messages::*;
pub use release::*;

use std::sync::Arc;

use crate::chaos::Chaos;
use crate::release::{OutgoingRegistry, Releaser};
use crate::storage::{MessageId, MessageStore};
use crate::web::error::ApiError;

/// Shared state of the API handlers.
#[derive(Clone)]
pub struct AppState {
    /// Captured messages.
    pub store: MessageStore,
    /// Outbound SMTP client used by releases.
    pub releaser: Releaser,
    /// Saved release targets.
    pub outgoing: Arc<OutgoingRegistry>,
    /// Fault injection settings shared with the SMTP listener.
    pub chaos: Arc<Chaos>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(
        store: MessageStore,
        releaser: Releaser,
        outgoing: Arc<OutgoingRegistry>,
        chaos: Arc<Chaos>,
    ) -> Self {
        Self {
            store,
            releaser,
            outgoing,
            chaos,
        }
    }
}

/// Parse a message id path segment; malformed ids are a `400`.
pub(crate) fn parse_id(id: &str) -> Result<MessageId, ApiError> {
    id.parse()
        .map_err(|_| ApiError::bad_request(format!("Malformed message id '{}'", id)))
}
