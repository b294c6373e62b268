//! MailHog - SMTP capture server with a web and JSON API inspector.
//!
//! Messages accepted over SMTP are stored durably and can be listed,
//! searched, downloaded, deleted and released to a real SMTP server through
//! the HTTP API or the bundled browser UI.

pub mod app;
pub mod chaos;
pub mod config;
pub mod error;
pub mod logging;
pub mod release;
pub mod smtp;
pub mod storage;
pub mod web;

pub use app::{Application, RunningAddrs};
pub use config::Config;
pub use error::{MailhogError, Result};
pub use storage::{Message, MessageId, MessageStore};
