//! SMTP intake.
//!
//! [`SmtpServer`] accepts connections and [`SmtpHandler`] drives one
//! [`Session`] per connection, storing each completed message.

mod command;
mod connection;
mod error;
mod listener;
mod reply;
mod session;

pub use command::Command;
pub use connection::SmtpHandler;
pub use error::{SmtpError, SmtpLimits};
pub use listener::{ConnectionPermit, SmtpServer};
pub use reply::Reply;
pub use session::{DataLine, Envelope, Session, SessionLimits, SessionState};
