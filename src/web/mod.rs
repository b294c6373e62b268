//! HTTP API and browser UI.
//!
//! Everything is mounted under the configured web path: the JSON API at
//! `<web_path>/api`, the inspector page at `<web_path>/`. `/health` is
//! always at the root.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod server;
pub mod ui;

pub use error::ApiError;
pub use handlers::AppState;
pub use router::create_router;
pub use server::WebServer;
