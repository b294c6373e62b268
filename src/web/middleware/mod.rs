//! Middleware for the web server.

pub mod cors;

pub use cors::create_cors_layer;
