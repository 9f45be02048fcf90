//! The `transport` module is the producer's request surface.
//!
//! Clients send JSON text frames over WebSocket asking to publish a message
//! or for a health check; every frame gets one JSON reply. Publishing is
//! delegated to the [`crate::publisher::Publisher`].

pub mod handler;
pub mod message;
pub mod websocket;

pub use handler::{ValidationError, handle_client_message};
pub use message::{ClientMessage, ServerMessage};
