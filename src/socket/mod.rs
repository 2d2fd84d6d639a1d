//! Unix socket module.
//!
//! Accept loop and per-connection handling for the control protocol.

mod connection;
mod listener;

pub use connection::handle_connection;
pub use listener::{ConnectionMetrics, SocketListener};
