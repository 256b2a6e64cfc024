//! Connection Management
//!
//! Each accepted TCP connection is handled by its own async task running a
//! [`ConnectionHandler`]: read bytes, decode commands, execute, reply. The
//! listener in `main.rs` only accepts and spawns; everything per-client
//! lives here.

pub mod handler;

pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
