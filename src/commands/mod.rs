//! Command Processing Layer
//!
//! Sits between the protocol decoder and the storage engine:
//!
//! ```text
//! decoded args -> CommandHandler -> StorageEngine -> Reply
//! ```
//!
//! The handler validates arity and argument shapes, routes by uppercased
//! command name, and translates engine results and errors into wire
//! replies. See [`handler`] for the command table.

pub mod handler;

pub use handler::CommandHandler;
