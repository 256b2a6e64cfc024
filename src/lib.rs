//! # CinderKV - A Minimal In-Memory Key-Value Server
//!
//! CinderKV is a small Redis-compatible, in-memory key-value server written
//! in Rust. It speaks a subset of the RESP protocol over TCP and serves
//! five value families - strings, lists, hashes, sets, and sorted sets -
//! with lazy per-key expiration.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          CinderKV                            │
//! │                                                              │
//! │  ┌─────────────┐    ┌──────────────┐    ┌───────────────┐   │
//! │  │ TCP Server  │───>│  Connection  │───>│   Command     │   │
//! │  │ (main.rs)   │    │   Handler    │    │   Handler     │   │
//! │  └─────────────┘    └──────┬───────┘    └───────┬───────┘   │
//! │                            │                    │            │
//! │                     ┌──────▼───────┐    ┌───────▼───────┐   │
//! │                     │ RESP decoder │    │ StorageEngine │   │
//! │                     │  + encoder   │    │ (one RwLock,  │   │
//! │                     └──────────────┘    │ tagged values)│   │
//! │                                         └───────▲───────┘   │
//! │                                                 │            │
//! │                                  ┌──────────────┴────────┐  │
//! │                                  │    ExpirySweeper      │  │
//! │                                  │ (background task)     │  │
//! │                                  └───────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Bytes flow one way: socket -> connection buffer -> decoder -> command
//! vector -> storage method -> reply encoder -> socket.
//!
//! ## Design highlights
//!
//! ### One type per key
//!
//! Every key maps to a single tagged [`storage::Value`]; a command that
//! finds the wrong variant under its key fails with `wrong type` and leaves
//! state untouched. A key can never be a string and a list at once.
//!
//! ### Linearizable store
//!
//! A single `RwLock` guards the entire table, so every command - including
//! the multi-key ones like MGET, SINTER, and KEYS - takes effect atomically.
//! No storage method suspends while holding the lock.
//!
//! ### Lazy + background expiry
//!
//! Expired keys are hidden the moment their deadline passes and physically
//! removed either by the next write touching them or by the background
//! sweeper. Clients cannot tell the two mechanisms apart.
//!
//! ## Module overview
//!
//! - [`protocol`]: RESP command decoder and reply encoder
//! - [`storage`]: the typed engine, sorted-set structure, glob matching,
//!   and the expiry sweeper
//! - [`commands`]: the command table and argument validation
//! - [`connection`]: per-client buffer and socket loop

pub mod commands;
pub mod connection;
pub mod protocol;
pub mod storage;

pub use commands::CommandHandler;
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{decode_command, ParseError, Reply};
pub use storage::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper, StorageEngine};

/// The default port CinderKV listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host CinderKV binds to
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Version of CinderKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
