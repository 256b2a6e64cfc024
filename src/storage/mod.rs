//! Storage Engine Module
//!
//! The typed key/value store backing every connection, plus its helpers:
//!
//! - `engine`: the [`StorageEngine`] itself - one namespace, five value
//!   families, per-key expiry, a single `RwLock` for linearizability
//! - `zset`: the member-map + ordered-index composite behind sorted sets
//! - `glob`: compiled glob patterns for KEYS
//! - `expiry`: the background sweeper reclaiming expired entries
//!
//! ## Example
//!
//! ```
//! use cinderkv::storage::StorageEngine;
//! use bytes::Bytes;
//!
//! let engine = StorageEngine::new();
//! engine.set(Bytes::from("name"), Bytes::from("cinder"), None);
//! assert_eq!(engine.get(b"name").unwrap(), Some(Bytes::from("cinder")));
//!
//! // One value family per key: a string key rejects list pushes
//! assert!(engine.lpush(&Bytes::from("name"), vec![Bytes::from("x")]).is_err());
//! ```

pub mod engine;
pub mod expiry;
pub mod glob;
pub mod zset;

pub use engine::{StorageEngine, StoreError, Value};
pub use expiry::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper};
pub use glob::GlobPattern;
pub use zset::{format_score, SortedSet};
