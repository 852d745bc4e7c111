//! pmboard-state: embedded state store for pmboard.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for users, sessions, project parameters, field permissions,
//! projects, messages, notifications, and the audit log.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Unique secondary indexes (user email, parameter key) live in their own
//! tables and are maintained inside the same write transaction as the
//! record they point at. Composite keys (`{parameter_id}:{ROLE}`,
//! `{user_id}:{notification_id}`) enable prefix scans for related records.
//!
//! Multi-record mutations go through [`StateStore::write`], which hands a
//! [`StoreTxn`] to a closure and commits only if the closure succeeds.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod ids;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use ids::{new_id, random_bytes, random_hex, unix_now};
pub use store::{StateStore, StoreTxn};
pub use types::*;
