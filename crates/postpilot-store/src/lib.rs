//! `postpilot-store` — durable state over SQLite.
//!
//! The store is the source of truth for every post: the in-memory timers in
//! the scheduler are an optimization, and the daemon's poll loop reconciles
//! against these tables after a crash. Timestamps are ISO-8601 TEXT so
//! lexicographic comparison in SQL matches chronological order.

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::{Result, StoreError};
pub use store::ContentStore;
pub use types::PostRow;
