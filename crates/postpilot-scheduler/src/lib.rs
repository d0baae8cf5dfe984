//! `postpilot-scheduler` — per-account publication timing.
//!
//! # Overview
//!
//! [`scheduler::PostingScheduler`] spreads approved content over the
//! account's preferred times of day (one post per calendar day, see
//! [`slots`]) and arms a Tokio timer per post. The durable row in the
//! store is always authoritative: timers re-read it before publishing,
//! restarts rebuild them from it, and the daemon sweeps it for anything
//! a dead process left behind.

pub mod error;
pub mod scheduler;
pub mod slots;
pub mod types;

pub use error::{Result, SchedulerError};
pub use scheduler::PostingScheduler;
pub use types::{CalendarEntry, RefillRequest, ScheduledPost};
