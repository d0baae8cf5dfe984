//! `postpilot-platform` — the account-level content pipeline.
//!
//! [`platform::ContentPlatform`] ties the pieces together for one account:
//! content plans go through the moderation gate and onto the calendar
//! ([`ContentPlatform::process`](platform::ContentPlatform::process)), and a
//! drained queue is refilled end to end from theme generation to scheduled
//! posts ([`ContentPlatform::auto_replenish`](platform::ContentPlatform::auto_replenish)).

pub mod error;
pub mod platform;
pub mod types;

pub use error::{PlatformError, Result};
pub use platform::ContentPlatform;
pub use types::{ProcessReport, RejectedItem};
