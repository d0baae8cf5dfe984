//! `postpilot-core` — shared types, errors, and configuration.
//!
//! Everything here is consumed by the other postpilot crates: the content
//! and profile data model, the post lifecycle state machine, and the
//! TOML + env configuration loader.

pub mod config;
pub mod error;
pub mod types;

pub use config::PostpilotConfig;
pub use error::{PostpilotError, Result};
pub use types::{Account, AccountCredentials, BusinessProfile, ContentItem, PostStatus};
