//! `postpilot-publishers` — platform adapters for outbound publication.
//!
//! [`publisher::Publisher`] is the seam: one adapter per platform, stored in
//! a [`registry::PublisherRegistry`] keyed by lowercase platform name and
//! built once at startup. The only shipping adapter is
//! [`vk::VkPublisher`] (wall-post API with optional photo upload). Remote
//! failures come back as structured [`error::PublishError`] values, never
//! panics.

pub mod error;
pub mod publisher;
pub mod registry;
pub mod vk;

pub use error::PublishError;
pub use publisher::{PublishReceipt, Publisher};
pub use registry::PublisherRegistry;
pub use vk::VkPublisher;
