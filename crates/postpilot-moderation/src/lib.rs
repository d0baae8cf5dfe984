//! `postpilot-moderation` — the pre-publication content gate.
//!
//! Three sub-checks feed one [`Verdict`]: a local stop-word scan, an
//! AI topic-relevance score, and an AI quality score. The aggregation rule
//! is deliberately asymmetric (see [`moderator`]) and must not be
//! "corrected": tests pin the exact thresholds.

pub mod moderator;
pub mod types;

pub use moderator::ContentModerator;
pub use types::Verdict;
