//! `postpilot-ai` — LLM access for content generation and scoring.
//!
//! [`provider::LlmProvider`] is the transport seam: one HTTP implementation
//! ([`openai::OpenAiProvider`]) ships, and tests substitute canned fakes.
//! [`service::AiService`] is the domain facade the pipeline talks to: theme
//! ideas, post bodies, image prompts, best posting times, and the two
//! moderation scorers. Every call is synchronous from the caller's view and
//! bounded by the provider's request timeout.

pub mod openai;
pub mod provider;
pub mod service;

pub use provider::{ChatRequest, ChatResponse, LlmProvider, Message, ProviderError, Role};
pub use service::{AiService, QualityScore, TopicScore};
