use std::sync::Arc;

use postpilot_core::config::ImageConfig;
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::provider::{ChatRequest, LlmProvider, ProviderError};

/// Best-times fallback when the recommender call fails outright.
const BEST_TIMES_ON_ERROR: [&str; 3] = ["09:00", "12:00", "18:00"];
/// Best-times fallback when the call succeeds but returns an empty list.
const BEST_TIMES_ON_EMPTY: [&str; 2] = ["10:00", "19:00"];
/// Upper bound on theme ideas taken from one generation call.
const MAX_THEMES: usize = 5;

/// Topic-relevance verdict from the scorer.
#[derive(Debug, Clone, Deserialize)]
pub struct TopicScore {
    pub score: f64,
    #[serde(default)]
    pub reason: String,
}

/// Quality verdict from the scorer.
#[derive(Debug, Clone, Deserialize)]
pub struct QualityScore {
    pub score: f64,
    #[serde(default)]
    pub issues: Vec<String>,
}

/// Domain facade over the raw LLM provider.
///
/// Generation helpers degrade to documented defaults on provider failure;
/// the two scoring calls surface their errors so the moderator can apply
/// its own fail-open defaults.
pub struct AiService {
    provider: Arc<dyn LlmProvider>,
    model: String,
    image: ImageConfig,
}

impl AiService {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>, image: ImageConfig) -> Self {
        Self {
            provider,
            model: model.into(),
            image,
        }
    }

    /// Generate up to five post theme ideas from the business strategy,
    /// avoiding themes already in the archive. Returns an empty list on
    /// any provider failure.
    pub async fn generate_theme_ideas(&self, strategy: &str, known_themes: &[String]) -> Vec<String> {
        let prompt = format!(
            "You help plan social-media content.\n\
             Business strategy: {strategy}\n\
             Suggest 5 engaging post themes. Do not repeat any of these \
             already-used themes: {known:?}.\n\
             Return JSON: {{\"themes\": [\"...\"]}}",
            known = known_themes,
        );
        match self.chat_json(&prompt).await {
            Ok(value) => {
                let themes: Vec<String> = value
                    .get("themes")
                    .and_then(|t| t.as_array())
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|v| v.as_str())
                            .map(|s| s.trim().to_string())
                            .filter(|s| !s.is_empty())
                            .collect()
                    })
                    .unwrap_or_default();
                let mut themes = themes;
                themes.truncate(MAX_THEMES);
                info!(count = themes.len(), "theme ideas generated");
                themes
            }
            Err(e) => {
                error!("theme generation failed: {e}");
                Vec::new()
            }
        }
    }

    /// Generate the body text for one theme. `None` on failure or empty output.
    pub async fn generate_post_content(&self, theme: &str) -> Option<String> {
        let prompt = format!(
            "You write social-media posts.\n\
             Write a post on the theme: \"{theme}\".\n\
             Make it engaging and informative. Finish with comma-separated \
             hashtags on the theme. Maximum 500 characters. No markdown.",
        );
        match self.chat_text(&prompt).await {
            Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(_) => {
                warn!(%theme, "empty post body from provider");
                None
            }
            Err(e) => {
                error!(%theme, "post body generation failed: {e}");
                None
            }
        }
    }

    /// Generate a short image prompt for a theme. `None` on failure.
    pub async fn generate_image_prompt(&self, theme: &str) -> Option<String> {
        let prompt = format!(
            "Produce a short, vivid image-generation prompt for an \
             illustration of: {theme}. Reply with the prompt only.",
        );
        match self.chat_text(&prompt).await {
            Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                error!(%theme, "image prompt generation failed: {e}");
                None
            }
        }
    }

    /// Build the public image-service URL for a prompt. Pure string work,
    /// the image itself is fetched lazily by the publisher.
    pub fn image_url(&self, image_prompt: &str) -> String {
        format!(
            "{}/prompt/{}?width={}&height={}&nologo=true",
            self.image.base_url,
            urlencoding::encode(image_prompt),
            self.image.width,
            self.image.height,
        )
    }

    /// Ask the recommender for the best posting times.
    ///
    /// Falls back to a three-slot list on provider failure and a two-slot
    /// list when the provider answers with an empty or missing `times` list.
    pub async fn best_posting_times(&self, business_type: &str) -> Vec<String> {
        let prompt = format!(
            "Business: {business_type}.\n\
             Suggest 3 best times of day for posting (HH:MM format).\n\
             Return JSON: {{\"times\": [\"09:00\", \"18:00\", \"21:00\"]}}",
        );
        match self.chat_json(&prompt).await {
            Ok(value) => {
                let times: Vec<String> = value
                    .get("times")
                    .and_then(|t| t.as_array())
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|v| v.as_str())
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                if times.is_empty() {
                    BEST_TIMES_ON_EMPTY.iter().map(|s| s.to_string()).collect()
                } else {
                    times
                }
            }
            Err(e) => {
                error!("best-times recommendation failed: {e}");
                BEST_TIMES_ON_ERROR.iter().map(|s| s.to_string()).collect()
            }
        }
    }

    /// Score how relevant `text` is to the business topics, 0.0–1.0.
    /// Errors propagate; the moderator owns the fail-open default.
    pub async fn score_topic(&self, topics: &[String], text: &str) -> Result<TopicScore, ProviderError> {
        let prompt = format!(
            "You are a strict content moderator.\n\
             Business topics: {}.\n\
             Text: {text}\n\
             Rate topical relevance from 0.0 to 1.0.\n\
             Return JSON: {{\"score\": float, \"reason\": str}}",
            topics.join(", "),
        );
        let value = self.chat_json(&prompt).await?;
        serde_json::from_value(value).map_err(|e| ProviderError::Parse(e.to_string()))
    }

    /// Score grammar/style/structure quality of `text`, 0.0–1.0.
    pub async fn score_quality(&self, text: &str) -> Result<QualityScore, ProviderError> {
        let prompt = format!(
            "Check the quality of this social-media text.\n\
             Text: {text}\n\
             Rate 0.0–1.0 on grammar, style, and persuasive structure.\n\
             Return JSON: {{\"score\": float, \"issues\": [str]}}",
        );
        let value = self.chat_json(&prompt).await?;
        serde_json::from_value(value).map_err(|e| ProviderError::Parse(e.to_string()))
    }

    // --- private helpers ---------------------------------------------------

    async fn chat_text(&self, prompt: &str) -> Result<String, ProviderError> {
        let req = ChatRequest::user_prompt(&self.model, prompt, false);
        Ok(self.provider.send(&req).await?.content)
    }

    async fn chat_json(&self, prompt: &str) -> Result<serde_json::Value, ProviderError> {
        let req = ChatRequest::user_prompt(&self.model, prompt, true);
        let resp = self.provider.send(&req).await?;
        serde_json::from_str(&resp.content).map_err(|e| ProviderError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ChatResponse, LlmProvider};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned response bodies in order; `Err` entries simulate
    /// provider outages.
    struct CannedProvider {
        replies: Mutex<VecDeque<Result<String, ()>>>,
    }

    impl CannedProvider {
        fn new(replies: Vec<Result<&str, ()>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|r| r.map(str::to_string))
                        .collect(),
                ),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for CannedProvider {
        fn name(&self) -> &str {
            "canned"
        }

        async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            let next = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(()));
            match next {
                Ok(content) => Ok(ChatResponse {
                    content,
                    model: req.model.clone(),
                    tokens_in: 0,
                    tokens_out: 0,
                    stop_reason: "stop".into(),
                }),
                Err(()) => Err(ProviderError::Unavailable("canned outage".into())),
            }
        }
    }

    fn service(replies: Vec<Result<&str, ()>>) -> AiService {
        AiService::new(
            CannedProvider::new(replies),
            "test-model",
            ImageConfig::default(),
        )
    }

    #[tokio::test]
    async fn theme_ideas_capped_at_five() {
        let svc = service(vec![Ok(
            r#"{"themes": ["a", "b", "c", "d", "e", "f", "g"]}"#
        )]);
        let themes = svc.generate_theme_ideas("coffee shop", &[]).await;
        assert_eq!(themes.len(), 5);
        assert_eq!(themes[0], "a");
    }

    #[tokio::test]
    async fn theme_ideas_empty_on_provider_failure() {
        let svc = service(vec![Err(())]);
        assert!(svc.generate_theme_ideas("x", &[]).await.is_empty());
    }

    #[tokio::test]
    async fn best_times_fallback_on_error() {
        let svc = service(vec![Err(())]);
        assert_eq!(
            svc.best_posting_times("bakery").await,
            vec!["09:00", "12:00", "18:00"]
        );
    }

    #[tokio::test]
    async fn best_times_fallback_on_empty_list() {
        let svc = service(vec![Ok(r#"{"times": []}"#)]);
        assert_eq!(svc.best_posting_times("bakery").await, vec!["10:00", "19:00"]);

        let svc = service(vec![Ok(r#"{"nope": 1}"#)]);
        assert_eq!(svc.best_posting_times("bakery").await, vec!["10:00", "19:00"]);
    }

    #[tokio::test]
    async fn best_times_passthrough_when_present() {
        let svc = service(vec![Ok(r#"{"times": ["08:30", "20:00"]}"#)]);
        assert_eq!(svc.best_posting_times("bakery").await, vec!["08:30", "20:00"]);
    }

    #[tokio::test]
    async fn post_content_none_on_empty_body() {
        let svc = service(vec![Ok("   ")]);
        assert!(svc.generate_post_content("brewing").await.is_none());
    }

    #[tokio::test]
    async fn topic_score_parses_reason() {
        let svc = service(vec![Ok(r#"{"score": 0.4, "reason": "off topic"}"#)]);
        let score = svc.score_topic(&["coffee".into()], "crypto tips").await.unwrap();
        assert!((score.score - 0.4).abs() < f64::EPSILON);
        assert_eq!(score.reason, "off topic");
    }

    #[tokio::test]
    async fn quality_score_errors_propagate() {
        let svc = service(vec![Err(())]);
        assert!(svc.score_quality("text").await.is_err());
    }

    #[test]
    fn image_url_encodes_prompt() {
        let svc = service(vec![]);
        let url = svc.image_url("latte art heart");
        assert!(url.starts_with("https://image.pollinations.ai/prompt/latte%20art%20heart?"));
        assert!(url.contains("width=1024"));
        assert!(url.contains("nologo=true"));
    }
}
