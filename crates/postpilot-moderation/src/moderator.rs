use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use postpilot_ai::AiService;
use postpilot_core::types::{BusinessProfile, ContentItem};
use tracing::{info, warn};

use crate::types::Verdict;

/// Overall pass requires the mean of all sub-scores to clear this bar.
const ACCEPTANCE_THRESHOLD: f64 = 0.7;
/// Topic relevance passes individually at this bar.
const TOPIC_PASS: f64 = 0.7;
/// Quality passes individually at a lower bar than topic. The asymmetry
/// is load-bearing; tests pin both values.
const QUALITY_PASS: f64 = 0.6;
/// Neutral topic score substituted when the scorer is unavailable.
const TOPIC_DEFAULT: f64 = 0.5;
/// Quality score substituted when the scorer is unavailable.
const QUALITY_DEFAULT: f64 = 0.7;

/// Scores candidate posts against stop-words, topic relevance, and quality.
pub struct ContentModerator {
    stop_words: Vec<String>,
    topics: Vec<String>,
    ai: Arc<AiService>,
    /// Accepted items, kept for reporting only (not a dedup gate).
    published: Mutex<Vec<ContentItem>>,
}

impl ContentModerator {
    pub fn new(profile: &BusinessProfile, ai: Arc<AiService>) -> Self {
        Self {
            stop_words: profile
                .stop_words
                .iter()
                .map(|w| w.to_lowercase())
                .collect(),
            topics: profile.topics.clone(),
            ai,
            published: Mutex::new(Vec::new()),
        }
    }

    /// Run all three sub-checks and aggregate.
    ///
    /// Issues accumulate only from checks that fail their own bar; the
    /// scorer calls fail open to documented default scores (which still
    /// count against the acceptance mean).
    pub async fn moderate(&self, content: &ContentItem) -> Verdict {
        info!(title = %content.title, "moderating content");

        let mut issues = Vec::new();
        let suggestions = Vec::new();
        let mut checks = BTreeMap::new();

        // 1. Stop words — local, binary.
        let (stop_score, stop_issues) = self.check_stop_words(&content.text);
        checks.insert("stop_words".to_string(), stop_score);
        issues.extend(stop_issues);

        // 2. Topic relevance — AI, neutral 0.5 on scorer failure.
        let (topic_score, topic_issues) = self.check_topic_relevance(content).await;
        checks.insert("topic".to_string(), topic_score);
        issues.extend(topic_issues);

        // 3. Quality — AI, 0.7 on scorer failure, passes at the lower 0.6 bar.
        let (quality_score, quality_issues) = self.check_quality(content).await;
        checks.insert("quality".to_string(), quality_score);
        issues.extend(quality_issues);

        let score = checks.values().sum::<f64>() / checks.len() as f64;
        let passed = issues.is_empty() && score >= ACCEPTANCE_THRESHOLD;

        Verdict {
            passed,
            score,
            issues,
            suggestions,
            checks,
        }
    }

    /// Stamp `published_at` and append to the reporting history.
    pub fn add_to_published(&self, content: &ContentItem) {
        let mut item = content.clone();
        item.published_at = Some(Utc::now());
        info!(title = %item.title, "content added to published history");
        self.published.lock().unwrap().push(item);
    }

    pub fn published_history(&self) -> Vec<ContentItem> {
        self.published.lock().unwrap().clone()
    }

    // --- sub-checks ---------------------------------------------------------

    fn check_stop_words(&self, text: &str) -> (f64, Vec<String>) {
        let text_lower = text.to_lowercase();
        let found: Vec<&String> = self
            .stop_words
            .iter()
            .filter(|w| text_lower.contains(w.as_str()))
            .collect();
        if found.is_empty() {
            (1.0, Vec::new())
        } else {
            let issues = found.iter().map(|w| format!("stop word: {w}")).collect();
            (0.0, issues)
        }
    }

    async fn check_topic_relevance(&self, content: &ContentItem) -> (f64, Vec<String>) {
        match self.ai.score_topic(&self.topics, &content.text).await {
            Ok(result) => {
                if result.score < TOPIC_PASS {
                    (result.score, vec![result.reason])
                } else {
                    (result.score, Vec::new())
                }
            }
            Err(e) => {
                // Neutral score, no issue recorded; the acceptance mean
                // still decides the overall verdict.
                warn!("topic scorer unavailable, defaulting to {TOPIC_DEFAULT}: {e}");
                (TOPIC_DEFAULT, Vec::new())
            }
        }
    }

    async fn check_quality(&self, content: &ContentItem) -> (f64, Vec<String>) {
        match self.ai.score_quality(&content.text).await {
            Ok(result) => {
                if result.score < QUALITY_PASS {
                    (result.score, result.issues)
                } else {
                    (result.score, Vec::new())
                }
            }
            Err(e) => {
                warn!("quality scorer unavailable, defaulting to {QUALITY_DEFAULT}: {e}");
                (QUALITY_DEFAULT, Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use postpilot_ai::{ChatRequest, ChatResponse, LlmProvider, ProviderError};
    use postpilot_core::config::ImageConfig;

    /// Answers the topic and quality scorer prompts with fixed JSON;
    /// `fail` simulates a provider outage for both.
    struct ScorerStub {
        topic_json: String,
        quality_json: String,
        fail: bool,
    }

    #[async_trait]
    impl LlmProvider for ScorerStub {
        fn name(&self) -> &str {
            "scorer-stub"
        }

        async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            if self.fail {
                return Err(ProviderError::Unavailable("stub outage".into()));
            }
            let prompt = &req.messages[0].content;
            let content = if prompt.contains("topical relevance") {
                self.topic_json.clone()
            } else {
                self.quality_json.clone()
            };
            Ok(ChatResponse {
                content,
                model: req.model.clone(),
                tokens_in: 0,
                tokens_out: 0,
                stop_reason: "stop".into(),
            })
        }
    }

    fn moderator_with(topic_json: &str, quality_json: &str, fail: bool) -> ContentModerator {
        let ai = Arc::new(AiService::new(
            Arc::new(ScorerStub {
                topic_json: topic_json.to_string(),
                quality_json: quality_json.to_string(),
                fail,
            }),
            "test-model",
            ImageConfig::default(),
        ));
        let profile = BusinessProfile {
            account_id: 1,
            niche: "coffee".into(),
            description: String::new(),
            target_audience: String::new(),
            goals: String::new(),
            stop_words: vec!["casino".into(), "Gambling".into()],
            topics: vec!["coffee".into(), "brewing".into()],
            brand_tone: String::new(),
            connected_platforms: vec![],
        };
        ContentModerator::new(&profile, ai)
    }

    fn item(text: &str) -> ContentItem {
        ContentItem::new("Test post", text, "coffee")
    }

    #[tokio::test]
    async fn stop_word_match_always_rejects() {
        let m = moderator_with(
            r#"{"score": 1.0, "reason": ""}"#,
            r#"{"score": 1.0, "issues": []}"#,
            false,
        );
        let v = m.moderate(&item("Visit our CASINO tonight")).await;
        assert!(!v.passed);
        assert!(v.issues.iter().any(|i| i.contains("casino")));
        assert_eq!(v.checks["stop_words"], 0.0);
    }

    #[tokio::test]
    async fn stop_words_match_case_insensitively() {
        let m = moderator_with(
            r#"{"score": 1.0, "reason": ""}"#,
            r#"{"score": 1.0, "issues": []}"#,
            false,
        );
        let v = m.moderate(&item("no gambling here, just espresso")).await;
        assert!(!v.passed);
        assert!(v.issues.iter().any(|i| i.contains("gambling")));
    }

    #[tokio::test]
    async fn clean_high_scores_pass() {
        let m = moderator_with(
            r#"{"score": 0.9, "reason": ""}"#,
            r#"{"score": 0.8, "issues": []}"#,
            false,
        );
        let v = m.moderate(&item("Fresh single-origin beans this week")).await;
        assert!(v.passed);
        let expected = (1.0 + 0.9 + 0.8) / 3.0;
        assert!((v.score - expected).abs() < 1e-9);
        assert!(v.issues.is_empty());
    }

    #[tokio::test]
    async fn zero_issues_but_low_mean_rejects() {
        // Quality 0.3 fails its own bar but reports no issues, topic 0.7
        // passes: issue list stays empty while the mean
        // (1.0 + 0.7 + 0.3)/3 = 0.666… falls short of 0.7.
        let m = moderator_with(
            r#"{"score": 0.7, "reason": ""}"#,
            r#"{"score": 0.3, "issues": []}"#,
            false,
        );
        let v = m.moderate(&item("fine text")).await;
        assert!(v.issues.is_empty());
        assert!(v.score < 0.7);
        assert!(!v.passed);
    }

    #[tokio::test]
    async fn quality_between_bars_passes_overall() {
        // The documented asymmetry: quality 0.65 is below the 0.7 acceptance
        // bar but above its own 0.6 bar, so it adds no issue and the mean
        // still clears 0.7.
        let m = moderator_with(
            r#"{"score": 0.95, "reason": ""}"#,
            r#"{"score": 0.65, "issues": ["slightly clunky"]}"#,
            false,
        );
        let v = m.moderate(&item("Brew guide part 3")).await;
        assert!(v.passed, "quality between 0.6 and 0.7 must not reject");
        assert!(v.issues.is_empty(), "passing quality check drops its issues");
    }

    #[tokio::test]
    async fn low_topic_score_records_reason() {
        let m = moderator_with(
            r#"{"score": 0.2, "reason": "not about coffee"}"#,
            r#"{"score": 0.9, "issues": []}"#,
            false,
        );
        let v = m.moderate(&item("crypto trading signals")).await;
        assert!(!v.passed);
        assert!(v.issues.contains(&"not about coffee".to_string()));
    }

    #[tokio::test]
    async fn scorer_outage_fails_open_to_defaults() {
        let m = moderator_with("", "", true);
        let v = m.moderate(&item("clean text")).await;
        // stop 1.0, topic default 0.5, quality default 0.7 → mean 0.733…
        assert!(v.issues.is_empty(), "outage must not fabricate issues");
        assert_eq!(v.checks["topic"], 0.5);
        assert_eq!(v.checks["quality"], 0.7);
        assert!(v.passed, "defaults keep the mean above the acceptance bar");
    }

    #[tokio::test]
    async fn published_history_stamps_timestamp() {
        let m = moderator_with(
            r#"{"score": 1.0, "reason": ""}"#,
            r#"{"score": 1.0, "issues": []}"#,
            false,
        );
        let it = item("accepted");
        m.add_to_published(&it);
        let history = m.published_history();
        assert_eq!(history.len(), 1);
        assert!(history[0].published_at.is_some());
    }
}
