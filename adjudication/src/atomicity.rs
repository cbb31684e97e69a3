//! Atomicity Checker — is a unit of work small enough to execute directly?
//!
//! Two-tier strategy: an LLM assessment when a client is configured, with
//! a deterministic heuristic as the fallback. The heuristic thresholds
//! also sanity-check the LLM's own claim, so a model cannot declare a
//! sprawling task atomic. Atomicity gates the decomposition tree, so this
//! path must keep working when providers are down.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{EvalError, EvalResult};
use crate::events::{names, EventRecord, EventSink, NullSink};
use crate::extract::{self, ExtractError};
use crate::provider::{ChatMessage, CompletionConfig, SharedCompletionClient};

/// Which path produced the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AtomicityMethod {
    /// LLM assessment, threshold-checked.
    Llm,
    /// Deterministic heuristic (no client configured).
    Heuristic,
    /// Deterministic heuristic after an LLM failure.
    HeuristicFallback,
}

/// Atomicity verdict for one unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomicityResult {
    pub is_atomic: bool,
    pub complexity_score: f64,
    pub tool_count: u32,
    pub estimated_duration_seconds: u64,
    pub reasoning: String,
    pub method: AtomicityMethod,
}

/// Thresholds and LLM parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AtomicityConfig {
    pub max_complexity: f64,
    pub max_tool_count: u32,
    pub max_duration_seconds: u64,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for AtomicityConfig {
    fn default() -> Self {
        Self {
            max_complexity: 0.7,
            max_tool_count: 3,
            max_duration_seconds: 300,
            model: "gpt-5.2".to_string(),
            temperature: 0.1,
            max_tokens: 512,
        }
    }
}

/// Domain keywords that imply distinct tooling.
const TOOL_KEYWORDS: &[&str] = &[
    "database", "api", "docker", "deploy", "network", "file", "git", "test", "cache", "queue",
];

/// Conjunction/sequencing keywords that imply compound work.
const SEQUENCE_KEYWORDS: &[&str] = &["and", "then", "multiple", "also", "after", "before", "finally"];

pub struct AtomicityChecker {
    client: Option<SharedCompletionClient>,
    config: AtomicityConfig,
    sink: Arc<dyn EventSink>,
}

impl AtomicityChecker {
    /// Heuristic-only checker, for deployments without an LLM.
    pub fn heuristic_only(config: AtomicityConfig) -> Self {
        Self {
            client: None,
            config,
            sink: Arc::new(NullSink),
        }
    }

    pub fn with_client(client: SharedCompletionClient, config: AtomicityConfig) -> Self {
        Self {
            client: Some(client),
            config,
            sink: Arc::new(NullSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Decide whether `content` describes an atomic unit of work.
    pub async fn check_atomicity(
        &self,
        content: &str,
        criteria: &[String],
    ) -> EvalResult<AtomicityResult> {
        if content.trim().is_empty() {
            return Err(EvalError::Validation(
                "work description is empty".to_string(),
            ));
        }

        let result = match &self.client {
            None => self.heuristic(content, criteria, AtomicityMethod::Heuristic),
            Some(client) => match self.llm_assessment(client, content, criteria).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(error = %e, "LLM atomicity assessment failed, falling back to heuristic");
                    self.heuristic(content, criteria, AtomicityMethod::HeuristicFallback)
                }
            },
        };

        self.sink.append(EventRecord::new(
            names::ATOMICITY_CHECKED,
            "work_unit",
            content_preview(content),
            json!({
                "is_atomic": result.is_atomic,
                "complexity_score": result.complexity_score,
                "tool_count": result.tool_count,
                "estimated_duration_seconds": result.estimated_duration_seconds,
                "method": result.method,
            }),
        ));

        Ok(result)
    }

    async fn llm_assessment(
        &self,
        client: &SharedCompletionClient,
        content: &str,
        criteria: &[String],
    ) -> EvalResult<AtomicityResult> {
        let messages = build_messages(content, criteria);
        let completion = CompletionConfig {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = client.complete(&messages, &completion).await?;
        let value = extract::extract_json(&response.text)?;

        let claimed = extract::optional_bool(&value, "is_atomic")
            .ok_or_else(|| ExtractError::MissingFields(vec!["is_atomic".to_string()]))?;
        let complexity_score = extract::optional_f64(&value, "complexity_score")
            .map(extract::clamp_unit)
            .unwrap_or(0.5);
        let tool_count = value
            .get("tool_count")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(1) as u32;
        let estimated_duration_seconds = value
            .get("estimated_duration_seconds")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(60);
        let reasoning = extract::optional_str(&value, "reasoning")
            .unwrap_or_default()
            .to_string();

        // The model's claim is AND-ed with the numeric thresholds: the
        // thresholds override optimistic self-assessment.
        let is_atomic = claimed
            && self.within_thresholds(complexity_score, tool_count, estimated_duration_seconds);

        Ok(AtomicityResult {
            is_atomic,
            complexity_score,
            tool_count,
            estimated_duration_seconds,
            reasoning,
            method: AtomicityMethod::Llm,
        })
    }

    fn within_thresholds(&self, complexity: f64, tool_count: u32, duration_seconds: u64) -> bool {
        complexity < self.config.max_complexity
            && tool_count < self.config.max_tool_count
            && duration_seconds < self.config.max_duration_seconds
    }

    /// Deterministic estimate from token mass and keyword signals.
    fn heuristic(&self, content: &str, criteria: &[String], method: AtomicityMethod) -> AtomicityResult {
        let haystack = if criteria.is_empty() {
            content.to_lowercase()
        } else {
            format!("{content} {}", criteria.join(" ")).to_lowercase()
        };

        let tokens = estimate_tokens(content);
        let tool_count = TOOL_KEYWORDS
            .iter()
            .filter(|keyword| contains_word(&haystack, keyword))
            .count() as u32;
        let complexity_score = complexity_estimate(&haystack, tokens);
        let estimated_duration_seconds =
            ((tokens as f64 / 100.0) * 30.0 * (1.0 + complexity_score)) as u64;

        let is_atomic = self.within_thresholds(complexity_score, tool_count, estimated_duration_seconds);

        AtomicityResult {
            is_atomic,
            complexity_score,
            tool_count,
            estimated_duration_seconds,
            reasoning: format!(
                "heuristic estimate: ~{tokens} tokens, {tool_count} tool domains, \
                 complexity {complexity_score:.2}"
            ),
            method,
        }
    }
}

fn build_messages(content: &str, criteria: &[String]) -> Vec<ChatMessage> {
    let system = "You assess whether a unit of work is atomic: executable \
                  directly, without further decomposition. Respond with a single \
                  JSON object and no other text.";

    let mut user = String::new();
    user.push_str(&format!("## Work description\n\n{content}\n\n"));
    if !criteria.is_empty() {
        user.push_str("## Acceptance criteria\n\n");
        for criterion in criteria {
            user.push_str(&format!("- {criterion}\n"));
        }
        user.push('\n');
    }
    user.push_str(
        "Respond with JSON: {\"is_atomic\": <true|false>, \"complexity_score\": <0..1>, \
         \"tool_count\": <int>, \"estimated_duration_seconds\": <int>, \
         \"reasoning\": \"<short explanation>\"}",
    );

    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

/// Rough token estimate: one token per four characters.
fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() / 4) as u64
}

/// Base complexity from token mass plus +0.1 per distinct sequencing
/// keyword, capped at 1.0.
fn complexity_estimate(haystack: &str, tokens: u64) -> f64 {
    let base = (tokens as f64 / 400.0).min(1.0);
    let boosts = SEQUENCE_KEYWORDS
        .iter()
        .filter(|keyword| contains_word(haystack, keyword))
        .count() as f64
        * 0.1;
    (base + boosts).min(1.0)
}

/// Word-boundary containment, so "and" does not match "command".
fn contains_word(haystack: &str, word: &str) -> bool {
    haystack
        .split(|c: char| !c.is_alphanumeric())
        .any(|w| w == word)
}

/// Short identifier for audit records, derived from the work description.
fn content_preview(content: &str) -> String {
    content.trim().chars().take(60).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{CompletionClient, CompletionResponse, ProviderError, TokenUsage};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct FixedClient {
        response: Result<String, ProviderError>,
    }

    #[async_trait]
    impl CompletionClient for FixedClient {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            self.response
                .clone()
                .map(|text| CompletionResponse {
                    text,
                    usage: TokenUsage::default(),
                })
        }
    }

    fn checker() -> AtomicityChecker {
        AtomicityChecker::heuristic_only(AtomicityConfig::default())
    }

    #[tokio::test]
    async fn empty_content_is_a_validation_error() {
        let result = checker().check_atomicity("   ", &[]).await;
        assert!(matches!(result, Err(EvalError::Validation(_))));
    }

    #[tokio::test]
    async fn short_simple_task_is_atomic() {
        let result = checker()
            .check_atomicity("Rename the struct field", &[])
            .await
            .unwrap();
        assert!(result.is_atomic);
        assert_eq!(result.method, AtomicityMethod::Heuristic);
    }

    #[tokio::test]
    async fn keyword_heavy_task_is_not_atomic() {
        let content = "Create the database schema and then expose an api, and also \
                       build the docker image, deploy it to the network, and after \
                       that run the test suite against the cache and queue layers, \
                       finally commit everything to git";
        let result = checker().check_atomicity(content, &[]).await.unwrap();
        assert!(!result.is_atomic);
        assert!(result.tool_count >= AtomicityConfig::default().max_tool_count);
    }

    #[tokio::test]
    async fn heuristic_is_deterministic() {
        let content = "Implement the parser and then wire it into the api";
        let criteria = vec!["parses all fixtures".to_string()];
        let first = checker().check_atomicity(content, &criteria).await.unwrap();
        let second = checker().check_atomicity(content, &criteria).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn criteria_contribute_tool_keywords() {
        let without = checker()
            .check_atomicity("Refactor the module", &[])
            .await
            .unwrap();
        let with = checker()
            .check_atomicity(
                "Refactor the module",
                &["database migration applied".to_string(), "api contract stable".to_string()],
            )
            .await
            .unwrap();
        assert!(with.tool_count > without.tool_count);
    }

    #[test]
    fn word_boundaries_prevent_substring_matches() {
        assert!(contains_word("run the test suite", "test"));
        assert!(!contains_word("use the command pattern", "and"));
        assert!(!contains_word("rapidly iterate", "api"));
    }

    #[test]
    fn complexity_boosts_are_capped() {
        let text = "and then multiple also after before finally and then";
        let score = complexity_estimate(text, 10_000);
        assert_eq!(score, 1.0);
    }

    #[tokio::test]
    async fn llm_claim_is_overridden_by_thresholds() {
        // The model says atomic, but its own numbers exceed every threshold.
        let client: SharedCompletionClient = Arc::new(FixedClient {
            response: Ok(r#"{"is_atomic": true, "complexity_score": 0.9,
                             "tool_count": 6, "estimated_duration_seconds": 4000,
                             "reasoning": "feels easy"}"#
                .to_string()),
        });
        let checker = AtomicityChecker::with_client(client, AtomicityConfig::default());
        let result = checker.check_atomicity("Build the platform", &[]).await.unwrap();
        assert_eq!(result.method, AtomicityMethod::Llm);
        assert!(!result.is_atomic);
    }

    #[tokio::test]
    async fn llm_agreement_within_thresholds_is_atomic() {
        let client: SharedCompletionClient = Arc::new(FixedClient {
            response: Ok(r#"{"is_atomic": true, "complexity_score": 0.2,
                             "tool_count": 1, "estimated_duration_seconds": 90,
                             "reasoning": "single edit"}"#
                .to_string()),
        });
        let checker = AtomicityChecker::with_client(client, AtomicityConfig::default());
        let result = checker.check_atomicity("Fix the typo", &[]).await.unwrap();
        assert!(result.is_atomic);
        assert_eq!(result.method, AtomicityMethod::Llm);
    }

    #[tokio::test]
    async fn provider_failure_falls_back_to_heuristic() {
        let client: SharedCompletionClient = Arc::new(FixedClient {
            response: Err(ProviderError::Timeout),
        });
        let checker = AtomicityChecker::with_client(client, AtomicityConfig::default());
        let result = checker.check_atomicity("Fix the typo", &[]).await.unwrap();
        assert_eq!(result.method, AtomicityMethod::HeuristicFallback);
        assert!(result.is_atomic);
    }

    #[tokio::test]
    async fn unparsable_response_falls_back_to_heuristic() {
        let client: SharedCompletionClient = Arc::new(FixedClient {
            response: Ok("I would rather not say.".to_string()),
        });
        let checker = AtomicityChecker::with_client(client, AtomicityConfig::default());
        let result = checker.check_atomicity("Fix the typo", &[]).await.unwrap();
        assert_eq!(result.method, AtomicityMethod::HeuristicFallback);
    }

    #[tokio::test]
    async fn every_check_emits_an_audit_event() {
        let sink = Arc::new(crate::events::MemorySink::new());
        let checker =
            AtomicityChecker::heuristic_only(AtomicityConfig::default()).with_sink(sink.clone());
        checker.check_atomicity("Fix the typo", &[]).await.unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event_type, names::ATOMICITY_CHECKED);
        assert_eq!(records[0].aggregate_id, "Fix the typo");
        assert_eq!(records[0].data["method"], "heuristic");
    }

    #[test]
    fn atomicity_result_round_trips_through_json() {
        let result = AtomicityResult {
            is_atomic: true,
            complexity_score: 0.3,
            tool_count: 1,
            estimated_duration_seconds: 120,
            reasoning: "small".to_string(),
            method: AtomicityMethod::Heuristic,
        };
        let encoded = serde_json::to_string(&result).unwrap();
        let decoded: AtomicityResult = serde_json::from_str(&encoded).unwrap();
        assert_eq!(result, decoded);
    }
}
