//! Semantic analysis of extracted document text.
//!
//! Four independent queries are issued per document (fraud, spelling,
//! classification, summary). The call is all-or-nothing: one failed query
//! fails the whole analysis. The same endpoint also answers free-form chat
//! questions about an analyzed document.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AnalysisError;

pub mod prompts;

pub const UNKNOWN_DOCUMENT_TYPE: &str = "Unknown";

const CLASSIFICATION_MAX_TOKENS: u32 = 512;
const CHAT_MAX_TOKENS: u32 = 1024;
const CHAT_TEMPERATURE: f32 = 0.4;
const NO_ANSWER: &str = "(No answer returned)";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub fraud_sentences: Vec<String>,
    pub mistake_words: Vec<String>,
    pub document_type: String,
    pub document_summary: String,
}

/// One answer from the chat endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, text: &str) -> Result<AnalysisReport, AnalysisError>;

    /// Answers a fully rendered chat prompt.
    async fn chat(&self, prompt: &str) -> Result<ChatReply, AnalysisError>;
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub endpoint: String,
    pub timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Chat-completion endpoint accepting `{prompt, max_tokens, temperature}`.
pub struct LlmAnalyzer {
    settings: LlmSettings,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default, alias = "answer")]
    response: String,
    #[serde(default)]
    model: Option<String>,
}

impl LlmAnalyzer {
    pub fn new(mut settings: LlmSettings) -> Result<Self, AnalysisError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| AnalysisError::Request {
                query: "client",
                message: format!("Failed to create HTTP client: {}", e),
            })?;
        settings.endpoint = settings.endpoint.trim_end_matches('/').to_string();

        Ok(Self { settings, client })
    }

    async fn query(&self, query: &'static str, prompt: &str, max_tokens: u32) -> Result<String, AnalysisError> {
        let body = self
            .send(query, prompt, max_tokens, self.settings.temperature)
            .await?;
        Ok(body.response.trim().to_string())
    }

    async fn send(
        &self,
        query: &'static str,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<ChatResponse, AnalysisError> {
        debug!(query, "Sending analysis query");
        let url = format!("{}/chat", self.settings.endpoint);
        let resp = self
            .client
            .post(&url)
            .json(&ChatRequest {
                prompt,
                max_tokens,
                temperature,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AnalysisError::Timeout {
                        secs: self.settings.timeout.as_secs(),
                    }
                } else {
                    AnalysisError::Request {
                        query,
                        message: e.to_string(),
                    }
                }
            })?;

        if !resp.status().is_success() {
            return Err(AnalysisError::Request {
                query,
                message: format!("HTTP {}", resp.status()),
            });
        }

        resp.json::<ChatResponse>()
            .await
            .map_err(|e| AnalysisError::MalformedResponse {
                query,
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl Analyzer for LlmAnalyzer {
    async fn analyze(&self, text: &str) -> Result<AnalysisReport, AnalysisError> {
        let max_tokens = self.settings.max_tokens;

        let fraud = self
            .query("fraud", &prompts::render(prompts::FRAUD, text), max_tokens)
            .await?;
        let spelling = self
            .query("spelling", &prompts::render(prompts::SPELLING, text), max_tokens)
            .await?;
        let classification = self
            .query(
                "classification",
                &prompts::render(prompts::CLASSIFICATION, text),
                max_tokens.min(CLASSIFICATION_MAX_TOKENS),
            )
            .await?;
        let summary = self
            .query("summary", &prompts::render(prompts::SUMMARY, text), max_tokens)
            .await?;

        Ok(AnalysisReport {
            fraud_sentences: split_list(&fraud),
            mistake_words: split_list(&spelling),
            document_type: document_type(&classification),
            document_summary: summary,
        })
    }

    async fn chat(&self, prompt: &str) -> Result<ChatReply, AnalysisError> {
        let body = self
            .send("chat", prompt, CHAT_MAX_TOKENS, CHAT_TEMPERATURE)
            .await?;
        let answer = body.response.trim();
        Ok(ChatReply {
            answer: if answer.is_empty() {
                NO_ANSWER.to_string()
            } else {
                answer.to_string()
            },
            model: body.model,
        })
    }
}

/// `a; b;; c ` → `["a", "b", "c"]`
pub fn split_list(reply: &str) -> Vec<String> {
    reply
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn document_type(reply: &str) -> String {
    let trimmed = reply.trim().trim_matches('"').trim();
    if trimmed.is_empty() {
        UNKNOWN_DOCUMENT_TYPE.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Deterministic report for stub mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubAnalyzer;

#[async_trait]
impl Analyzer for StubAnalyzer {
    async fn analyze(&self, text: &str) -> Result<AnalysisReport, AnalysisError> {
        let words = text.split_whitespace().count();
        Ok(AnalysisReport {
            fraud_sentences: Vec::new(),
            mistake_words: Vec::new(),
            document_type: UNKNOWN_DOCUMENT_TYPE.to_string(),
            document_summary: format!("Document with {} words.", words),
        })
    }

    /// Echoes the user question back, cut to 200 characters.
    async fn chat(&self, prompt: &str) -> Result<ChatReply, AnalysisError> {
        let question = prompt
            .rsplit_once(prompts::USER_QUESTION)
            .map(|(_, q)| q)
            .unwrap_or(prompt)
            .trim();
        Ok(ChatReply {
            answer: format!("(stub) {}", question.chars().take(200).collect::<String>()),
            model: Some("stub".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list_trims_and_drops_empties() {
        assert_eq!(split_list(" a ; b;; c "), vec!["a", "b", "c"]);
        assert!(split_list("").is_empty());
        assert!(split_list(" ; ").is_empty());
    }

    #[test]
    fn test_document_type_defaults_to_unknown() {
        assert_eq!(document_type("  "), UNKNOWN_DOCUMENT_TYPE);
        assert_eq!(document_type("\"Contract\"\n"), "Contract");
    }

    #[test]
    fn test_prompt_render_inserts_text() {
        let prompt = prompts::render(prompts::FRAUD, "pay to offshore account");
        assert!(prompt.contains("pay to offshore account"));
        assert!(!prompt.contains("{text}"));
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let value = serde_json::to_value(AnalysisReport::default()).unwrap();
        assert!(value.get("fraudSentences").is_some());
        assert!(value.get("documentSummary").is_some());
    }

    #[test]
    fn test_chat_response_missing_field_is_empty() {
        let body: ChatResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(body.response, "");
        assert!(body.model.is_none());
    }

    #[test]
    fn test_chat_response_accepts_answer_field() {
        let body: ChatResponse =
            serde_json::from_str(r#"{"answer": "Looks fine.", "model": "llama"}"#).unwrap();
        assert_eq!(body.response, "Looks fine.");
        assert_eq!(body.model.as_deref(), Some("llama"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_fails_first_query() {
        let analyzer = LlmAnalyzer::new(LlmSettings {
            endpoint: "http://127.0.0.1:9/".to_string(),
            timeout: Duration::from_secs(2),
            max_tokens: 16,
            temperature: 0.3,
        })
        .unwrap();
        let err = analyzer.analyze("text").await.unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Request { query: "fraud", .. } | AnalysisError::Timeout { .. }
        ));
    }

    #[tokio::test]
    async fn test_stub_analyzer() {
        let report = StubAnalyzer.analyze("one two three").await.unwrap();
        assert_eq!(report.document_type, UNKNOWN_DOCUMENT_TYPE);
        assert_eq!(report.document_summary, "Document with 3 words.");
    }

    #[tokio::test]
    async fn test_stub_chat_echoes_question() {
        let prompt = format!("Document type: Invoice{}Is it signed?", prompts::USER_QUESTION);
        let reply = StubAnalyzer.chat(&prompt).await.unwrap();
        assert_eq!(reply.answer, "(stub) Is it signed?");
        assert_eq!(reply.model.as_deref(), Some("stub"));
    }
}
