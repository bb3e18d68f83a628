//! Summaries generated by Gemini over its REST `generateContent` endpoint.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument};
use url::Url;

use crate::error::{Result, Service, ServiceError};

pub const MAX_SUMMARY_CHARS: usize = 100_000;
pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_SUMMARY_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryType {
    #[default]
    Brief,
    Detailed,
    Bullet,
    KeyPoints,
}

impl SummaryType {
    pub const ALL: [SummaryType; 4] = [
        SummaryType::Brief,
        SummaryType::Detailed,
        SummaryType::Bullet,
        SummaryType::KeyPoints,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryType::Brief => "brief",
            SummaryType::Detailed => "detailed",
            SummaryType::Bullet => "bullet",
            SummaryType::KeyPoints => "key_points",
        }
    }

    fn instruction(&self, language: &str) -> Option<&'static str> {
        let text = match (self, language) {
            (SummaryType::Brief, "en") => "Summarize the following text briefly in a few sentences:",
            (SummaryType::Brief, "vi") => "Tóm tắt ngắn gọn văn bản sau trong vài câu:",
            (SummaryType::Detailed, "en") => "Provide a detailed summary of the following text, including main points and key details:",
            (SummaryType::Detailed, "vi") => "Tóm tắt chi tiết văn bản sau, bao gồm các điểm chính và chi tiết quan trọng:",
            (SummaryType::Bullet, "en") => "Summarize the following text in bullet points:",
            (SummaryType::Bullet, "vi") => "Tóm tắt văn bản sau dưới dạng danh sách gạch đầu dòng:",
            (SummaryType::KeyPoints, "en") => "Extract the key points from the following text:",
            (SummaryType::KeyPoints, "vi") => "Trích xuất các điểm chính từ văn bản sau:",
            _ => return None,
        };
        Some(text)
    }
}

impl fmt::Display for SummaryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SummaryType {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        SummaryType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| ServiceError::validation(format!("unknown summary type {s:?}")))
    }
}

/// Builds the prompt sent to the model.
///
/// Languages without a template get the brief English prompt.
pub fn prompt(summary_type: SummaryType, language: &str, text: &str) -> String {
    let instruction = summary_type
        .instruction(language)
        .or_else(|| SummaryType::Brief.instruction("en"))
        .unwrap_or_default();
    format!("{instruction}\n\n{text}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummarizeRequest {
    text: String,
    summary_type: SummaryType,
    language: String,
}

impl SummarizeRequest {
    pub fn new(
        text: impl AsRef<str>,
        summary_type: SummaryType,
        language: impl Into<String>,
    ) -> Result<Self> {
        let text = text.as_ref();
        if text.trim().is_empty() {
            return Err(ServiceError::validation("No text found to summarize!"));
        }
        let chars = text.chars().count();
        if chars > MAX_SUMMARY_CHARS {
            return Err(ServiceError::validation(format!(
                "Text too long! Please select fewer pages. Current length: {chars} characters, maximum: {MAX_SUMMARY_CHARS} characters"
            )));
        }
        Ok(Self {
            text: text.to_string(),
            summary_type,
            language: language.into(),
        })
    }

    pub fn summary_type(&self) -> SummaryType {
        self.summary_type
    }

    pub fn prompt(&self) -> String {
        prompt(self.summary_type, &self.language, &self.text)
    }
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, request: &SummarizeRequest) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizeConfig {
    pub endpoint: String,
    pub model: String,
    pub timeout_secs: u64,
    pub api_key: Option<String>,
}

impl Default for SummarizeConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_GEMINI_ENDPOINT.to_string(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            timeout_secs: DEFAULT_SUMMARY_TIMEOUT_SECS,
            api_key: None,
        }
    }
}

pub struct GeminiSummarizer {
    client: reqwest::Client,
    url: Url,
    api_key: String,
}

impl GeminiSummarizer {
    pub fn new(endpoint: &str, model: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(ServiceError::validation("Please enter your Gemini API key!"));
        }
        let raw = format!(
            "{}/models/{}:generateContent",
            endpoint.trim_end_matches('/'),
            model
        );
        let url = Url::parse(&raw).map_err(|err| {
            ServiceError::validation(format!("invalid summarization endpoint {raw:?}: {err}"))
        })?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ServiceError::from_reqwest(Service::Summarization, err))?;
        Ok(Self {
            client,
            url,
            api_key: api_key.to_string(),
        })
    }

    pub fn from_config(config: &SummarizeConfig) -> Result<Self> {
        Self::new(
            &config.endpoint,
            &config.model,
            config.api_key.as_deref().unwrap_or_default(),
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[async_trait]
impl Summarizer for GeminiSummarizer {
    #[instrument(skip_all, fields(kind = %request.summary_type, chars = request.text.len()))]
    async fn summarize(&self, request: &SummarizeRequest) -> Result<String> {
        let body = json!({
            "contents": [{ "parts": [{ "text": request.prompt() }] }]
        });
        let response = self
            .client
            .post(self.url.clone())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| ServiceError::from_reqwest(Service::Summarization, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Http(status.as_u16()));
        }
        let reply: GenerateContentResponse = response
            .json()
            .await
            .map_err(|err| ServiceError::from_reqwest(Service::Summarization, err))?;
        let summary = reply.text();
        if summary.is_empty() {
            return Err(ServiceError::Payload("No response from Gemini".to_string()));
        }
        debug!(chars = summary.len(), "summary received");
        Ok(summary)
    }
}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Text of the first candidate, trimmed.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|part| part.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
            .trim()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{serve_once, serve_silence};

    fn summarizer(base: &str, timeout: Duration) -> GeminiSummarizer {
        GeminiSummarizer::new(base, DEFAULT_GEMINI_MODEL, "test-key", timeout).unwrap()
    }

    #[test]
    fn prompts_follow_type_and_language() {
        assert_eq!(
            prompt(SummaryType::Bullet, "en", "body"),
            "Summarize the following text in bullet points:\n\nbody"
        );
        assert!(prompt(SummaryType::KeyPoints, "vi", "x").starts_with("Trích xuất"));
    }

    #[test]
    fn unknown_language_falls_back_to_brief_english() {
        assert_eq!(
            prompt(SummaryType::Detailed, "fr", "body"),
            prompt(SummaryType::Brief, "en", "body")
        );
    }

    #[test]
    fn summary_type_parses_labels() {
        assert_eq!("key_points".parse::<SummaryType>().unwrap(), SummaryType::KeyPoints);
        assert_eq!("Key-Points".parse::<SummaryType>().unwrap(), SummaryType::KeyPoints);
        assert!("essay".parse::<SummaryType>().is_err());
        for kind in SummaryType::ALL {
            assert_eq!(kind.to_string().parse::<SummaryType>().unwrap(), kind);
        }
    }

    #[test]
    fn request_limits_text() {
        assert!(SummarizeRequest::new(" \n", SummaryType::Brief, "en").is_err());
        let long = "a".repeat(MAX_SUMMARY_CHARS + 1);
        assert!(SummarizeRequest::new(long, SummaryType::Brief, "en").is_err());
        assert!(SummarizeRequest::new("a".repeat(MAX_SUMMARY_CHARS), SummaryType::Brief, "en").is_ok());
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let config = SummarizeConfig::default();
        assert!(matches!(
            GeminiSummarizer::from_config(&config),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn reply_text_joins_parts_of_first_candidate() {
        let reply: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"  One "},{"text":"two\n"}]}},{"content":{"parts":[{"text":"ignored"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(reply.text(), "One two");
        assert_eq!(GenerateContentResponse::default().text(), "");
    }

    #[tokio::test]
    async fn summary_is_trimmed_first_candidate() {
        let (base, request) = serve_once(
            200,
            r#"{"candidates":[{"content":{"parts":[{"text":"\n A short summary. \n"}],"role":"model"}}]}"#,
        )
        .await;
        let req = SummarizeRequest::new("Long text", SummaryType::Brief, "en").unwrap();
        let summary = summarizer(&base, Duration::from_secs(5))
            .summarize(&req)
            .await
            .unwrap();
        assert_eq!(summary, "A short summary.");

        let captured = request.await.unwrap();
        assert!(captured
            .head
            .starts_with("POST /models/gemini-3-flash-preview:generateContent"));
        assert!(captured.head.to_ascii_lowercase().contains("x-goog-api-key: test-key"));
        let sent: serde_json::Value = serde_json::from_str(&captured.body).unwrap();
        assert_eq!(
            sent["contents"][0]["parts"][0]["text"],
            "Summarize the following text briefly in a few sentences:\n\nLong text"
        );
    }

    #[tokio::test]
    async fn empty_reply_is_an_error() {
        let (base, _request) = serve_once(200, r#"{"candidates":[]}"#).await;
        let req = SummarizeRequest::new("Long text", SummaryType::Detailed, "vi").unwrap();
        let err = summarizer(&base, Duration::from_secs(5))
            .summarize(&req)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No response from Gemini");
    }

    #[tokio::test]
    async fn rejected_key_reports_status() {
        let (base, _request) =
            serve_once(400, r#"{"error":{"code":400,"message":"API key not valid"}}"#).await;
        let req = SummarizeRequest::new("Long text", SummaryType::Brief, "en").unwrap();
        assert_eq!(
            summarizer(&base, Duration::from_secs(5)).summarize(&req).await,
            Err(ServiceError::Http(400))
        );
    }

    #[tokio::test]
    async fn slow_model_times_out() {
        let base = serve_silence().await;
        let req = SummarizeRequest::new("Long text", SummaryType::Brief, "en").unwrap();
        assert_eq!(
            summarizer(&base, Duration::from_millis(200)).summarize(&req).await,
            Err(ServiceError::Timeout(Service::Summarization))
        );
    }
}
