//! Translation through the public MyMemory API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use crate::error::{Result, Service, ServiceError};

pub const MAX_TRANSLATE_CHARS: usize = 5000;
pub const DEFAULT_TRANSLATE_ENDPOINT: &str = "https://api.mymemory.translated.net/get";
pub const DEFAULT_TRANSLATE_TIMEOUT_SECS: u64 = 10;

/// Language choices offered to the user, as `(name, code)`.
pub const LANGUAGES: &[(&str, &str)] = &[
    ("English", "en"),
    ("Vietnamese", "vi"),
    ("Chinese (Simplified)", "zh-CN"),
    ("Chinese (Traditional)", "zh-TW"),
    ("Japanese", "ja"),
    ("Korean", "ko"),
    ("French", "fr"),
    ("German", "de"),
    ("Spanish", "es"),
    ("Italian", "it"),
    ("Portuguese", "pt"),
    ("Russian", "ru"),
    ("Arabic", "ar"),
    ("Thai", "th"),
    ("Indonesian", "id"),
    ("Hindi", "hi"),
];

/// A validated translation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslateRequest {
    text: String,
    source: String,
    target: String,
}

impl TranslateRequest {
    pub fn new(
        text: impl AsRef<str>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Result<Self> {
        let text = text.as_ref().trim();
        let (source, target) = (source.into(), target.into());
        if text.is_empty() {
            return Err(ServiceError::validation("Please enter text to translate!"));
        }
        if text.chars().count() > MAX_TRANSLATE_CHARS {
            return Err(ServiceError::validation(format!(
                "Text too long! Maximum {MAX_TRANSLATE_CHARS} characters."
            )));
        }
        if source.trim().is_empty() || target.trim().is_empty() {
            return Err(ServiceError::validation("Both languages must be chosen"));
        }
        if source.eq_ignore_ascii_case(&target) {
            return Err(ServiceError::validation(
                "Source and target languages are the same!",
            ));
        }
        Ok(Self {
            text: text.to_string(),
            source,
            target,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn langpair(&self) -> String {
        format!("{}|{}", self.source, self.target)
    }
}

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, request: &TranslateRequest) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslateConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_TRANSLATE_ENDPOINT.to_string(),
            timeout_secs: DEFAULT_TRANSLATE_TIMEOUT_SECS,
        }
    }
}

pub struct MyMemoryTranslator {
    client: reqwest::Client,
    endpoint: Url,
}

impl MyMemoryTranslator {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(endpoint).map_err(|err| {
            ServiceError::validation(format!("invalid translation endpoint {endpoint:?}: {err}"))
        })?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ServiceError::from_reqwest(Service::Translation, err))?;
        Ok(Self { client, endpoint })
    }

    pub fn from_config(config: &TranslateConfig) -> Result<Self> {
        Self::new(&config.endpoint, Duration::from_secs(config.timeout_secs))
    }
}

#[async_trait]
impl Translator for MyMemoryTranslator {
    #[instrument(skip_all, fields(langpair = %request.langpair(), chars = request.text.len()))]
    async fn translate(&self, request: &TranslateRequest) -> Result<String> {
        let langpair = request.langpair();
        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[("q", request.text()), ("langpair", langpair.as_str())])
            .send()
            .await
            .map_err(|err| ServiceError::from_reqwest(Service::Translation, err))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ServiceError::Http(status.as_u16()));
        }
        let body: MyMemoryResponse = response
            .json()
            .await
            .map_err(|err| ServiceError::from_reqwest(Service::Translation, err))?;
        let translated = body.into_translation()?;
        debug!(chars = translated.len(), "translation received");
        Ok(translated)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MyMemoryResponse {
    #[serde(default)]
    response_status: Value,
    response_data: Option<ResponseData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseData {
    translated_text: Option<String>,
}

impl MyMemoryResponse {
    fn into_translation(self) -> Result<String> {
        // The status arrives as a number on success and sometimes as a string
        // on quota or validation errors.
        let ok = match &self.response_status {
            Value::Number(n) => n.as_u64() == Some(200),
            Value::String(s) => s.trim() == "200",
            _ => false,
        };
        if !ok {
            return Err(ServiceError::Payload("Translation service error".to_string()));
        }
        self.response_data
            .and_then(|data| data.translated_text)
            .ok_or_else(|| ServiceError::Payload("Translation service error".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{serve_once, serve_silence};

    #[test]
    fn request_rejects_bad_input_before_sending() {
        assert!(matches!(
            TranslateRequest::new("   ", "en", "vi"),
            Err(ServiceError::Validation(_))
        ));
        assert_eq!(
            TranslateRequest::new("hello", "en", "en").unwrap_err().to_string(),
            "Source and target languages are the same!"
        );
        let long = "a".repeat(MAX_TRANSLATE_CHARS + 1);
        assert!(TranslateRequest::new(long, "en", "vi").is_err());
        let exact = "ä".repeat(MAX_TRANSLATE_CHARS);
        assert!(TranslateRequest::new(exact, "de", "en").is_ok());
    }

    #[test]
    fn request_trims_text() {
        let request = TranslateRequest::new("  hello \n", "en", "fr").unwrap();
        assert_eq!(request.text(), "hello");
        assert_eq!(request.langpair(), "en|fr");
    }

    #[test]
    fn language_codes_are_unique() {
        let mut codes: Vec<_> = LANGUAGES.iter().map(|(_, code)| *code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), LANGUAGES.len());
    }

    #[test]
    fn string_status_is_accepted() {
        let body: MyMemoryResponse = serde_json::from_str(
            r#"{"responseStatus":"200","responseData":{"translatedText":"xin chào"}}"#,
        )
        .unwrap();
        assert_eq!(body.into_translation().unwrap(), "xin chào");
    }

    #[tokio::test]
    async fn successful_translation_returns_text() {
        let (base, request) = serve_once(
            200,
            r#"{"responseStatus":200,"responseData":{"translatedText":"Bonjour"}}"#,
        )
        .await;
        let translator = MyMemoryTranslator::new(&format!("{base}/get"), Duration::from_secs(5))
            .unwrap();
        let req = TranslateRequest::new("Hello", "en", "fr").unwrap();
        assert_eq!(translator.translate(&req).await.unwrap(), "Bonjour");

        let captured = request.await.unwrap();
        assert!(captured.head.starts_with("GET /get?"));
        assert!(captured.head.contains("q=Hello"));
        assert!(captured.head.contains("langpair=en%7Cfr"));
    }

    #[tokio::test]
    async fn service_level_failure_is_reported() {
        let (base, _request) = serve_once(
            200,
            r#"{"responseStatus":403,"responseData":{"translatedText":"INVALID LANGUAGE PAIR"}}"#,
        )
        .await;
        let translator = MyMemoryTranslator::new(&base, Duration::from_secs(5)).unwrap();
        let req = TranslateRequest::new("Hello", "en", "xx").unwrap();
        assert_eq!(
            translator.translate(&req).await.unwrap_err().to_string(),
            "Translation service error"
        );
    }

    #[tokio::test]
    async fn http_failure_carries_status() {
        let (base, _request) = serve_once(503, "{}").await;
        let translator = MyMemoryTranslator::new(&base, Duration::from_secs(5)).unwrap();
        let req = TranslateRequest::new("Hello", "en", "fr").unwrap();
        assert_eq!(translator.translate(&req).await, Err(ServiceError::Http(503)));
    }

    #[tokio::test]
    async fn slow_service_times_out() {
        let base = serve_silence().await;
        let translator = MyMemoryTranslator::new(&base, Duration::from_millis(200)).unwrap();
        let req = TranslateRequest::new("Hello", "en", "fr").unwrap();
        assert_eq!(
            translator.translate(&req).await,
            Err(ServiceError::Timeout(Service::Translation))
        );
    }

    #[test]
    fn bad_endpoint_is_a_validation_error() {
        assert!(matches!(
            MyMemoryTranslator::new("not a url", Duration::from_secs(1)),
            Err(ServiceError::Validation(_))
        ));
    }
}
