//! Remote text services used on selected document text.
//!
//! Each call runs on its own tokio task and completes with a single
//! `Result<String, ServiceError>` through the returned [`JoinHandle`].

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

pub mod error;
pub mod summarize;
pub mod translate;

#[cfg(test)]
mod testing;

pub use error::{Result, Service, ServiceError};
pub use summarize::{
    prompt, GeminiSummarizer, SummarizeConfig, SummarizeRequest, Summarizer, SummaryType,
    DEFAULT_GEMINI_MODEL, MAX_SUMMARY_CHARS,
};
pub use translate::{
    MyMemoryTranslator, TranslateConfig, TranslateRequest, Translator, LANGUAGES,
    MAX_TRANSLATE_CHARS,
};

pub fn spawn_translate(
    translator: Arc<dyn Translator>,
    request: TranslateRequest,
) -> JoinHandle<Result<String>> {
    tokio::spawn(async move {
        let result = translator.translate(&request).await;
        match &result {
            Ok(_) => info!(langpair = %request.langpair(), "translation finished"),
            Err(err) => warn!(%err, langpair = %request.langpair(), "translation failed"),
        }
        result
    })
}

pub fn spawn_summarize(
    summarizer: Arc<dyn Summarizer>,
    request: SummarizeRequest,
) -> JoinHandle<Result<String>> {
    tokio::spawn(async move {
        let result = summarizer.summarize(&request).await;
        match &result {
            Ok(_) => info!(kind = %request.summary_type(), "summary finished"),
            Err(err) => warn!(%err, kind = %request.summary_type(), "summary failed"),
        }
        result
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl Translator for Echo {
        async fn translate(&self, request: &TranslateRequest) -> Result<String> {
            Ok(request.text().to_uppercase())
        }
    }

    struct Silent;

    #[async_trait]
    impl Summarizer for Silent {
        async fn summarize(&self, _request: &SummarizeRequest) -> Result<String> {
            Err(ServiceError::Payload("No response from Gemini".to_string()))
        }
    }

    #[tokio::test]
    async fn spawned_translation_delivers_result() {
        let request = TranslateRequest::new("hello", "en", "fr").unwrap();
        let handle = spawn_translate(Arc::new(Echo), request);
        assert_eq!(handle.await.unwrap().unwrap(), "HELLO");
    }

    #[tokio::test]
    async fn spawned_summary_delivers_error() {
        let request = SummarizeRequest::new("text", SummaryType::Bullet, "en").unwrap();
        let handle = spawn_summarize(Arc::new(Silent), request);
        assert_eq!(
            handle.await.unwrap().unwrap_err().to_string(),
            "No response from Gemini"
        );
    }
}
