//! Changelog summarization via an OpenAI-compatible chat completions API.
//!
//! - **Endpoint**: `{base_url}/chat/completions` (default `https://api.openai.com/v1`)
//! - **Authentication**: Bearer API key, passed to [`OpenAiClient::new`]
//! - **Debug mode**: [`DebugSummarizer`] returns a fixed marker and never
//!   touches the network

pub mod request;
pub mod response;

pub use request::{ChatMessage, ChatRequest, build_prompt};
pub use response::{ChatResponse, Choice};

use anjin_core::{AppConfig, CollaboratorError, Summarizer, SummaryRequest};
use async_trait::async_trait;
use reqwest::header;

use crate::error::ClientError;
use crate::fetch::FetchClient;

/// Default base URL for the chat completions API.
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Summary returned in debug mode.
pub const DEBUG_SUMMARY: &str = "Debug mode";

/// Summarizer configuration.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self { base_url: DEFAULT_BASE_URL.to_string(), model: "gpt-4o-mini".to_string(), max_tokens: 1024 }
    }
}

impl From<&AppConfig> for OpenAiConfig {
    fn from(config: &AppConfig) -> Self {
        Self { model: config.model.clone(), max_tokens: config.max_summary_tokens, ..Default::default() }
    }
}

/// Chat completions client.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    fetch: FetchClient,
    api_key: String,
    config: OpenAiConfig,
    project_context: Option<String>,
}

impl OpenAiClient {
    /// Create a client with an explicit credential.
    pub fn new(fetch: FetchClient, api_key: impl Into<String>, config: OpenAiConfig) -> Result<Self, ClientError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ClientError::MissingApiKey("ANJIN_OPENAI_API_KEY"));
        }
        Ok(Self { fetch, api_key, config, project_context: None })
    }

    /// Extra project text (e.g. the requirements file) added to every prompt.
    pub fn with_project_context(mut self, context: impl Into<String>) -> Self {
        self.project_context = Some(context.into());
        self
    }

    pub fn chat_request(&self, request: &SummaryRequest) -> ChatRequest {
        ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage::system(request::SYSTEM_PROMPT),
                ChatMessage::user(build_prompt(request, self.project_context.as_deref())),
            ],
            max_tokens: self.config.max_tokens,
        }
    }

    /// Summarize one changelog.
    pub async fn complete(&self, request: &SummaryRequest) -> Result<String, ClientError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let body = self.chat_request(request);

        tracing::debug!(package = %request.package, model = %body.model, "requesting summary");
        let http_request = self
            .fetch
            .post(&url)
            .bearer_auth(&self.api_key)
            .header(header::ACCEPT, "application/json")
            .json(&body);

        let response: ChatResponse = self.fetch.send(http_request).await?.json()?;
        response
            .first_content()
            .map(str::to_string)
            .ok_or_else(|| ClientError::Parse("completion contained no message".to_string()))
    }
}

#[async_trait]
impl Summarizer for OpenAiClient {
    async fn summarize(&self, request: &SummaryRequest) -> Result<String, CollaboratorError> {
        self.complete(request).await.map_err(CollaboratorError::from)
    }
}

/// Summarizer used in debug mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct DebugSummarizer;

#[async_trait]
impl Summarizer for DebugSummarizer {
    async fn summarize(&self, request: &SummaryRequest) -> Result<String, CollaboratorError> {
        tracing::debug!(package = %request.package, "debug mode; skipping summary call");
        Ok(DEBUG_SUMMARY.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchConfig;

    fn fetch() -> FetchClient {
        FetchClient::new(FetchConfig::default()).unwrap()
    }

    fn summary_request() -> SummaryRequest {
        SummaryRequest {
            package: "ruff".into(),
            from_version: "0.4.0".into(),
            to_version: "0.5.0".into(),
            changelog: "## 0.5.0\n- New linter".into(),
            snippets: Vec::new(),
        }
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let result = OpenAiClient::new(fetch(), "  ", OpenAiConfig::default());
        assert!(matches!(result, Err(ClientError::MissingApiKey(_))));
    }

    #[test]
    fn test_config_from_app_config() {
        let app = AppConfig { model: "gpt-4o".into(), max_summary_tokens: 256, ..Default::default() };
        let config = OpenAiConfig::from(&app);
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.max_tokens, 256);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_chat_request_shape() {
        let client = OpenAiClient::new(fetch(), "sk-test", OpenAiConfig::default())
            .unwrap()
            .with_project_context("ruff==0.4.0");
        let body = client.chat_request(&summary_request());
        assert_eq!(body.messages.len(), 2);
        assert_eq!(body.messages[0].role, "system");
        assert!(body.messages[1].content.contains("ruff==0.4.0"));
        assert_eq!(body.max_tokens, 1024);
    }

    #[tokio::test]
    async fn test_debug_summarizer() {
        let summary = DebugSummarizer.summarize(&summary_request()).await.unwrap();
        assert_eq!(summary, "Debug mode");
    }
}
