//! Chat-completion clients used by pipeline stages.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::config::{AgentsConfig, Provider};
use crate::error::VeloderError;
use crate::security::SecretValue;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// One system + user exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<String, VeloderError>;
}

pub type DynModel = Arc<dyn LanguageModel>;

fn http_client() -> Result<Client, VeloderError> {
    Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .map_err(|e| VeloderError::Http(format!("failed to build HTTP client: {e}")))
}

async fn read_json(response: reqwest::Response, provider: &str) -> Result<Value, VeloderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(VeloderError::Model(format!(
            "{provider} returned HTTP {status}: {}",
            body.trim()
        )));
    }
    response
        .json::<Value>()
        .await
        .map_err(|e| {
            VeloderError::Model(format!(
                "{provider} sent an undecodable body: {}",
                e.without_url()
            ))
        })
}

/// Google Gemini `generateContent`.
pub struct GeminiModel {
    http: Client,
    api_key: SecretValue,
    base_url: String,
    model: String,
}

impl GeminiModel {
    pub fn new(
        api_key: SecretValue,
        model: impl Into<String>,
        base_url: Option<String>,
    ) -> Result<Self, VeloderError> {
        Ok(Self {
            http: http_client()?,
            api_key,
            base_url: base_url
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl LanguageModel for GeminiModel {
    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(name = "llm.gemini", skip_all, fields(model = %self.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<String, VeloderError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let payload = json!({
            "systemInstruction": { "parts": [{ "text": request.system }] },
            "contents": [{ "role": "user", "parts": [{ "text": request.prompt }] }],
            "generationConfig": { "temperature": request.temperature },
        });

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", self.api_key.expose())
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                VeloderError::Model(format!("failed to reach Gemini: {}", e.without_url()))
            })?;
        let body = read_json(response, "Gemini").await?;

        let text = body["candidates"][0]["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| part["text"].as_str())
                    .collect::<String>()
            })
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(VeloderError::Model("Gemini returned no text".into()));
        }
        debug!(chars = text.len(), "completion received");
        Ok(text)
    }
}

/// OpenAI-compatible `chat/completions`.
pub struct OpenAiModel {
    http: Client,
    api_key: SecretValue,
    base_url: String,
    model: String,
}

impl OpenAiModel {
    pub fn new(
        api_key: SecretValue,
        model: impl Into<String>,
        base_url: Option<String>,
    ) -> Result<Self, VeloderError> {
        Ok(Self {
            http: http_client()?,
            api_key,
            base_url: base_url
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(name = "llm.openai", skip_all, fields(model = %self.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<String, VeloderError> {
        let payload = json!({
            "model": self.model,
            "temperature": request.temperature,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.prompt }
            ]
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose())
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                VeloderError::Model(format!("failed to reach OpenAI: {}", e.without_url()))
            })?;
        let body = read_json(response, "OpenAI").await?;

        let text = body["choices"][0]["message"]["content"]
            .as_str()
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| VeloderError::Model("OpenAI returned no content".into()))?;
        debug!(chars = text.len(), "completion received");
        Ok(text.to_string())
    }
}

/// Client for the configured provider.
pub fn build_model(agents: &AgentsConfig, api_key: SecretValue) -> Result<DynModel, VeloderError> {
    let base_url = agents.base_url.clone();
    Ok(match agents.provider {
        Provider::Gemini => Arc::new(GeminiModel::new(api_key, &agents.model, base_url)?),
        Provider::Openai => Arc::new(OpenAiModel::new(api_key, &agents.model, base_url)?),
    })
}
