//! OpenAI-compatible chat completions client (Groq, OpenAI, LM Studio...).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::provider::Generator;
use super::types::GenerationRequest;
use crate::config::Settings;
use crate::errors::ApiError;

#[derive(Clone)]
pub struct OpenAiCompatGenerator {
    base_url: String,
    api_key: Option<String>,
    model: String,
    client: Client,
}

impl OpenAiCompatGenerator {
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.generator_base_url.clone(),
            settings.generator_api_key.clone(),
            settings.generator_model.clone(),
            settings.external_call_timeout_secs,
        )
    }

    pub fn new(
        base_url: String,
        api_key: Option<String>,
        model: String,
        timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            client,
        }
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, url);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }
}

#[async_trait]
impl Generator for OpenAiCompatGenerator {
    fn name(&self) -> &str {
        "openai_compat"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some() && !self.model.is_empty()
    }

    async fn health_check(&self) -> Result<bool, ApiError> {
        if !self.is_configured() {
            return Ok(false);
        }

        let url = format!("{}/v1/models", self.base_url);
        match self.request(reqwest::Method::GET, &url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, ApiError> {
        if !self.is_configured() {
            return Err(ApiError::ServiceUnavailable);
        }

        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": request.messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "top_p": request.top_p,
            "stream": false,
        });

        let res = self
            .request(reqwest::Method::POST, &url)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!(
                "chat completion failed ({}): {}",
                status, text
            )));
        }

        let payload: Value = res.json().await.map_err(ApiError::internal)?;
        extract_content(&payload)
    }
}

/// Pull the top completion's text out of a chat-completions payload.
///
/// A response without `choices[0].message.content`, or with only
/// whitespace there, is a failed generation, not an empty answer.
fn extract_content(payload: &Value) -> Result<String, ApiError> {
    let content = payload["choices"][0]["message"]["content"]
        .as_str()
        .map(str::trim)
        .ok_or_else(|| {
            ApiError::Internal("chat completion response had no content".to_string())
        })?;

    if content.is_empty() {
        return Err(ApiError::Internal(
            "chat completion response content was empty".to_string(),
        ));
    }

    Ok(content.to_string())
}
