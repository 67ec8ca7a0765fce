use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ExtractError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// A named JSON Schema the service must conform to.
#[derive(Debug, Clone)]
pub struct OutputSchema {
    pub name: &'static str,
    pub schema: Value,
}

/// Text-generation service constrained to a declared output schema.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        schema: &OutputSchema,
        temperature: f32,
    ) -> Result<Value, ExtractError>;
}

pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: String, model: String, base_url: String) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()?,
            api_key,
            model,
            base_url,
        })
    }

    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else {
            format!("{}/chat/completions", base)
        }
    }

    fn payload(&self, prompt: &str, schema: &OutputSchema, temperature: f32) -> Value {
        json!({
            "model": self.model,
            "messages": [
                { "role": "user", "content": prompt }
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "strict": true,
                    "schema": schema.schema,
                }
            },
            "temperature": temperature,
        })
    }
}

#[async_trait]
impl CompletionService for OpenAiClient {
    async fn complete(
        &self,
        prompt: &str,
        schema: &OutputSchema,
        temperature: f32,
    ) -> Result<Value, ExtractError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| ExtractError::Service(format!("invalid api key header: {}", e)))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        debug!(schema = schema.name, model = %self.model, "requesting structured completion");
        let response = self
            .client
            .post(self.endpoint())
            .headers(headers)
            .json(&self.payload(prompt, schema, temperature))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ExtractError::Service(format!("{}: {}", status, text)));
        }

        let body: Value = serde_json::from_str(&text)
            .map_err(|e| ExtractError::Service(format!("unreadable completion body: {}", e)))?;
        parse_completion(&body)
    }
}

/// Pulls the structured object out of a chat completion body.
pub fn parse_completion(body: &Value) -> Result<Value, ExtractError> {
    let choice = body["choices"]
        .get(0)
        .ok_or_else(|| ExtractError::Schema("completion has no choices".into()))?;

    if let Some(refusal) = choice["message"]["refusal"].as_str() {
        return Err(ExtractError::Schema(format!("model refused: {}", refusal)));
    }
    if choice["finish_reason"].as_str() == Some("length") {
        return Err(ExtractError::Schema("output truncated before schema was complete".into()));
    }

    let content = choice["message"]["content"]
        .as_str()
        .ok_or_else(|| ExtractError::Schema("completion has no content".into()))?;
    serde_json::from_str(content)
        .map_err(|e| ExtractError::Schema(format!("content is not valid json: {}", e)))
}
