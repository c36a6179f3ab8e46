//! A provider backed by any OpenAI-compatible chat completions endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;
use url::Url;

use crate::{
    config::ProviderConfig,
    debates::DebateContext,
    provider::{
        JudgeProvider, JudgeResponse, ProviderError, RESPONSE_FORMAT,
        parse_judge_response,
    },
};

pub struct ChatCompletionsProvider {
    client: reqwest::Client,
    endpoint: Url,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl ChatCompletionsProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone().unwrap_or_default(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    async fn chat(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ProviderError> {
        let request_body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt}
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature
        });

        let mut request =
            self.client.post(self.endpoint.clone()).json(&request_body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status, body });
        }

        let resp_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let content = resp_json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .trim()
            .to_string();

        if content.is_empty() {
            return Err(ProviderError::Empty);
        }

        debug!(model = %self.model, chars = content.len(), "chat completion");

        Ok(content)
    }
}

#[async_trait]
impl JudgeProvider for ChatCompletionsProvider {
    async fn judge(
        &self,
        system_prompt: &str,
        context: &DebateContext,
    ) -> Result<JudgeResponse, ProviderError> {
        let system_prompt = format!("{system_prompt}\n\n{RESPONSE_FORMAT}");
        let content = self.chat(&system_prompt, &context.transcript()).await?;
        parse_judge_response(&content)
    }

    async fn complete(
        &self,
        system_prompt: &str,
        prompt: &str,
    ) -> Result<String, ProviderError> {
        self.chat(system_prompt, prompt).await
    }
}
