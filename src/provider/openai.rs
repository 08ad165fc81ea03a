//! OpenAI-compatible adapter: bearer-token auth, `chat/completions` route.

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::capture::CapturedContext;
use crate::config::ProviderConfig;
use crate::error::{Error, ErrorCode};

use super::{Provider, Suggestion, http_client, join_endpoint, map_status, send_with_verb_fallback};

pub struct OpenAiAdapter {
    config: ProviderConfig,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiAdapter {
    pub fn new(config: ProviderConfig, api_key: String) -> Result<Self, Error> {
        Ok(Self {
            client: http_client()?,
            config,
            api_key,
        })
    }

    fn chat_url(&self) -> String {
        join_endpoint(&self.config.api_endpoint, "chat/completions", self.config.omit_v1_prefix)
    }

    fn models_url(&self) -> String {
        join_endpoint(&self.config.api_endpoint, "models", self.config.omit_v1_prefix)
    }

    async fn chat(&self, system: &str, user: &str, cancel: &CancellationToken) -> Result<String, Error> {
        let body = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });

        let request = self
            .client
            .post(self.chat_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send();

        let response = tokio::select! {
            result = request => result?,
            _ = cancel.cancelled() => {
                return Err(Error::new(ErrorCode::UserCancel, "request cancelled"));
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(map_status(status, &text));
        }

        let payload: serde_json::Value = response.json().await?;
        payload
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                Error::new(ErrorCode::ProviderResponse, "response missing choices[0].message.content")
                    .with_context("raw", payload)
            })
    }
}

#[async_trait]
impl Provider for OpenAiAdapter {
    async fn get_suggestion(
        &self,
        captured: &CapturedContext,
        language: &str,
        cancel: &CancellationToken,
    ) -> Result<Suggestion, Error> {
        let (system, user) = super::generic_chat::suggestion_prompt(captured, language);
        let text = self.chat(&system, &user, cancel).await?;
        super::generic_chat::parse_suggestion(&text)
    }

    async fn generate_command(&self, prompt: &str, language: &str, cancel: &CancellationToken) -> Result<String, Error> {
        let (system, user) = super::generic_chat::command_prompt(prompt, language);
        let text = self.chat(&system, &user, cancel).await?;
        super::generic_chat::parse_command(&text)
    }

    async fn verify_connection(&self, cancel: &CancellationToken) -> Result<Vec<String>, Error> {
        self.get_available_models(cancel).await
    }

    async fn get_available_models(&self, cancel: &CancellationToken) -> Result<Vec<String>, Error> {
        let url = self.models_url();
        let response = send_with_verb_fallback(reqwest::Method::GET, cancel, |method| {
            self.client.request(method, &url).bearer_auth(&self.api_key)
        })
        .await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(map_status(status, &text));
        }
        let payload: serde_json::Value = response.json().await?;
        let mut models: Vec<String> = payload
            .get("data")
            .and_then(|d| d.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m.get("id").and_then(|i| i.as_str()).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        models.sort();
        models.dedup();
        Ok(models)
    }
}
