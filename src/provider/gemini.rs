//! Gemini public REST adapter: API key passed as a query parameter,
//! `models/{model}:generateContent` route, response text spread across
//! `candidates[0].content.parts[*].text`.

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::capture::CapturedContext;
use crate::config::ProviderConfig;
use crate::error::{Error, ErrorCode};

use super::generic_chat::{command_prompt, parse_command, parse_suggestion, suggestion_prompt};
use super::{Provider, Suggestion, http_client, map_status, send_with_verb_fallback};

pub struct GeminiAdapter {
    config: ProviderConfig,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiAdapter {
    pub fn new(config: ProviderConfig, api_key: String) -> Result<Self, Error> {
        Ok(Self {
            client: http_client()?,
            config,
            api_key,
        })
    }

    fn generate_url(&self) -> String {
        let base = self.config.api_endpoint.trim_end_matches('/');
        format!("{base}/models/{}:generateContent?key={}", self.config.model, self.api_key)
    }

    fn models_url(&self) -> String {
        let base = self.config.api_endpoint.trim_end_matches('/');
        format!("{base}/models?key={}", self.api_key)
    }

    async fn generate(&self, system: &str, user: &str, cancel: &CancellationToken) -> Result<String, Error> {
        let body = json!({
            "systemInstruction": {"parts": [{"text": system}]},
            "contents": [{"role": "user", "parts": [{"text": user}]}],
        });

        let request = self.client.post(self.generate_url()).json(&body).send();
        let response = tokio::select! {
            result = request => result?,
            _ = cancel.cancelled() => return Err(Error::new(ErrorCode::UserCancel, "request cancelled")),
        };

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(map_status(status, &text));
        }

        let payload: serde_json::Value = response.json().await?;
        let parts = payload
            .get("candidates")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.as_array())
            .ok_or_else(|| {
                Error::new(ErrorCode::ProviderResponse, "response missing candidates[0].content.parts")
                    .with_context("raw", payload.clone())
            })?;

        let text: String = parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(Error::new(ErrorCode::ProviderResponse, "response parts contained no text")
                .with_context("raw", payload));
        }
        Ok(text)
    }
}

#[async_trait]
impl Provider for GeminiAdapter {
    async fn get_suggestion(
        &self,
        captured: &CapturedContext,
        language: &str,
        cancel: &CancellationToken,
    ) -> Result<Suggestion, Error> {
        let (system, user) = suggestion_prompt(captured, language);
        let text = self.generate(&system, &user, cancel).await?;
        parse_suggestion(&text)
    }

    async fn generate_command(&self, prompt: &str, language: &str, cancel: &CancellationToken) -> Result<String, Error> {
        let (system, user) = command_prompt(prompt, language);
        let text = self.generate(&system, &user, cancel).await?;
        parse_command(&text)
    }

    async fn verify_connection(&self, cancel: &CancellationToken) -> Result<Vec<String>, Error> {
        self.get_available_models(cancel).await
    }

    async fn get_available_models(&self, cancel: &CancellationToken) -> Result<Vec<String>, Error> {
        let url = self.models_url();
        let response = send_with_verb_fallback(reqwest::Method::GET, cancel, |method| self.client.request(method, &url)).await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(map_status(status, &text));
        }
        let payload: serde_json::Value = response.json().await?;
        let mut models: Vec<String> = payload
            .get("models")
            .and_then(|m| m.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m.get("name").and_then(|n| n.as_str()).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        models.sort();
        models.dedup();
        Ok(models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_url_embeds_model_and_key() {
        let config = ProviderConfig {
            api_endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: String::new(),
            model: "gemini-1.5-flash".to_string(),
            project: None,
            omit_v1_prefix: false,
        };
        let adapter = GeminiAdapter::new(config, "secret-key".to_string()).unwrap();
        assert_eq!(
            adapter.generate_url(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent?key=secret-key"
        );
    }
}
