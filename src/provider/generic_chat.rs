//! Shared prompt composition/parsing for chat-completion style backends
//! (OpenAI-compatible, Claude, Ollama), plus the Claude/Ollama adapter
//! itself — a generic chat-completion layer where Ollama simply omits
//! authentication.

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::capture::CapturedContext;
use crate::config::ProviderConfig;
use crate::error::{Error, ErrorCode};
use crate::extractor;

use super::{Provider, Suggestion, http_client, join_endpoint, map_status, send_with_verb_fallback};

const SUGGESTION_SCHEMA_HINT: &str = r#"Respond with strict JSON only, no prose, no code fences: {"explanation":"...", "command":"..."}"#;
const COMMAND_SCHEMA_HINT: &str = r#"Respond with strict JSON only, no prose, no code fences: {"command":"..."}"#;

pub(super) fn suggestion_prompt(captured: &CapturedContext, language: &str) -> (String, String) {
    let system = format!(
        "You are a shell command assistant. Explain the failure briefly and propose a corrected \
         command. Respond in {language}. {SUGGESTION_SCHEMA_HINT}"
    );

    let mut user = format!(
        "Command: {}\nExit code: {}\nStderr: {}\nStdout: {}",
        captured.command, captured.exit_code, captured.stderr, captured.stdout
    );
    if let Some(dir) = &captured.working_directory {
        user.push_str(&format!("\nWorking directory: {dir}"));
    }
    if !captured.recent_commands.is_empty() {
        user.push_str(&format!("\nRecent commands: {}", captured.recent_commands.join(", ")));
    }
    (system, user)
}

pub(super) fn command_prompt(prompt: &str, language: &str) -> (String, String) {
    let system = format!(
        "You translate a natural-language request into a single shell command. \
         Respond in {language}. {COMMAND_SCHEMA_HINT}"
    );
    (system, prompt.to_string())
}

pub(super) fn parse_suggestion(text: &str) -> Result<Suggestion, Error> {
    let value = extractor::extract_json(text)?;
    let explanation = extractor::required_string(&value, "explanation")?;
    let command = extractor::required_string(&value, "command")?;
    Ok(Suggestion {
        explanation,
        corrected_command: extractor::normalize_command(&command),
    })
}

pub(super) fn parse_command(text: &str) -> Result<String, Error> {
    let value = extractor::extract_json(text)?;
    let command = extractor::required_string(&value, "command")?;
    Ok(extractor::normalize_command(&command))
}

/// Claude and Ollama share a chat-completion shape close enough to
/// OpenAI's to reuse the same request/response plumbing; Ollama simply
/// never sends an `Authorization` header.
pub struct GenericChatAdapter {
    config: ProviderConfig,
    api_key: String,
    client: reqwest::Client,
    requires_auth: bool,
}

impl GenericChatAdapter {
    pub fn claude(config: ProviderConfig, api_key: String) -> Result<Self, Error> {
        Ok(Self {
            client: http_client()?,
            config,
            api_key,
            requires_auth: true,
        })
    }

    pub fn ollama(config: ProviderConfig) -> Result<Self, Error> {
        Ok(Self {
            client: http_client()?,
            config,
            api_key: String::new(),
            requires_auth: false,
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

        let mut request = self.client.post(self.chat_url()).json(&body);
        if self.requires_auth {
            request = request.bearer_auth(&self.api_key);
        }

        let response = tokio::select! {
            result = request.send() => result?,
            _ = cancel.cancelled() => return Err(Error::new(ErrorCode::UserCancel, "request cancelled")),
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
impl Provider for GenericChatAdapter {
    async fn get_suggestion(
        &self,
        captured: &CapturedContext,
        language: &str,
        cancel: &CancellationToken,
    ) -> Result<Suggestion, Error> {
        let (system, user) = suggestion_prompt(captured, language);
        let text = self.chat(&system, &user, cancel).await?;
        parse_suggestion(&text)
    }

    async fn generate_command(&self, prompt: &str, language: &str, cancel: &CancellationToken) -> Result<String, Error> {
        let (system, user) = command_prompt(prompt, language);
        let text = self.chat(&system, &user, cancel).await?;
        parse_command(&text)
    }

    async fn verify_connection(&self, cancel: &CancellationToken) -> Result<Vec<String>, Error> {
        self.get_available_models(cancel).await
    }

    async fn get_available_models(&self, cancel: &CancellationToken) -> Result<Vec<String>, Error> {
        let url = self.models_url();
        let response = send_with_verb_fallback(reqwest::Method::GET, cancel, |method| {
            let mut request = self.client.request(method, &url);
            if self.requires_auth {
                request = request.bearer_auth(&self.api_key);
            }
            request
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
            .or_else(|| payload.get("models"))
            .and_then(|d| d.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| {
                        m.get("id")
                            .or_else(|| m.get("name"))
                            .and_then(|i| i.as_str())
                            .map(str::to_string)
                    })
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
    fn parse_suggestion_extracts_both_fields() {
        let text = r#"{"explanation": "typo in command", "command": "git status"}"#;
        let suggestion = parse_suggestion(text).unwrap();
        assert_eq!(suggestion.explanation, "typo in command");
        assert_eq!(suggestion.corrected_command, "git status");
    }

    #[test]
    fn parse_command_collapses_embedded_newlines() {
        let text = "{\"command\": \"find . \\n -name '*.pdf'\"}";
        let command = parse_command(text).unwrap();
        assert!(!command.contains('\n'));
    }
}
