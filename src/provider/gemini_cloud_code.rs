//! Gemini Cloud-Code adapter: OAuth-authenticated access to the same
//! `generateContent` surface as the public API. The OAuth device/web flow
//! itself is an external collaborator (the CLI binary or a companion
//! tool); this adapter only consumes its result — a credentials file named
//! `gemini_oauth_creds.json` holding an access token, refresh token, and
//! project ID.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::capture::CapturedContext;
use crate::config::ProviderConfig;
use crate::error::{Error, ErrorCode};

use super::generic_chat::{command_prompt, parse_command, parse_suggestion, suggestion_prompt};
use super::{Provider, Suggestion, http_client, map_status};

#[derive(Debug, Clone, Deserialize)]
struct OAuthCreds {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    project_id: Option<String>,
}

pub struct GeminiCloudCodeAdapter {
    config: ProviderConfig,
    creds: OAuthCreds,
    project: String,
    client: reqwest::Client,
}

impl GeminiCloudCodeAdapter {
    pub fn new(config: ProviderConfig, config_dir: &Path) -> Result<Self, Error> {
        let creds_path = config_dir.join("gemini_oauth_creds.json");
        let raw = std::fs::read_to_string(&creds_path).map_err(|e| {
            Error::new(ErrorCode::ProviderAuth, "gemini cloud-code credentials file not found")
                .with_details(format!("{}: {e}", creds_path.display()))
        })?;
        let creds: OAuthCreds = serde_json::from_str(&raw)
            .map_err(|e| Error::new(ErrorCode::ProviderAuth, "gemini cloud-code credentials file is malformed").with_details(e.to_string()))?;

        // AISH_GEMINI_PROJECT overrides everything; otherwise prefer the
        // project embedded in the credentials, then the adapter's own
        // config, per the provider config's resolution order.
        let project = std::env::var("AISH_GEMINI_PROJECT")
            .ok()
            .or_else(|| creds.project_id.clone())
            .or_else(|| config.project.clone())
            .ok_or_else(|| Error::new(ErrorCode::ProviderAuth, "no Gemini Cloud-Code project id could be resolved"))?;

        Ok(Self {
            client: http_client()?,
            config,
            creds,
            project,
        })
    }

    fn credentials_path(config_dir: &Path) -> PathBuf {
        config_dir.join("gemini_oauth_creds.json")
    }

    fn generate_url(&self) -> String {
        let base = self.config.api_endpoint.trim_end_matches('/');
        format!("{base}/projects/{}/models/{}:generateContent", self.project, self.config.model)
    }

    async fn generate(&self, system: &str, user: &str, cancel: &CancellationToken) -> Result<String, Error> {
        let body = json!({
            "systemInstruction": {"parts": [{"text": system}]},
            "contents": [{"role": "user", "parts": [{"text": user}]}],
        });

        let request = self
            .client
            .post(self.generate_url())
            .bearer_auth(&self.creds.access_token)
            .json(&body)
            .send();

        let response = tokio::select! {
            result = request => result?,
            _ = cancel.cancelled() => return Err(Error::new(ErrorCode::UserCancel, "request cancelled")),
        };

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::FORBIDDEN || status == reqwest::StatusCode::NOT_FOUND {
                return Err(Error::new(ErrorCode::ProviderAuth, "project is not reachable with the current token; re-authenticate or set AISH_GEMINI_PROJECT")
                    .with_details(format!("status {status}: {text}")));
            }
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
impl Provider for GeminiCloudCodeAdapter {
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

    async fn get_available_models(&self, _cancel: &CancellationToken) -> Result<Vec<String>, Error> {
        // The Cloud-Code surface doesn't expose a public catalog endpoint;
        // the configured model is the only one guaranteed usable.
        Ok(vec![self.config.model.clone()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_creds(dir: &Path, project: Option<&str>) {
        let body = match project {
            Some(p) => format!(r#"{{"access_token":"tok","refresh_token":"refresh","project_id":"{p}"}}"#),
            None => r#"{"access_token":"tok"}"#.to_string(),
        };
        std::fs::write(GeminiCloudCodeAdapter::credentials_path(dir), body).unwrap();
    }

    fn config() -> ProviderConfig {
        ProviderConfig {
            api_endpoint: "https://cloudcode-pa.googleapis.com/v1internal".to_string(),
            api_key: String::new(),
            model: "gemini-1.5-pro".to_string(),
            project: Some("config-project".to_string()),
            omit_v1_prefix: false,
        }
    }

    #[test]
    fn missing_credentials_file_is_provider_auth_error() {
        let dir = tempdir().unwrap();
        let err = GeminiCloudCodeAdapter::new(config(), dir.path()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ProviderAuth);
    }

    #[test]
    fn project_resolution_prefers_credentials_file_over_config() {
        let dir = tempdir().unwrap();
        write_creds(dir.path(), Some("creds-project"));
        let adapter = GeminiCloudCodeAdapter::new(config(), dir.path()).unwrap();
        assert_eq!(adapter.project, "creds-project");
    }

    #[test]
    fn project_resolution_falls_back_to_config_when_creds_lack_project() {
        let dir = tempdir().unwrap();
        write_creds(dir.path(), None);
        let adapter = GeminiCloudCodeAdapter::new(config(), dir.path()).unwrap();
        assert_eq!(adapter.project, "config-project");
    }
}
