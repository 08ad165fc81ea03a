//! Resolves a provider name plus its [`ProviderConfig`] into a boxed
//! [`Provider`] adapter.

use std::path::Path;
use std::sync::Arc;

use crate::config::ProviderConfig;
use crate::error::{Error, ErrorCode};

use super::Provider;

/// Build the adapter for `provider_name`. `config_dir` is only consulted
/// by the Cloud-Code variant, which reads its OAuth credentials file from
/// there.
pub fn build(provider_name: &str, config: &ProviderConfig, api_key: String, config_dir: &Path) -> Result<Arc<dyn Provider>, Error> {
    match provider_name {
        "openai" => Ok(Arc::new(super::openai::OpenAiAdapter::new(config.clone(), api_key)?)),
        "gemini" => Ok(Arc::new(super::gemini::GeminiAdapter::new(config.clone(), api_key)?)),
        "gemini-cloud-code" => Ok(Arc::new(super::gemini_cloud_code::GeminiCloudCodeAdapter::new(
            config.clone(),
            config_dir,
        )?)),
        "claude" => Ok(Arc::new(super::generic_chat::GenericChatAdapter::claude(config.clone(), api_key)?)),
        "ollama" => Ok(Arc::new(super::generic_chat::GenericChatAdapter::ollama(config.clone())?)),
        other => Err(Error::new(
            ErrorCode::ProviderNotFound,
            format!("unknown provider '{other}'"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config() -> ProviderConfig {
        ProviderConfig {
            api_endpoint: "https://api.openai.com".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            project: None,
            omit_v1_prefix: false,
        }
    }

    #[test]
    fn unknown_provider_name_is_provider_not_found() {
        let dir = tempdir().unwrap();
        let err = build("not-a-real-provider", &config(), String::new(), dir.path()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ProviderNotFound);
    }

    #[test]
    fn known_provider_names_build_successfully() {
        let dir = tempdir().unwrap();
        for name in ["openai", "gemini", "claude", "ollama"] {
            assert!(build(name, &config(), "key".to_string(), dir.path()).is_ok());
        }
    }
}
