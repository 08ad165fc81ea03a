//! Orchestrator (C12): the entry point for both the capture and prompt
//! paths. Composes classifier → cache → `Retry(Breaker(provider))` →
//! history, enforcing the user's trigger filter before any network call
//! is even considered.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::breaker;
use crate::cache::{self, SuggestionCache};
use crate::capture::CapturedContext;
use crate::classifier::{self, ErrorKind};
use crate::config::{Configuration, Store};
use crate::error::{Error, ErrorCode};
use crate::history::{HistoryEntry, HistoryStore};
use crate::provider::{self, Provider, Suggestion};
use crate::retry::{self, RetryConfig};

pub struct Orchestrator {
    store: Store,
    config: Configuration,
    breakers: breaker::Manager,
    cache: SuggestionCache,
    history: HistoryStore,
    retry_config: RetryConfig,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Load configuration from `config_dir` (synthesizing defaults if
    /// absent), validate-and-fix it, initialize logging, and construct the
    /// cache/history collaborators from its preferences.
    pub fn new(config_dir: impl Into<std::path::PathBuf>) -> Result<Self, Error> {
        let config_dir = config_dir.into();
        let store = Store::new(&config_dir)?;
        let mut config = store.load()?;
        store.validate_and_fix(&mut config);

        crate::logging::init(&config.user_preferences.logging);

        let cache = SuggestionCache::new(
            Duration::from_secs(config.user_preferences.cache.ttl_seconds),
            config.user_preferences.cache.max_entries,
        );
        let history = HistoryStore::new(&config_dir);

        Ok(Self {
            store,
            config,
            breakers: breaker::Manager::new(),
            cache,
            history,
            retry_config: RetryConfig::default(),
            cancel: CancellationToken::new(),
        })
    }

    /// The shared cancellation token. The CLI binary wires
    /// `tokio::signal::ctrl_c` to this so Ctrl-C during an in-flight
    /// provider call surfaces as `UserCancel` rather than hanging.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn active_provider(&self) -> Result<(String, Arc<dyn Provider>), Error> {
        let name = self.config.default_provider.clone();
        let provider_config = self
            .config
            .providers
            .get(&name)
            .ok_or_else(|| Error::new(ErrorCode::ProviderNotFound, format!("default provider '{name}' is not configured")))?;
        let api_key = self.store.decrypted_api_key(&self.config, &name)?;
        let adapter = provider::build(&name, provider_config, api_key, self.store.config_dir())?;
        Ok((name, adapter))
    }

    fn trigger_enabled(&self, kind: ErrorKind) -> bool {
        self.config
            .user_preferences
            .enabled_llm_triggers
            .contains(kind.as_str())
    }

    /// Handle a captured shell failure. Returns `Ok(None)` when the
    /// classified kind isn't in the user's trigger set — the caller should
    /// exit silently (exit code 0).
    pub async fn handle_capture(&self, captured: CapturedContext) -> Result<Option<Suggestion>, Error> {
        let kind = classifier::classify(captured.exit_code, &captured.stdout, &captured.stderr);
        if !self.trigger_enabled(kind) {
            return Ok(None);
        }

        let (provider_name, adapter) = self.active_provider()?;
        let key = cache::capture_key(&provider_name, kind.as_str(), &captured.command);

        if let Some(cached) = self.cache.get(&key) {
            return Ok(Some(cached));
        }

        let breaker = self.breakers.get_or_create(&provider_name, breaker::Config::default());
        let language = self.config.user_preferences.language.clone();

        let outcome = retry::execute(&self.retry_config, &self.cancel, || {
            let adapter = adapter.clone();
            let breaker = breaker.clone();
            let captured = captured.clone();
            let language = language.clone();
            let cancel = self.cancel.clone();
            async move { breaker.execute(|| async move { adapter.get_suggestion(&captured, &language, &cancel).await }).await }
        })
        .await;

        let suggestion = outcome
            .value
            .ok_or_else(|| outcome.last_error.unwrap_or_else(|| Error::internal(ErrorCode::ProviderRequest, "provider call failed with no error recorded")))?;

        self.cache.put(key, suggestion.clone());
        self.history.append(
            &HistoryEntry::new(&captured, kind.as_str(), &provider_name, &suggestion),
            self.config.user_preferences.max_history_size,
        )?;

        Ok(Some(suggestion))
    }

    /// Handle a free-form natural-language prompt, returning a single
    /// shell command.
    pub async fn handle_prompt(&self, prompt: &str) -> Result<String, Error> {
        let (provider_name, adapter) = self.active_provider()?;
        let key = cache::prompt_key(&provider_name, prompt);

        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached.corrected_command);
        }

        let breaker = self.breakers.get_or_create(&provider_name, breaker::Config::default());
        let language = self.config.user_preferences.language.clone();
        let prompt_owned = prompt.to_string();

        let outcome = retry::execute(&self.retry_config, &self.cancel, || {
            let adapter = adapter.clone();
            let breaker = breaker.clone();
            let prompt = prompt_owned.clone();
            let language = language.clone();
            let cancel = self.cancel.clone();
            async move { breaker.execute(|| async move { adapter.generate_command(&prompt, &language, &cancel).await }).await }
        })
        .await;

        let command = outcome
            .value
            .ok_or_else(|| outcome.last_error.unwrap_or_else(|| Error::internal(ErrorCode::ProviderRequest, "provider call failed with no error recorded")))?;

        self.cache.put(
            key,
            Suggestion {
                explanation: String::new(),
                corrected_command: command.clone(),
            },
        );
        Ok(command)
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn capture_with_disabled_trigger_returns_none_without_calling_provider() {
        let dir = tempdir().unwrap();
        let orchestrator = Orchestrator::new(dir.path()).unwrap();

        // InteractiveToolUsage is excluded from the default trigger set.
        let captured = CapturedContext {
            command: "vim file.txt".to_string(),
            exit_code: 1,
            stdout: String::new(),
            stderr: "TERM environment variable not set".to_string(),
            working_directory: None,
            shell_type: None,
            recent_commands: vec![],
            directory_listing: vec![],
        };

        let kind = classifier::classify(captured.exit_code, &captured.stdout, &captured.stderr);
        assert_eq!(kind, ErrorKind::InteractiveToolUsage);

        let result = orchestrator.handle_capture(captured).await.unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn new_synthesizes_default_config_and_initializes_cache() {
        let dir = tempdir().unwrap();
        let orchestrator = Orchestrator::new(dir.path()).unwrap();
        assert!(orchestrator.config().providers.contains_key("openai"));
        assert!(orchestrator.cache.is_empty());
    }
}
