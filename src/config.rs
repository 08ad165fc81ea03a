//! Configuration store (C7): versioned on-disk schema, migration, and
//! two-phase validation with auto-repair.
//!
//! Layout: `<home>/.config/aish/config.json`. Two shapes are accepted on
//! load: legacy (a bare [`Configuration`]) and versioned
//! (`{"version": N, "data": <Configuration>}`). Anything read back at a
//! version below [`CURRENT_VERSION`] is migrated in place and re-saved;
//! anything above it is rejected — a newer binary wrote it.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::classifier::ErrorKind;
use crate::error::{Error, ErrorCode};
use crate::secret::SecretManager;

/// The on-disk schema version, a semver string (not a bare integer) — this
/// is the literal value the configuration envelope is stamped with.
pub const CURRENT_VERSION: &str = "1.1.0";

/// Parse a dotted `major.minor.patch` version string into a comparable
/// tuple. Returns `None` for anything that doesn't look like a three-part
/// numeric version, which `load` treats as an unreadable file.
fn parse_version(s: &str) -> Option<(u32, u32, u32)> {
    let mut parts = s.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor, patch))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_endpoint: String,
    pub api_key: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default)]
    pub omit_v1_prefix: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextPreferences {
    #[serde(default = "default_true")]
    pub include_working_directory: bool,
    #[serde(default = "default_true")]
    pub include_recent_commands: bool,
    #[serde(default)]
    pub include_directory_listing: bool,
    #[serde(default = "default_recent_commands_limit")]
    pub recent_commands_limit: usize,
}

impl Default for ContextPreferences {
    fn default() -> Self {
        Self {
            include_working_directory: true,
            include_recent_commands: true,
            include_directory_listing: false,
            recent_commands_limit: default_recent_commands_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingPreferences {
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_log_output")]
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for LoggingPreferences {
    fn default() -> Self {
        Self {
            debug: false,
            level: default_log_level(),
            format: default_log_format(),
            output: default_log_output(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachePreferences {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl_seconds")]
    pub ttl_seconds: u64,
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

impl Default for CachePreferences {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: default_cache_ttl_seconds(),
            max_entries: default_cache_max_entries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPreferences {
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_triggers")]
    pub enabled_llm_triggers: HashSet<String>,
    #[serde(default)]
    pub auto_execute: bool,
    #[serde(default)]
    pub context: ContextPreferences,
    #[serde(default)]
    pub logging: LoggingPreferences,
    #[serde(default)]
    pub cache: CachePreferences,
    #[serde(default = "default_max_history_size")]
    pub max_history_size: usize,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            language: default_language(),
            enabled_llm_triggers: default_triggers(),
            auto_execute: false,
            context: ContextPreferences::default(),
            logging: LoggingPreferences::default(),
            cache: CachePreferences::default(),
            max_history_size: default_max_history_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_provider_name")]
    pub default_provider: String,
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub user_preferences: UserPreferences,
}

#[derive(Debug, Serialize, Deserialize)]
struct VersionedFile {
    version: String,
    data: Value,
}

fn default_true() -> bool {
    true
}
fn default_language() -> String {
    "english".to_string()
}
fn default_provider_name() -> String {
    "openai".to_string()
}
fn default_max_history_size() -> usize {
    500
}
fn default_recent_commands_limit() -> usize {
    10
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}
fn default_log_output() -> String {
    "file".to_string()
}
fn default_cache_ttl_seconds() -> u64 {
    300
}
fn default_cache_max_entries() -> usize {
    100
}
fn default_triggers() -> HashSet<String> {
    ErrorKind::ALL
        .iter()
        .filter(|k| !matches!(k, ErrorKind::InteractiveToolUsage))
        .map(|k| k.as_str().to_string())
        .collect()
}

const CANONICAL_LANGUAGES: &[&str] = &["english", "spanish", "french", "german", "japanese", "chinese"];

impl Configuration {
    pub fn default_config() -> Self {
        let mut providers = HashMap::new();
        providers.insert(
            "openai".to_string(),
            ProviderConfig {
                api_endpoint: "https://api.openai.com".to_string(),
                api_key: "YOUR_OPENAI_API_KEY".to_string(),
                model: "gpt-4o-mini".to_string(),
                project: None,
                omit_v1_prefix: false,
            },
        );
        Self {
            enabled: true,
            default_provider: default_provider_name(),
            providers,
            user_preferences: UserPreferences::default(),
        }
    }
}

/// A single validation finding.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationIssue {
    pub field: String,
    pub value: String,
    pub message: String,
    pub suggestions: Vec<String>,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// Owns the on-disk path and the secret manager used to encrypt/decrypt
/// provider API keys as they move to and from disk.
pub struct Store {
    config_dir: PathBuf,
    config_path: PathBuf,
    secrets: SecretManager,
}

impl Store {
    pub fn new(config_dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let config_dir = config_dir.into();
        let secrets = SecretManager::load_or_create(&config_dir)?;
        Ok(Self {
            config_path: config_dir.join("config.json"),
            config_dir,
            secrets,
        })
    }

    pub fn default_dir() -> Result<PathBuf, Error> {
        dirs::home_dir()
            .map(|home| home.join(".config").join("aish"))
            .ok_or_else(|| Error::new(ErrorCode::ConfigMissing, "could not resolve home directory"))
    }

    /// Run the full load algorithm described in the module docs.
    pub fn load(&self) -> Result<Configuration, Error> {
        if !self.config_path.exists() {
            let config = Configuration::default_config();
            self.save(&config)?;
            return Ok(config);
        }

        let raw = fs::read_to_string(&self.config_path)
            .map_err(|e| Error::new(ErrorCode::ConfigLoad, "failed to read config file").with_details(e.to_string()))?;

        if let Ok(versioned) = serde_json::from_str::<VersionedFile>(&raw) {
            if versioned.version == CURRENT_VERSION {
                let config: Configuration = serde_json::from_value(versioned.data)
                    .map_err(|e| Error::new(ErrorCode::ConfigLoad, "versioned config data is malformed").with_details(e.to_string()))?;
                return Ok(config);
            }

            let current = parse_version(CURRENT_VERSION).expect("CURRENT_VERSION is a valid semver string");
            let on_disk = parse_version(&versioned.version).ok_or_else(|| {
                Error::new(ErrorCode::ConfigLoad, format!("config version '{}' is not a valid semver string", versioned.version))
            })?;
            if on_disk > current {
                return Err(Error::new(
                    ErrorCode::ConfigLoad,
                    format!("config version {} is newer than this binary supports ({CURRENT_VERSION})", versioned.version),
                ));
            }
            self.backup(&raw)?;
            let config: Configuration = serde_json::from_value(versioned.data)
                .map_err(|e| Error::new(ErrorCode::ConfigLoad, "legacy versioned data is malformed").with_details(e.to_string()))?;
            let migrated = self.migrate(config, &versioned.version);
            self.save(&migrated)?;
            return Ok(migrated);
        }

        match serde_json::from_str::<Configuration>(&raw) {
            Ok(config) => {
                self.backup(&raw)?;
                let migrated = self.migrate(config, "1.0.0");
                self.save(&migrated)?;
                Ok(migrated)
            }
            Err(e) => Err(Error::new(ErrorCode::ConfigLoad, "config file is neither a valid versioned nor legacy shape")
                .with_details(e.to_string())),
        }
    }

    /// Apply per-version migrations. 1.0.0 -> 1.1.0 adds the logging
    /// subsection (already defaulted by serde) and is otherwise a no-op;
    /// this exists as the seam future migrations attach to.
    fn migrate(&self, config: Configuration, from_version: &str) -> Configuration {
        let _ = from_version;
        config
    }

    /// Back up `raw` to `<dir>/config.backup.json`, falling back to a
    /// PID-suffixed name if that target already exists.
    fn backup(&self, raw: &str) -> Result<(), Error> {
        let primary = self.config_dir.join("config.backup.json");
        let target = if primary.exists() {
            self.config_dir.join(format!("config.backup.{}.json", std::process::id()))
        } else {
            primary
        };
        fs::write(&target, raw)?;
        Ok(())
    }

    /// Encrypt provider API keys, stamp the version envelope, and write
    /// `config.json` with mode 0644 (directory 0755).
    pub fn save(&self, config: &Configuration) -> Result<(), Error> {
        fs::create_dir_all(&self.config_dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.config_dir, fs::Permissions::from_mode(0o755))?;
        }

        let mut to_write = config.clone();
        for provider in to_write.providers.values_mut() {
            if !self.secrets.decrypts_cleanly(&provider.api_key) {
                provider.api_key = self.secrets.encrypt(&provider.api_key)?;
            }
        }

        let envelope = VersionedFile {
            version: CURRENT_VERSION.to_string(),
            data: serde_json::to_value(&to_write)
                .map_err(|e| Error::new(ErrorCode::ConfigSave, "failed to serialize config").with_details(e.to_string()))?,
        };
        let body = serde_json::to_string_pretty(&envelope)
            .map_err(|e| Error::new(ErrorCode::ConfigSave, "failed to serialize config envelope").with_details(e.to_string()))?;

        fs::write(&self.config_path, &body)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.config_path, fs::Permissions::from_mode(0o644))?;
        }
        Ok(())
    }

    /// Return the cleartext API key for `provider_name`, decrypting on
    /// demand. Surfaces the true decryption error instead of silently
    /// treating it as a missing key.
    pub fn decrypted_api_key(&self, config: &Configuration, provider_name: &str) -> Result<String, Error> {
        let provider = config
            .providers
            .get(provider_name)
            .ok_or_else(|| Error::new(ErrorCode::ProviderNotFound, format!("no provider configured named '{provider_name}'")))?;
        self.secrets.decrypt(&provider.api_key)
    }

    /// Two-phase validator: collect issues, then [`Self::validate_and_fix`]
    /// applies safe repairs and re-validates, returning only errors that
    /// survive repair.
    pub fn validate(&self, config: &Configuration) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if !config.providers.contains_key(&config.default_provider) {
            issues.push(ValidationIssue {
                field: "default_provider".to_string(),
                value: config.default_provider.clone(),
                message: "default_provider does not name a configured provider".to_string(),
                suggestions: config.providers.keys().cloned().collect(),
                severity: Severity::Error,
            });
        }

        if !CANONICAL_LANGUAGES.contains(&config.user_preferences.language.as_str()) {
            issues.push(ValidationIssue {
                field: "user_preferences.language".to_string(),
                value: config.user_preferences.language.clone(),
                message: "language is not one of the canonical supported codes".to_string(),
                suggestions: vec!["english".to_string()],
                severity: Severity::Warning,
            });
        }

        for trigger in &config.user_preferences.enabled_llm_triggers {
            if trigger.parse::<ErrorKind>().is_err() {
                issues.push(ValidationIssue {
                    field: "user_preferences.enabled_llm_triggers".to_string(),
                    value: trigger.clone(),
                    message: "trigger is not a recognized error kind".to_string(),
                    suggestions: ErrorKind::ALL.iter().map(|k| k.as_str().to_string()).collect(),
                    severity: Severity::Error,
                });
            }
        }

        if config.user_preferences.max_history_size == 0 || config.user_preferences.max_history_size > 100_000 {
            issues.push(ValidationIssue {
                field: "user_preferences.max_history_size".to_string(),
                value: config.user_preferences.max_history_size.to_string(),
                message: "max_history_size is out of the documented [1, 100000] range".to_string(),
                suggestions: vec![default_max_history_size().to_string()],
                severity: Severity::Warning,
            });
        }

        for (name, provider) in &config.providers {
            if crate::secret::is_exempt(&provider.api_key) {
                issues.push(ValidationIssue {
                    field: format!("providers.{name}.api_key"),
                    value: provider.api_key.clone(),
                    message: "api key is empty or a placeholder; provider calls will fail until configured".to_string(),
                    suggestions: vec![],
                    severity: Severity::Warning,
                });
            }
        }

        issues
    }

    /// Apply safe, automatic repairs in place, then re-run [`Self::validate`]
    /// and return only the issues that remain `error` severity.
    pub fn validate_and_fix(&self, config: &mut Configuration) -> Vec<ValidationIssue> {
        if !config.providers.contains_key(&config.default_provider) {
            if let Some(first) = config.providers.keys().next().cloned() {
                config.default_provider = first;
            }
        }

        if !CANONICAL_LANGUAGES.contains(&config.user_preferences.language.as_str()) {
            config.user_preferences.language = "english".to_string();
        }

        config
            .user_preferences
            .enabled_llm_triggers
            .retain(|t| t.parse::<ErrorKind>().is_ok());

        if config.user_preferences.max_history_size == 0 || config.user_preferences.max_history_size > 100_000 {
            config.user_preferences.max_history_size = default_max_history_size();
        }

        if config.user_preferences.logging.file.is_none() {
            config.user_preferences.logging.file = Some(
                self.config_dir
                    .join("aish.log")
                    .to_string_lossy()
                    .to_string(),
            );
        }

        self.validate(config)
            .into_iter()
            .filter(|i| i.severity == Severity::Error)
            .collect()
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store(dir: &Path) -> Store {
        Store::new(dir).unwrap()
    }

    #[test]
    fn load_on_absent_file_synthesizes_and_persists_defaults() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let config = store.load().unwrap();
        assert!(config.providers.contains_key("openai"));
        assert!(dir.path().join("config.json").exists());
    }

    #[test]
    fn save_then_load_round_trips_and_encrypts_api_key() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let mut config = Configuration::default_config();
        config.providers.get_mut("openai").unwrap().api_key = "sk-real-secret".to_string();
        store.save(&config).unwrap();

        let raw = fs::read_to_string(dir.path().join("config.json")).unwrap();
        assert!(!raw.contains("sk-real-secret"));

        let reloaded = store.load().unwrap();
        let decrypted = store.decrypted_api_key(&reloaded, "openai").unwrap();
        assert_eq!(decrypted, "sk-real-secret");
    }

    #[test]
    fn legacy_flat_file_migrates_to_versioned_and_backs_up() {
        let dir = tempdir().unwrap();
        let legacy = serde_json::to_string(&Configuration::default_config()).unwrap();
        fs::write(dir.path().join("config.json"), &legacy).unwrap();

        let store = store(dir.path());
        let _config = store.load().unwrap();

        assert!(dir.path().join("config.backup.json").exists());
        let raw = fs::read_to_string(dir.path().join("config.json")).unwrap();
        let versioned: VersionedFile = serde_json::from_str(&raw).unwrap();
        assert_eq!(versioned.version, CURRENT_VERSION);
    }

    #[test]
    fn backup_falls_back_to_pid_suffixed_name_when_primary_exists() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("config.backup.json"), "existing").unwrap();
        let store = store(dir.path());
        store.backup("raw-contents").unwrap();

        let pid_name = format!("config.backup.{}.json", std::process::id());
        assert!(dir.path().join(pid_name).exists());
        assert_eq!(fs::read_to_string(dir.path().join("config.backup.json")).unwrap(), "existing");
    }

    #[test]
    fn newer_version_on_disk_is_rejected() {
        let dir = tempdir().unwrap();
        let envelope = VersionedFile {
            version: "99.0.0".to_string(),
            data: serde_json::to_value(Configuration::default_config()).unwrap(),
        };
        fs::write(dir.path().join("config.json"), serde_json::to_string(&envelope).unwrap()).unwrap();

        let store = store(dir.path());
        let err = store.load().unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigLoad);
    }

    #[test]
    fn validate_and_fix_repairs_invalid_default_provider() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let mut config = Configuration::default_config();
        config.default_provider = "does-not-exist".to_string();

        let remaining_errors = store.validate_and_fix(&mut config);
        assert!(remaining_errors.is_empty());
        assert_eq!(config.default_provider, "openai");
    }

    #[test]
    fn validate_and_fix_drops_unknown_triggers() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let mut config = Configuration::default_config();
        config.user_preferences.enabled_llm_triggers.insert("NotARealKind".to_string());

        store.validate_and_fix(&mut config);
        assert!(!config.user_preferences.enabled_llm_triggers.contains("NotARealKind"));
    }

    #[test]
    fn validate_warns_on_placeholder_api_key_but_does_not_error() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let config = Configuration::default_config();

        let issues = store.validate(&config);
        assert!(issues.iter().any(|i| i.field.contains("api_key") && i.severity == Severity::Warning));
        assert!(!issues.iter().any(|i| i.severity == Severity::Error));
    }
}
