//! Secret manager (C6): at-rest encryption of provider API keys.
//!
//! Two-tier key hierarchy. A machine-fingerprint key (SHA-256 over
//! hostname/home/user, never written to disk) seals a random 32-byte data
//! key, which is what actually encrypts/decrypts credentials. The sealed
//! data key lives at `<config_dir>/.secret_key` with mode 0600. Style
//! mirrors the teacher's crypto helpers in spirit (hash-then-encode), see
//! `DESIGN.md`.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{Error, ErrorCode};

const SECRET_KEY_FILE: &str = ".secret_key";
const NONCE_LEN: usize = 12;
const VALIDATION_SENTINEL: &str = "aish-secret-manager-roundtrip-sentinel";

const PLACEHOLDERS: &[&str] = &[
    "YOUR_OPENAI_API_KEY",
    "YOUR_GEMINI_API_KEY",
    "YOUR_GEMINI_PROJECT_ID",
];

/// Returns `true` for empty strings and recognized placeholder tokens:
/// neither is ever encrypted or decrypted, they pass through untouched.
pub fn is_exempt(value: &str) -> bool {
    value.is_empty() || PLACEHOLDERS.contains(&value)
}

/// Owns the unsealed 32-byte data key for one config directory. Construct
/// once per process via [`SecretManager::load_or_create`].
pub struct SecretManager {
    data_key: [u8; 32],
}

impl SecretManager {
    /// Derive the Tier 1 machine key: SHA-256 of
    /// `hostname|home|USER|LOGNAME`. Never persisted; recomputed from the
    /// environment on every process start.
    fn machine_key() -> [u8; 32] {
        let hostname = hostname_fallback();
        let home = dirs::home_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let user = std::env::var("USER").unwrap_or_default();
        let logname = std::env::var("LOGNAME").unwrap_or_default();

        let material = format!("{hostname}|{home}|{user}|{logname}");
        let mut hasher = Sha256::new();
        hasher.update(material.as_bytes());
        hasher.finalize().into()
    }

    /// Load the sealed data key from `<config_dir>/.secret_key`, unsealing
    /// it under the machine key; generate and seal a fresh one if absent.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, Error> {
        let path = config_dir.join(SECRET_KEY_FILE);
        let machine_key = Self::machine_key();

        if path.exists() {
            let sealed = fs::read_to_string(&path)?;
            let data_key = unseal(sealed.trim(), &machine_key)?;
            return Ok(Self { data_key });
        }

        let mut data_key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut data_key);
        let sealed = seal(&data_key, &machine_key)?;

        fs::create_dir_all(config_dir)?;
        write_private(&path, &sealed)?;

        Ok(Self { data_key })
    }

    /// Encrypt `plaintext` under the data key. No-ops (returns the input
    /// unchanged) for empty strings and placeholder tokens.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, Error> {
        if is_exempt(plaintext) {
            return Ok(plaintext.to_string());
        }
        encrypt_with_key(plaintext.as_bytes(), &self.data_key)
    }

    /// Decrypt `ciphertext` under the data key. No-ops for empty strings
    /// and placeholder tokens. Decryption failures are surfaced as
    /// `ProviderAuth`-adjacent `ConfigValidation` errors rather than
    /// panicking, since pre-migration plaintext is a valid on-disk state.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, Error> {
        if is_exempt(ciphertext) {
            return Ok(ciphertext.to_string());
        }
        decrypt_with_key(ciphertext, &self.data_key)
    }

    /// Round-trips a fixed sentinel through encrypt/decrypt to confirm the
    /// data key is usable.
    pub fn validate_encryption(&self) -> Result<(), Error> {
        let ciphertext = encrypt_with_key(VALIDATION_SENTINEL.as_bytes(), &self.data_key)?;
        let plaintext = decrypt_with_key(&ciphertext, &self.data_key)?;
        if plaintext != VALIDATION_SENTINEL {
            return Err(Error::internal(
                ErrorCode::ConfigValidation,
                "secret manager round-trip produced a mismatched sentinel",
            ));
        }
        Ok(())
    }

    /// Returns `true` if `ciphertext` decrypts cleanly under the current
    /// data key. Used by the config migration pass to decide whether a
    /// stored value is already-encrypted or still plaintext.
    pub fn decrypts_cleanly(&self, ciphertext: &str) -> bool {
        if is_exempt(ciphertext) {
            return true;
        }
        decrypt_with_key(ciphertext, &self.data_key).is_ok()
    }
}

fn hostname_fallback() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| {
            fs::read_to_string("/etc/hostname")
                .ok()
                .map(|s| s.trim().to_string())
        })
        .unwrap_or_else(|| "unknown-host".to_string())
}

fn encrypt_with_key(plaintext: &[u8], key_bytes: &[u8; 32]) -> Result<String, Error> {
    let key = Key::<Aes256Gcm>::from_slice(key_bytes);
    let cipher = Aes256Gcm::new(key);

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let sealed = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| Error::internal(ErrorCode::ConfigValidation, "encryption failed"))?;

    let mut combined = Vec::with_capacity(NONCE_LEN + sealed.len());
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&sealed);
    Ok(BASE64.encode(combined))
}

fn decrypt_with_key(ciphertext_b64: &str, key_bytes: &[u8; 32]) -> Result<String, Error> {
    let combined = BASE64
        .decode(ciphertext_b64)
        .map_err(|e| Error::new(ErrorCode::ConfigValidation, "ciphertext is not valid base64").with_details(e.to_string()))?;

    if combined.len() < NONCE_LEN {
        return Err(Error::new(
            ErrorCode::ConfigValidation,
            "ciphertext too short to contain a nonce",
        ));
    }
    let (nonce_bytes, sealed) = combined.split_at(NONCE_LEN);

    let key = Key::<Aes256Gcm>::from_slice(key_bytes);
    let cipher = Aes256Gcm::new(key);
    let nonce = Nonce::from_slice(nonce_bytes);

    let plaintext = cipher
        .decrypt(nonce, sealed)
        .map_err(|_| Error::new(ErrorCode::ConfigValidation, "decryption failed: wrong key or corrupt ciphertext"))?;

    String::from_utf8(plaintext)
        .map_err(|e| Error::new(ErrorCode::ConfigValidation, "decrypted payload is not valid UTF-8").with_details(e.to_string()))
}

fn seal(data_key: &[u8; 32], machine_key: &[u8; 32]) -> Result<String, Error> {
    encrypt_with_key(data_key, machine_key)
}

fn unseal(sealed_b64: &str, machine_key: &[u8; 32]) -> Result<[u8; 32], Error> {
    let plaintext = decrypt_with_key(sealed_b64, machine_key).map_err(|e| {
        Error::new(ErrorCode::ConfigValidation, "failed to unseal data key: machine fingerprint changed?")
            .with_cause(e)
    })?;
    let bytes = plaintext.into_bytes();
    bytes
        .try_into()
        .map_err(|_| Error::internal(ErrorCode::ConfigValidation, "unsealed data key had unexpected length"))
}

#[cfg(unix)]
fn write_private(path: &PathBuf, contents: &str) -> Result<(), Error> {
    use std::os::unix::fs::PermissionsExt;
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents.as_bytes())?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn write_private(path: &PathBuf, contents: &str) -> Result<(), Error> {
    fs::write(path, contents)?;
    Ok(())
}
