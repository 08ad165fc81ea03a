//! History collaborator (A2): an append-only JSONL record of captured
//! failures and the suggestions produced for them, trimmed to a
//! configured maximum on every append.

use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::capture::CapturedContext;
use crate::error::{Error, ErrorCode};
use crate::provider::Suggestion;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub command: String,
    pub exit_code: i32,
    pub error_kind: String,
    pub explanation: String,
    pub corrected_command: String,
    pub provider: String,
}

impl HistoryEntry {
    pub fn new(captured: &CapturedContext, error_kind: &str, provider: &str, suggestion: &Suggestion) -> Self {
        Self {
            command: captured.command.clone(),
            exit_code: captured.exit_code,
            error_kind: error_kind.to_string(),
            explanation: suggestion.explanation.clone(),
            corrected_command: suggestion.corrected_command.clone(),
            provider: provider.to_string(),
        }
    }
}

/// Owns `<config_dir>/history.jsonl`.
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: config_dir.into().join("history.jsonl"),
        }
    }

    /// Append `entry`, then trim the file to `max_entries` (oldest first).
    pub fn append(&self, entry: &HistoryEntry, max_entries: usize) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(entry)
            .map_err(|e| Error::new(ErrorCode::HistorySave, "failed to serialize history entry").with_details(e.to_string()))?;

        {
            let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
            writeln!(file, "{line}")?;
        }

        self.trim(max_entries)
    }

    fn trim(&self, max_entries: usize) -> Result<(), Error> {
        let entries = self.load_all()?;
        if entries.len() <= max_entries {
            return Ok(());
        }
        let keep_from = entries.len() - max_entries;
        let trimmed = &entries[keep_from..];
        let body = trimmed
            .iter()
            .map(|e| serde_json::to_string(e).unwrap_or_default())
            .collect::<Vec<_>>()
            .join("\n");
        fs::write(&self.path, format!("{body}\n"))?;
        Ok(())
    }

    pub fn load_all(&self) -> Result<Vec<HistoryEntry>, Error> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        raw.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| {
                serde_json::from_str(l)
                    .map_err(|e| Error::new(ErrorCode::HistoryLoad, "malformed history entry").with_details(e.to_string()))
            })
            .collect()
    }

    /// Truncate the history file to empty.
    pub fn clear(&self) -> Result<(), Error> {
        if self.path.exists() {
            fs::write(&self.path, [])?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn captured() -> CapturedContext {
        CapturedContext {
            command: "gti status".to_string(),
            exit_code: 127,
            stdout: String::new(),
            stderr: "gti: command not found".to_string(),
            working_directory: None,
            shell_type: None,
            recent_commands: vec![],
            directory_listing: vec![],
        }
    }

    fn suggestion() -> Suggestion {
        Suggestion {
            explanation: "typo".to_string(),
            corrected_command: "git status".to_string(),
        }
    }

    #[test]
    fn append_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::new(dir.path());
        let entry = HistoryEntry::new(&captured(), "CommandNotFound", "openai", &suggestion());
        store.append(&entry, 100).unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].corrected_command, "git status");
    }

    #[test]
    fn append_trims_to_max_entries_keeping_newest() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::new(dir.path());
        for i in 0..10 {
            let mut entry = HistoryEntry::new(&captured(), "CommandNotFound", "openai", &suggestion());
            entry.command = format!("command-{i}");
            store.append(&entry, 3).unwrap();
        }

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[0].command, "command-7");
        assert_eq!(loaded[2].command, "command-9");
    }

    #[test]
    fn clear_truncates_file() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::new(dir.path());
        let entry = HistoryEntry::new(&captured(), "CommandNotFound", "openai", &suggestion());
        store.append(&entry, 100).unwrap();

        store.clear().unwrap();
        assert!(store.load_all().unwrap().is_empty());
    }
}
