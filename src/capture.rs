//! Capture protocol (C11): the contract by which an external shell hook
//! delivers a failed command's context to the core.
//!
//! The hook sets a handful of environment variables and writes stdout/
//! stderr to files it owns during the write; the core reads and truncates
//! them. The protocol forbids simultaneous access — if the core observes
//! a file still growing, it waits briefly for the hook to finish.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;

pub const MAX_CAPTURE_BYTES: usize = 200_000;
const TRUNCATION_MARKER: &str = "... truncated ...\n";
const PARTIAL_FILE_POLL_INTERVAL: Duration = Duration::from_millis(20);
const PARTIAL_FILE_MAX_WAIT: Duration = Duration::from_millis(100);

/// A captured shell failure, as read from the hook's capture files and
/// environment-provided enhancements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedContext {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub working_directory: Option<String>,
    pub shell_type: Option<String>,
    pub recent_commands: Vec<String>,
    pub directory_listing: Vec<String>,
}

/// Environment-variable contract recognized by the capture path.
pub struct HookEnv {
    pub state_dir: Option<PathBuf>,
    pub stdout_file: Option<PathBuf>,
    pub stderr_file: Option<PathBuf>,
    pub capture_off: bool,
    pub hook_disabled: bool,
    pub skip_command_patterns: Vec<String>,
    pub skip_all_user_commands: bool,
    pub system_dir_whitelist: Vec<PathBuf>,
}

impl HookEnv {
    pub fn from_process_env() -> Self {
        Self {
            state_dir: std::env::var("AISH_STATE_DIR").ok().map(PathBuf::from),
            stdout_file: std::env::var("AISH_STDOUT_FILE").ok().map(PathBuf::from),
            stderr_file: std::env::var("AISH_STDERR_FILE").ok().map(PathBuf::from),
            capture_off: env_flag("AISH_CAPTURE_OFF"),
            hook_disabled: env_flag("AISH_HOOK_DISABLED"),
            skip_command_patterns: std::env::var("AISH_SKIP_COMMAND_PATTERNS")
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            skip_all_user_commands: env_flag("AISH_SKIP_ALL_USER_COMMANDS"),
            system_dir_whitelist: std::env::var("AISH_SYSTEM_DIR_WHITELIST")
                .map(|v| {
                    v.split([':', ';'])
                        .filter(|s| !s.is_empty())
                        .map(PathBuf::from)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

/// Why the capture path should bail out silently without invoking a
/// provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    HookDisabledOrCaptureOff,
    CommandPatternMatch,
    NonWhitelistedBinary,
}

/// Apply the skip-logic cascade from the module docs. `resolved_binary`
/// is the absolute path the command would execute, used for the
/// system-directory whitelist check.
pub fn should_skip(env: &HookEnv, command: &str, resolved_binary: Option<&Path>) -> Option<SkipReason> {
    if env.hook_disabled || env.capture_off {
        return Some(SkipReason::HookDisabledOrCaptureOff);
    }

    if env
        .skip_command_patterns
        .iter()
        .any(|pattern| glob_match(pattern, command))
    {
        return Some(SkipReason::CommandPatternMatch);
    }

    if env.skip_all_user_commands {
        let outside_whitelist = match resolved_binary {
            Some(binary) => !env.system_dir_whitelist.iter().any(|dir| binary.starts_with(dir)),
            None => true,
        };
        if outside_whitelist {
            return Some(SkipReason::NonWhitelistedBinary);
        }
    }

    None
}

/// Minimal glob matcher supporting a single trailing `*` wildcard, the
/// common case for skip patterns like `git *` or `ssh*`.
fn glob_match(pattern: &str, command: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => command.starts_with(prefix),
        None => command == pattern,
    }
}

/// Read a capture file, waiting briefly if it appears to still be
/// growing, then truncate it to ≤ [`MAX_CAPTURE_BYTES`] from the tail
/// with a leading marker when truncated. Returns an empty string if the
/// path doesn't exist (the stream produced no output).
pub async fn read_and_truncate(path: &Path) -> Result<String, Error> {
    if !path.exists() {
        return Ok(String::new());
    }

    wait_for_stable_size(path).await;

    let bytes = std::fs::read(path)?;
    std::fs::write(path, [])?;

    if bytes.len() <= MAX_CAPTURE_BYTES {
        return Ok(String::from_utf8_lossy(&bytes).into_owned());
    }

    let tail_start = bytes.len() - MAX_CAPTURE_BYTES;
    let tail = String::from_utf8_lossy(&bytes[tail_start..]);
    Ok(format!("{TRUNCATION_MARKER}{tail}"))
}

async fn wait_for_stable_size(path: &Path) {
    let deadline = tokio::time::Instant::now() + PARTIAL_FILE_MAX_WAIT;
    let mut last_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

    loop {
        tokio::time::sleep(PARTIAL_FILE_POLL_INTERVAL).await;
        let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        if size == last_size || tokio::time::Instant::now() >= deadline {
            return;
        }
        last_size = size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn skip_when_hook_disabled() {
        let env = HookEnv {
            state_dir: None,
            stdout_file: None,
            stderr_file: None,
            capture_off: false,
            hook_disabled: true,
            skip_command_patterns: vec![],
            skip_all_user_commands: false,
            system_dir_whitelist: vec![],
        };
        assert_eq!(should_skip(&env, "ls", None), Some(SkipReason::HookDisabledOrCaptureOff));
    }

    #[test]
    fn skip_on_command_pattern_match() {
        let env = HookEnv {
            state_dir: None,
            stdout_file: None,
            stderr_file: None,
            capture_off: false,
            hook_disabled: false,
            skip_command_patterns: vec!["ssh*".to_string()],
            skip_all_user_commands: false,
            system_dir_whitelist: vec![],
        };
        assert_eq!(should_skip(&env, "ssh myhost", None), Some(SkipReason::CommandPatternMatch));
        assert_eq!(should_skip(&env, "ls", None), None);
    }

    #[test]
    fn skip_non_whitelisted_binary_when_skip_all_set() {
        let env = HookEnv {
            state_dir: None,
            stdout_file: None,
            stderr_file: None,
            capture_off: false,
            hook_disabled: false,
            skip_command_patterns: vec![],
            skip_all_user_commands: true,
            system_dir_whitelist: vec![PathBuf::from("/usr/bin")],
        };
        assert_eq!(
            should_skip(&env, "mytool", Some(Path::new("/home/user/bin/mytool"))),
            Some(SkipReason::NonWhitelistedBinary)
        );
        assert_eq!(should_skip(&env, "ls", Some(Path::new("/usr/bin/ls"))), None);
    }

    #[tokio::test]
    async fn read_and_truncate_returns_empty_for_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("does-not-exist");
        assert_eq!(read_and_truncate(&path).await.unwrap(), "");
    }

    #[tokio::test]
    async fn read_and_truncate_reads_then_empties_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stderr");
        std::fs::write(&path, "boom\n").unwrap();

        let content = read_and_truncate(&path).await.unwrap();
        assert_eq!(content, "boom\n");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }

    #[tokio::test]
    async fn read_and_truncate_keeps_tail_and_prepends_marker_when_oversized() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stdout");
        let big = "x".repeat(MAX_CAPTURE_BYTES + 1000);
        std::fs::write(&path, &big).unwrap();

        let content = read_and_truncate(&path).await.unwrap();
        assert!(content.starts_with("... truncated ..."));
        assert!(content.len() < big.len());
    }
}
