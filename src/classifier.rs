//! Error taxonomy, recovery table, and the rule-based classifier.
//!
//! [`ErrorKind`] is a closed, stably-named enumeration of shell failure
//! categories. [`classify`] maps `(exit_code, stdout, stderr)` onto exactly
//! one `ErrorKind` following a prioritized cascade: evaluation order is
//! contractual (see module-level tests) — adding a predicate to an earlier
//! bucket changes observable behavior for overlapping phrases.

use std::fmt;
use std::str::FromStr;

/// Closed enumeration of shell failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    CommandNotFound,
    FileNotFoundOrDirectory,
    PermissionDenied,
    CannotExecute,
    InvalidArgumentOrOption,
    ResourceExists,
    NotADirectory,
    TerminatedBySignal,
    NetworkError,
    DatabaseError,
    ConfigError,
    DependencyError,
    TimeoutError,
    MemoryError,
    DiskSpaceError,
    AuthenticationError,
    InteractiveToolUsage,
    GenericError,
}

impl ErrorKind {
    pub const ALL: &'static [ErrorKind] = &[
        ErrorKind::CommandNotFound,
        ErrorKind::FileNotFoundOrDirectory,
        ErrorKind::PermissionDenied,
        ErrorKind::CannotExecute,
        ErrorKind::InvalidArgumentOrOption,
        ErrorKind::ResourceExists,
        ErrorKind::NotADirectory,
        ErrorKind::TerminatedBySignal,
        ErrorKind::NetworkError,
        ErrorKind::DatabaseError,
        ErrorKind::ConfigError,
        ErrorKind::DependencyError,
        ErrorKind::TimeoutError,
        ErrorKind::MemoryError,
        ErrorKind::DiskSpaceError,
        ErrorKind::AuthenticationError,
        ErrorKind::InteractiveToolUsage,
        ErrorKind::GenericError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::CommandNotFound => "CommandNotFound",
            ErrorKind::FileNotFoundOrDirectory => "FileNotFoundOrDirectory",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::CannotExecute => "CannotExecute",
            ErrorKind::InvalidArgumentOrOption => "InvalidArgumentOrOption",
            ErrorKind::ResourceExists => "ResourceExists",
            ErrorKind::NotADirectory => "NotADirectory",
            ErrorKind::TerminatedBySignal => "TerminatedBySignal",
            ErrorKind::NetworkError => "NetworkError",
            ErrorKind::DatabaseError => "DatabaseError",
            ErrorKind::ConfigError => "ConfigError",
            ErrorKind::DependencyError => "DependencyError",
            ErrorKind::TimeoutError => "TimeoutError",
            ErrorKind::MemoryError => "MemoryError",
            ErrorKind::DiskSpaceError => "DiskSpaceError",
            ErrorKind::AuthenticationError => "AuthenticationError",
            ErrorKind::InteractiveToolUsage => "InteractiveToolUsage",
            ErrorKind::GenericError => "GenericError",
        }
    }

    /// Look up this kind's immutable recovery policy.
    pub fn recovery_strategy(&self) -> RecoveryStrategy {
        recovery_table(*self)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorKind::ALL
            .iter()
            .find(|k| k.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown error kind: {s}"))
    }
}

/// Per-kind policy: whether the retry engine should retry it, whether an
/// automatic (no-LLM) recovery is possible, and the human remediation hint.
#[derive(Debug, Clone, Copy)]
pub struct RecoveryStrategy {
    pub retryable: bool,
    pub auto_recover: bool,
    pub hint: &'static str,
}

/// The static, read-only recovery table (C1). Network, timeout, database,
/// and memory kinds are retryable; authentication, permission, and misuse
/// kinds are not.
pub fn recovery_table(kind: ErrorKind) -> RecoveryStrategy {
    match kind {
        ErrorKind::CommandNotFound => RecoveryStrategy {
            retryable: false,
            auto_recover: false,
            hint: "check spelling or install the missing command",
        },
        ErrorKind::FileNotFoundOrDirectory => RecoveryStrategy {
            retryable: false,
            auto_recover: false,
            hint: "verify the path exists and is spelled correctly",
        },
        ErrorKind::PermissionDenied => RecoveryStrategy {
            retryable: false,
            auto_recover: false,
            hint: "check file permissions or re-run with elevated privileges",
        },
        ErrorKind::CannotExecute => RecoveryStrategy {
            retryable: false,
            auto_recover: false,
            hint: "ensure the file is executable and built for this platform",
        },
        ErrorKind::InvalidArgumentOrOption => RecoveryStrategy {
            retryable: false,
            auto_recover: false,
            hint: "review the command's accepted arguments and options",
        },
        ErrorKind::ResourceExists => RecoveryStrategy {
            retryable: false,
            auto_recover: false,
            hint: "remove or rename the existing resource first",
        },
        ErrorKind::NotADirectory => RecoveryStrategy {
            retryable: false,
            auto_recover: false,
            hint: "check that the path refers to a directory",
        },
        ErrorKind::TerminatedBySignal => RecoveryStrategy {
            retryable: false,
            auto_recover: false,
            hint: "the process was killed by a signal; check system resources",
        },
        ErrorKind::NetworkError => RecoveryStrategy {
            retryable: true,
            auto_recover: true,
            hint: "check network connectivity and retry",
        },
        ErrorKind::DatabaseError => RecoveryStrategy {
            retryable: true,
            auto_recover: true,
            hint: "check the database connection and retry",
        },
        ErrorKind::ConfigError => RecoveryStrategy {
            retryable: false,
            auto_recover: false,
            hint: "review the configuration file for errors",
        },
        ErrorKind::DependencyError => RecoveryStrategy {
            retryable: false,
            auto_recover: false,
            hint: "install or update the missing dependency",
        },
        ErrorKind::TimeoutError => RecoveryStrategy {
            retryable: true,
            auto_recover: true,
            hint: "the operation timed out; retry or increase the timeout",
        },
        ErrorKind::MemoryError => RecoveryStrategy {
            retryable: true,
            auto_recover: true,
            hint: "free up memory or reduce the workload size",
        },
        ErrorKind::DiskSpaceError => RecoveryStrategy {
            retryable: false,
            auto_recover: false,
            hint: "free up disk space and retry",
        },
        ErrorKind::AuthenticationError => RecoveryStrategy {
            retryable: false,
            auto_recover: false,
            hint: "check credentials and re-authenticate",
        },
        ErrorKind::InteractiveToolUsage => RecoveryStrategy {
            retryable: false,
            auto_recover: false,
            hint: "the command printed its own usage text; no correction needed",
        },
        ErrorKind::GenericError => RecoveryStrategy {
            retryable: false,
            auto_recover: false,
            hint: "review the command output for details",
        },
    }
}

const USAGE_MARKERS: &[&str] = &[
    "Usage:",
    "usage:",
    "Try '--help' for more information",
    "Try '-h' for more information",
];

/// Exact-phrase predicates, evaluated case-sensitively in this fixed order.
/// A kind may own more than one phrase (invalid-argument/invalid-option both
/// map to `InvalidArgumentOrOption`); all of a kind's phrases share its slot
/// in the order, so the cascade's position is still a single decision point.
const EXACT_PHRASES: &[(&[&str], ErrorKind)] = &[
    (&["command not found"], ErrorKind::CommandNotFound),
    (&["No such file or directory"], ErrorKind::FileNotFoundOrDirectory),
    (&["Permission denied"], ErrorKind::PermissionDenied),
    (&["cannot execute binary file"], ErrorKind::CannotExecute),
    (&["invalid argument", "invalid option"], ErrorKind::InvalidArgumentOrOption),
    (&["File exists"], ErrorKind::ResourceExists),
    (&["is not a directory"], ErrorKind::NotADirectory),
];

/// Categorical (case-insensitive) predicate phrase lists, evaluated in this
/// fixed order after the exact-phrase bucket.
const CATEGORICAL: &[(&[&str], ErrorKind)] = &[
    (
        &["database", "sql", "connection refused by database", "db error"],
        ErrorKind::DatabaseError,
    ),
    (
        &["config file", "configuration error", "invalid config", ".yaml parse", ".json parse"],
        ErrorKind::ConfigError,
    ),
    (
        &["module not found", "package not found", "dependency", "unmet dependency", "no matching package"],
        ErrorKind::DependencyError,
    ),
    (
        &["out of memory", "memory error", "oom", "cannot allocate memory"],
        ErrorKind::MemoryError,
    ),
    (
        &["no space left on device", "disk full", "disk quota exceeded"],
        ErrorKind::DiskSpaceError,
    ),
    (
        &["authentication failed", "unauthorized", "invalid credentials", "auth error", "401"],
        ErrorKind::AuthenticationError,
    ),
    (
        &["network is unreachable", "could not resolve host", "connection timed out", "network error", "dns"],
        ErrorKind::NetworkError,
    ),
    (&["timed out", "timeout", "deadline exceeded"], ErrorKind::TimeoutError),
];

/// Classify a captured shell failure. The concatenation examined is
/// `stderr` followed by `stdout` (stderr first), matching the source
/// behavior of preferring stderr's diagnostic text.
pub fn classify(exit_code: i32, stdout: &str, stderr: &str) -> ErrorKind {
    let combined = format!("{stderr}{stdout}");

    if USAGE_MARKERS.iter().any(|m| combined.contains(m)) {
        return ErrorKind::InteractiveToolUsage;
    }

    for (phrases, kind) in EXACT_PHRASES {
        if phrases.iter().any(|p| combined.contains(p)) {
            return *kind;
        }
    }

    let lower = combined.to_lowercase();
    for (phrases, kind) in CATEGORICAL {
        if phrases.iter().any(|p| lower.contains(p)) {
            return *kind;
        }
    }

    if exit_code > 128 {
        return ErrorKind::TerminatedBySignal;
    }

    ErrorKind::GenericError
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_not_found_wins_regardless_of_exit_code() {
        for code in [0, 1, 127, 130, 255] {
            assert_eq!(
                classify(code, "", "zsh: command not found: gti\n"),
                ErrorKind::CommandNotFound
            );
        }
    }

    #[test]
    fn classify_is_total_over_all_kinds() {
        // Fuzz-ish sweep: every combination returns *some* ErrorKind (the
        // function's return type already guarantees this at compile time,
        // but we also check it never panics on odd inputs).
        let samples = [
            (0, "", ""),
            (1, "weird \0 bytes", "more \0 bytes"),
            (-1, "", ""),
            (255, "😀", "😀"),
        ];
        for (code, out, err) in samples {
            let _ = classify(code, out, err);
        }
    }

    #[test]
    fn usage_marker_short_circuits_everything_else() {
        let kind = classify(2, "", "Usage: grep [OPTION]... PATTERNS [FILE]...\ncommand not found");
        assert_eq!(kind, ErrorKind::InteractiveToolUsage);
    }

    #[test]
    fn file_not_found() {
        assert_eq!(
            classify(1, "", "cat: missing.txt: No such file or directory"),
            ErrorKind::FileNotFoundOrDirectory
        );
    }

    #[test]
    fn permission_denied_exact_case_wins_over_auth_bucket() {
        // "Permission denied" is in the exact-phrase bucket (step 1); the
        // authentication categorical bucket (step 2, case-insensitive)
        // would also match "denied" if reached, but step 1 wins first.
        assert_eq!(
            classify(1, "", "bash: ./script.sh: Permission denied"),
            ErrorKind::PermissionDenied
        );
    }

    #[test]
    fn invalid_argument_and_invalid_option_both_map_to_invalid_argument_kind() {
        assert_eq!(
            classify(1, "", "error: invalid argument '--foo'"),
            ErrorKind::InvalidArgumentOrOption
        );
        assert_eq!(
            classify(1, "", "error: invalid option -- 'z'"),
            ErrorKind::InvalidArgumentOrOption
        );
    }

    #[test]
    fn command_not_found_wins_over_invalid_argument_when_both_present() {
        assert_eq!(
            classify(1, "", "invalid argument: command not found"),
            ErrorKind::CommandNotFound
        );
    }

    #[test]
    fn categorical_network_error_is_case_insensitive() {
        assert_eq!(
            classify(1, "", "CONNECTION TIMED OUT while reaching host"),
            ErrorKind::TimeoutError
        );
        assert_eq!(
            classify(1, "", "curl: Could Not Resolve Host: example.com"),
            ErrorKind::NetworkError
        );
    }

    #[test]
    fn signal_termination_above_128_when_nothing_else_matches() {
        assert_eq!(classify(137, "", ""), ErrorKind::TerminatedBySignal);
        assert_eq!(classify(139, "out", "err"), ErrorKind::TerminatedBySignal);
    }

    #[test]
    fn fallback_is_generic_error() {
        assert_eq!(classify(1, "", "something unexpected happened"), ErrorKind::GenericError);
        assert_eq!(classify(0, "", ""), ErrorKind::GenericError);
    }

    #[test]
    fn error_kind_round_trips_through_display_and_from_str() {
        for kind in ErrorKind::ALL {
            let s = kind.to_string();
            let parsed: ErrorKind = s.parse().unwrap();
            assert_eq!(parsed, *kind);
        }
    }

    #[test]
    fn recovery_table_marks_network_timeout_database_memory_retryable() {
        assert!(recovery_table(ErrorKind::NetworkError).retryable);
        assert!(recovery_table(ErrorKind::TimeoutError).retryable);
        assert!(recovery_table(ErrorKind::DatabaseError).retryable);
        assert!(recovery_table(ErrorKind::MemoryError).retryable);
    }

    #[test]
    fn recovery_table_marks_auth_permission_misuse_non_retryable() {
        assert!(!recovery_table(ErrorKind::AuthenticationError).retryable);
        assert!(!recovery_table(ErrorKind::PermissionDenied).retryable);
        assert!(!recovery_table(ErrorKind::InvalidArgumentOrOption).retryable);
    }
}
