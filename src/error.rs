//! Structured error model for the shell companion.
//!
//! Every fallible operation in this crate returns an [`Error`], a single
//! enum carrying a stable `code`, a human message, an optional `details`
//! string, an optional cause chain, and a free-form context map. Errors
//! compose by wrapping: [`Error::wrap`] preserves the original error as
//! `source()` so the full chain survives to the log sink.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;
use thiserror::Error as ThisError;

use crate::classifier::ErrorKind;

/// Result type alias used across the crate's public APIs.
pub type Result<T> = std::result::Result<T, Error>;

/// Stable error codes. Distinct from [`ErrorKind`] (which classifies a
/// *captured shell failure*): `ErrorCode` classifies a failure inside the
/// tool itself. A subset of codes maps 1:1 onto an `ErrorKind` so the
/// recovery table (`classifier::recovery_strategy`) can be reused for
/// user-facing hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // configuration
    ConfigLoad,
    ConfigSave,
    ConfigValidation,
    ConfigMissing,
    // provider
    ProviderInit,
    ProviderNotFound,
    ProviderRequest,
    ProviderResponse,
    ProviderAuth,
    ProviderQuota,
    // hook
    HookInstall,
    HookUninstall,
    HookExecution,
    // history
    HistoryLoad,
    HistorySave,
    HistoryClear,
    // context enhancement
    ContextEnhance,
    ContextRead,
    // user
    UserInput,
    UserCancel,
    // cache
    CacheRead,
    CacheWrite,
    CacheGeneric,
    // system
    Network,
    Timeout,
    Permission,
    Filesystem,
    // reliability
    CircuitOpen,
    // fallthrough
    Internal,
}

impl ErrorCode {
    /// Stable uppercase-snake string identity, used in `Error::to_string()`
    /// and in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigLoad => "CONFIG_LOAD",
            ErrorCode::ConfigSave => "CONFIG_SAVE",
            ErrorCode::ConfigValidation => "CONFIG_VALIDATION",
            ErrorCode::ConfigMissing => "CONFIG_MISSING",
            ErrorCode::ProviderInit => "PROVIDER_INIT",
            ErrorCode::ProviderNotFound => "PROVIDER_NOT_FOUND",
            ErrorCode::ProviderRequest => "PROVIDER_REQUEST",
            ErrorCode::ProviderResponse => "PROVIDER_RESPONSE",
            ErrorCode::ProviderAuth => "PROVIDER_AUTH",
            ErrorCode::ProviderQuota => "PROVIDER_QUOTA",
            ErrorCode::HookInstall => "HOOK_INSTALL",
            ErrorCode::HookUninstall => "HOOK_UNINSTALL",
            ErrorCode::HookExecution => "HOOK_EXECUTION",
            ErrorCode::HistoryLoad => "HISTORY_LOAD",
            ErrorCode::HistorySave => "HISTORY_SAVE",
            ErrorCode::HistoryClear => "HISTORY_CLEAR",
            ErrorCode::ContextEnhance => "CONTEXT_ENHANCE",
            ErrorCode::ContextRead => "CONTEXT_READ",
            ErrorCode::UserInput => "USER_INPUT",
            ErrorCode::UserCancel => "USER_CANCEL",
            ErrorCode::CacheRead => "CACHE_READ",
            ErrorCode::CacheWrite => "CACHE_WRITE",
            ErrorCode::CacheGeneric => "CACHE_GENERIC",
            ErrorCode::Network => "NETWORK",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Permission => "PERMISSION",
            ErrorCode::Filesystem => "FILESYSTEM",
            ErrorCode::CircuitOpen => "CIRCUIT_OPEN",
            ErrorCode::Internal => "INTERNAL",
        }
    }

    /// Process exit code per the exit-code mapping in the error model spec.
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorCode::UserCancel => 130,
            ErrorCode::ConfigLoad
            | ErrorCode::ConfigSave
            | ErrorCode::ConfigValidation
            | ErrorCode::ConfigMissing => 78,
            ErrorCode::Permission => 77,
            ErrorCode::ProviderAuth => 79,
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The crate's single structured error type.
///
/// `Error` is intentionally flat (not an enum-per-variant like a typical
/// `thiserror` type) because every call site needs the same four knobs:
/// a stable code, retryability, whether it's safe to show the user, and
/// a cause chain. A `#[derive(ThisError)]` enum would force the code to
/// be reconstructed from the variant at every call site instead of
/// carried as data.
#[derive(Debug, ThisError)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: String,
    pub retryable: bool,
    pub user_facing: bool,
    pub context: HashMap<String, Value>,
    pub stack: Option<String>,
    #[source]
    pub cause: Option<Box<Error>>,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.details.is_empty() {
            write!(f, "{}: {}", self.code, self.message)
        } else {
            write!(f, "{}: {} ({})", self.code, self.message, self.details)
        }
    }
}

impl Error {
    /// A user-facing, non-retryable error. The common case for misuse and
    /// validation failures.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: String::new(),
            retryable: false,
            user_facing: true,
            context: HashMap::new(),
            stack: None,
            cause: None,
        }
    }

    /// An internal error: logged, never rendered to the user directly.
    pub fn internal(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            user_facing: false,
            ..Self::new(code, message)
        }
    }

    /// A retryable error (network blips, 5xx, timeouts).
    pub fn retryable(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            retryable: true,
            ..Self::new(code, message)
        }
    }

    /// Wrap a cause under a new code/message. Returns `None` if `cause` is
    /// `None`, mirroring the source implementation's `WrapError` contract
    /// (wrapping a nil error is a no-op, not an empty error).
    pub fn wrap(cause: Option<Error>, code: ErrorCode, message: impl Into<String>) -> Option<Self> {
        cause.map(|c| Self {
            cause: Some(Box::new(c)),
            ..Self::new(code, message)
        })
    }

    pub fn with_cause(mut self, cause: Error) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_stack(mut self, point: impl Into<String>) -> Self {
        self.stack = Some(point.into());
        self
    }

    pub fn retryable_flag(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn user_facing_flag(mut self, user_facing: bool) -> Self {
        self.user_facing = user_facing;
        self
    }

    pub fn has_code(&self, code: ErrorCode) -> bool {
        self.code == code
    }

    /// Walk the cause chain depth-first, innermost first.
    pub fn cause_chain(&self) -> Vec<&Error> {
        let mut chain = Vec::new();
        let mut cur = self.cause.as_deref();
        while let Some(e) = cur {
            chain.push(e);
            cur = e.cause.as_deref();
        }
        chain
    }

    pub fn exit_code(&self) -> i32 {
        self.code.exit_code()
    }

    /// Derive an `Error` from a classified shell failure, wiring in the
    /// recovery table's retryability so the retry engine and circuit
    /// breaker see a consistent signal.
    pub fn from_error_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let strategy = kind.recovery_strategy();
        Self {
            retryable: strategy.retryable,
            ..Self::new(ErrorCode::Internal, message)
        }
        .with_context("error_kind", kind.as_str())
    }
}

impl PartialEq for ErrorCode {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}
impl Eq for ErrorCode {}

/// Free functions mirroring the spec's helper names, for callers that
/// prefer `error::is_aish_error(&e)` style checks over inherent methods.
/// `true` only when `err`'s concrete type is this crate's [`Error`].
pub fn is_aish_error<E: std::error::Error + 'static>(err: &E) -> bool {
    (err as &dyn std::any::Any).is::<Error>()
}

pub fn has_code(err: &Error, code: ErrorCode) -> bool {
    err.has_code(code)
}

pub fn is_retryable_error(err: &Error) -> bool {
    err.retryable
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::retryable(ErrorCode::Timeout, "request timed out").with_details(e.to_string())
        } else if e.is_connect() {
            Error::retryable(ErrorCode::Network, "connection failed").with_details(e.to_string())
        } else {
            Error::retryable(ErrorCode::ProviderRequest, "http request failed")
                .with_details(e.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::new(ErrorCode::ProviderResponse, "invalid JSON").with_details(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::internal(ErrorCode::Filesystem, "filesystem error").with_details(e.to_string())
    }
}
