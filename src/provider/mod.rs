//! Provider abstraction (C8): a uniform async contract over per-backend
//! adapters (C9). Every adapter honors cancellation and maps transport/HTTP
//! failures into the crate's [`crate::error::ErrorCode`] taxonomy; none of
//! them retry internally — that's the retry engine's job one layer up.

mod factory;
mod gemini;
mod gemini_cloud_code;
mod generic_chat;
mod openai;

pub use factory::build;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::capture::CapturedContext;
use crate::error::Error;

/// A corrected command plus a one-line explanation, as returned by
/// [`Provider::get_suggestion`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub explanation: String,
    pub corrected_command: String,
}

/// The uniform async contract every backend adapter implements.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Ask the provider to explain and correct a captured shell failure.
    async fn get_suggestion(
        &self,
        captured: &CapturedContext,
        language: &str,
        cancel: &CancellationToken,
    ) -> Result<Suggestion, Error>;

    /// Turn a free-form natural-language prompt into a single shell command.
    async fn generate_command(
        &self,
        prompt: &str,
        language: &str,
        cancel: &CancellationToken,
    ) -> Result<String, Error>;

    /// Confirm credentials and connectivity; returns the model catalog on
    /// success so callers can surface it without a second round-trip.
    async fn verify_connection(&self, cancel: &CancellationToken) -> Result<Vec<String>, Error>;

    /// List available models, deduplicated and sorted lexicographically.
    async fn get_available_models(&self, cancel: &CancellationToken) -> Result<Vec<String>, Error>;
}

/// Shared HTTP transport defaults: a 30-second timeout unless narrowed by
/// the caller's cancellation/deadline.
pub(crate) fn http_client() -> Result<reqwest::Client, Error> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .map_err(|e| crate::error::Error::internal(crate::error::ErrorCode::ProviderInit, "failed to build HTTP client")
            .with_details(e.to_string()))
}

/// OpenAI-compatible endpoints tolerate an omitted `/v1` prefix: if the
/// configured endpoint's path already contains a `/v<digits>` segment, the
/// route is appended as-is; otherwise `/v1` is inserted before it. This
/// intentionally over-matches a literal `/version` segment — documented
/// here rather than special-cased, per the resolved open question in
/// `SPEC_FULL.md`.
pub(crate) fn join_endpoint(base: &str, route: &str, omit_v1_prefix: bool) -> String {
    let base = base.trim_end_matches('/');
    let route = route.trim_start_matches('/');

    let has_version_segment = {
        static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        let re = RE.get_or_init(|| regex::Regex::new(r"/v[^/]*(/|$)").unwrap());
        re.is_match(base)
    };

    if omit_v1_prefix || has_version_segment {
        format!("{base}/{route}")
    } else {
        format!("{base}/v1/{route}")
    }
}

/// Send a request built by `build`, retrying once with the opposite HTTP
/// verb (GET&lt;-&gt;POST) if the first attempt comes back 405 Method Not
/// Allowed. Used by `get_available_models` across adapters whose catalog
/// endpoint's accepted verb isn't guaranteed by the backend.
pub(crate) async fn send_with_verb_fallback<F>(
    method: reqwest::Method,
    cancel: &CancellationToken,
    build: F,
) -> Result<reqwest::Response, Error>
where
    F: Fn(reqwest::Method) -> reqwest::RequestBuilder,
{
    let response = tokio::select! {
        result = build(method.clone()).send() => result?,
        _ = cancel.cancelled() => return Err(Error::new(crate::error::ErrorCode::UserCancel, "request cancelled")),
    };

    if response.status() == reqwest::StatusCode::METHOD_NOT_ALLOWED {
        let opposite = if method == reqwest::Method::GET {
            reqwest::Method::POST
        } else {
            reqwest::Method::GET
        };
        let retried = tokio::select! {
            result = build(opposite).send() => result?,
            _ = cancel.cancelled() => return Err(Error::new(crate::error::ErrorCode::UserCancel, "request cancelled")),
        };
        return Ok(retried);
    }

    Ok(response)
}

/// Resolve an HTTP status code to an [`crate::error::ErrorCode`] per the
/// shared adapter error-mapping table.
pub(crate) fn map_status(status: reqwest::StatusCode, body: &str) -> Error {
    use crate::error::ErrorCode;
    match status.as_u16() {
        401 | 403 => Error::new(ErrorCode::ProviderAuth, "provider rejected credentials").with_details(body.to_string()),
        429 => Error::retryable(ErrorCode::ProviderQuota, "provider rate limit exceeded").with_details(body.to_string()),
        500..=599 => Error::retryable(ErrorCode::ProviderRequest, "provider returned a server error")
            .with_details(format!("status {status}: {body}")),
        _ => Error::new(ErrorCode::ProviderResponse, "provider returned an unexpected status")
            .with_details(format!("status {status}: {body}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_endpoint_inserts_v1_when_no_version_segment() {
        assert_eq!(
            join_endpoint("https://api.openai.com", "chat/completions", false),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn join_endpoint_skips_v1_when_version_segment_present() {
        assert_eq!(
            join_endpoint("https://api.openai.com/v1", "chat/completions", false),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn join_endpoint_respects_explicit_omit_flag() {
        assert_eq!(
            join_endpoint("https://my-gateway.internal", "chat/completions", true),
            "https://my-gateway.internal/chat/completions"
        );
    }

    #[test]
    fn join_endpoint_overmatches_version_word_by_design() {
        assert_eq!(
            join_endpoint("https://api.example.com/version2", "models", false),
            "https://api.example.com/version2/models"
        );
    }

    #[test]
    fn map_status_maps_auth_and_quota_and_server_errors() {
        use crate::error::ErrorCode;
        assert_eq!(map_status(reqwest::StatusCode::UNAUTHORIZED, "").code, ErrorCode::ProviderAuth);
        assert_eq!(map_status(reqwest::StatusCode::TOO_MANY_REQUESTS, "").code, ErrorCode::ProviderQuota);
        assert!(map_status(reqwest::StatusCode::TOO_MANY_REQUESTS, "").retryable);
        assert_eq!(map_status(reqwest::StatusCode::BAD_GATEWAY, "").code, ErrorCode::ProviderRequest);
        assert!(map_status(reqwest::StatusCode::BAD_GATEWAY, "").retryable);
    }
}
