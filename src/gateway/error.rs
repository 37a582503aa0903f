//! Error types for the model gateway.

use std::time::Duration;
use thiserror::Error;

/// Additional context from provider errors for debugging.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// HTTP status code from the provider.
    pub http_status: Option<u16>,
    /// Provider-specific signal code (e.g. "RESOURCE_EXHAUSTED", "SAFETY").
    pub provider_code: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }
}

/// Errors that can occur when calling a model provider.
///
/// The taxonomy is closed: adapters classify provider-specific signals into
/// these variants via their signal map, and nothing downstream inspects
/// provider strings.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Provider refused on content-policy grounds. Recovered by a one-shot
    /// fallback to the secondary model; never fatal.
    #[error("restricted: {reason}")]
    Restricted {
        reason: String,
        context: Option<ErrorContext>,
    },

    /// Throttled. Recovered by bounded retry with backoff and jitter.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Provider-suggested delay, when it sent one.
        retry_after: Option<Duration>,
        context: Option<ErrorContext>,
    },

    /// Response body present but unreadable or structurally empty. Non-fatal,
    /// never retried.
    #[error("malformed response: {message}")]
    Malformed {
        message: String,
        context: Option<ErrorContext>,
    },

    /// Other provider-side failure; may be retryable (5xx).
    #[error("{provider} error: {message}")]
    Provider {
        provider: &'static str,
        message: String,
        retryable: bool,
        context: Option<ErrorContext>,
    },

    /// HTTP/network error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error (missing API key, etc.).
    #[error("configuration error: {0}")]
    Config(String),
}

impl ProviderError {
    pub fn restricted(reason: impl Into<String>) -> Self {
        Self::Restricted {
            reason: reason.into(),
            context: None,
        }
    }

    pub fn restricted_with_context(reason: impl Into<String>, context: ErrorContext) -> Self {
        Self::Restricted {
            reason: reason.into(),
            context: Some(context),
        }
    }

    pub fn rate_limited(retry_after: Option<Duration>, context: ErrorContext) -> Self {
        Self::RateLimited {
            retry_after,
            context: Some(context),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
            context: None,
        }
    }

    pub fn provider(provider: &'static str, message: impl Into<String>, retryable: bool) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
            retryable,
            context: None,
        }
    }

    pub fn provider_with_context(
        provider: &'static str,
        message: impl Into<String>,
        retryable: bool,
        context: ErrorContext,
    ) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
            retryable,
            context: Some(context),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether the invoker may retry the same model after this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Restricted { .. } => false,
            Self::RateLimited { .. } => true,
            Self::Malformed { .. } => false,
            Self::Provider { retryable, .. } => *retryable,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Config(_) => false,
        }
    }

    /// Provider-suggested retry delay, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Short error code for logging and usage records.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Restricted { .. } => "restricted",
            Self::RateLimited { .. } => "rate_limited",
            Self::Malformed { .. } => "malformed",
            Self::Provider { .. } => "provider_error",
            Self::Http(_) => "http_error",
            Self::Config(_) => "config_error",
        }
    }

    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::Restricted { context, .. } => context.as_ref(),
            Self::RateLimited { context, .. } => context.as_ref(),
            Self::Malformed { context, .. } => context.as_ref(),
            Self::Provider { context, .. } => context.as_ref(),
            Self::Http(_) => None,
            Self::Config(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_matches_taxonomy() {
        assert!(!ProviderError::restricted("SAFETY").is_retryable());
        assert!(ProviderError::rate_limited(None, ErrorContext::new()).is_retryable());
        assert!(!ProviderError::malformed("empty body").is_retryable());
        assert!(ProviderError::provider("gemini", "500", true).is_retryable());
        assert!(!ProviderError::provider("gemini", "400", false).is_retryable());
    }

    #[test]
    fn retry_after_only_on_rate_limit() {
        let err = ProviderError::rate_limited(
            Some(Duration::from_secs(30)),
            ErrorContext::new().with_status(429),
        );
        assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));
        assert_eq!(ProviderError::restricted("x").retry_after(), None);
    }
}
