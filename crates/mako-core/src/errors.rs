use std::time::Duration;

/// Typed failures of a model backend call.
/// Classifies errors as fatal (don't retry) or retryable.
#[derive(Clone, Debug, thiserror::Error)]
pub enum GatewayError {
    // Fatal
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    // Retryable
    /// Carries the response body, which may be empty.
    #[error("rate limited{}", detail(.0))]
    RateLimited(String),
    #[error("server error {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("provider overloaded{}", detail(.0))]
    ProviderOverloaded(String),
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    /// Error envelope embedded in an otherwise successful HTTP response.
    #[error("{message}")]
    Backend { code: Option<i64>, message: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl GatewayError {
    /// Backend envelopes are treated like transport failures: the backend
    /// reports quota and load problems through them.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_)
                | Self::ServerError { .. }
                | Self::ProviderOverloaded(_)
                | Self::NetworkError(_)
                | Self::Timeout(_)
                | Self::Backend { .. }
                | Self::MalformedResponse(_)
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AuthenticationFailed(_) | Self::InvalidRequest(_))
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::InvalidRequest(_) => "invalid_request",
            Self::RateLimited(_) => "rate_limited",
            Self::ServerError { .. } => "server_error",
            Self::ProviderOverloaded(_) => "provider_overloaded",
            Self::NetworkError(_) => "network_error",
            Self::Timeout(_) => "timeout",
            Self::Backend { .. } => "backend_error",
            Self::MalformedResponse(_) => "malformed_response",
        }
    }

    /// Classify a non-success HTTP status code.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed(body),
            400 | 404 | 422 => Self::InvalidRequest(body),
            429 => Self::RateLimited(body),
            529 => Self::ProviderOverloaded(body),
            500..=599 => Self::ServerError { status, body },
            _ => Self::InvalidRequest(format!("unexpected status {status}: {body}")),
        }
    }
}

fn detail(body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        String::new()
    } else {
        format!(": {body}")
    }
}
