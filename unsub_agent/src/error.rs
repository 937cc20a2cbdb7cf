//! Error types for unsub_agent.

use crate::mailbox::MailboxError;
use std::fmt;

/// Agent error types.
#[derive(Debug)]
pub enum AgentError {
    /// HTTP request failed.
    Http(reqwest::Error),
    /// JSON serialization/deserialization error.
    Json(serde_json::Error),
    /// Feature not enabled or configured.
    NotConfigured(&'static str),
    /// LLM provider error.
    Llm(String),
    /// The LLM stream finished without any text.
    EmptyResponse,
    /// Browser automation error.
    Browser(String),
    /// A page operation was attempted on a controller that is not running.
    NotLaunched,
    /// IO error (artifact files).
    Io(std::io::Error),
    /// Mailbox provider error.
    Mailbox(MailboxError),
    /// Email store error.
    Store(String),
    /// Rate limit exceeded.
    RateLimited,
    /// Timeout.
    Timeout,
}

impl AgentError {
    /// Transport and rate-limit failures are worth retrying; parse errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_connect() || e.is_request() || e.status().is_some_and(|s| s.is_server_error()),
            Self::RateLimited | Self::Timeout => true,
            _ => false,
        }
    }
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(e) => write!(f, "HTTP error: {}", e),
            Self::Json(e) => write!(f, "JSON error: {}", e),
            Self::NotConfigured(what) => write!(f, "Not configured: {}", what),
            Self::Llm(msg) => write!(f, "LLM error: {}", msg),
            Self::EmptyResponse => write!(f, "LLM returned an empty response"),
            Self::Browser(msg) => write!(f, "Browser error: {}", msg),
            Self::NotLaunched => write!(f, "Page controller is not launched"),
            Self::Io(e) => write!(f, "IO error: {}", e),
            Self::Mailbox(e) => write!(f, "Mailbox error: {}", e),
            Self::Store(msg) => write!(f, "Store error: {}", msg),
            Self::RateLimited => write!(f, "Rate limit exceeded"),
            Self::Timeout => write!(f, "Request timed out"),
        }
    }
}

impl std::error::Error for AgentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Http(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::Mailbox(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(e)
        }
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<std::io::Error> for AgentError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<MailboxError> for AgentError {
    fn from(e: MailboxError) -> Self {
        match e {
            MailboxError::QuotaExceeded => Self::RateLimited,
            other => Self::Mailbox(other),
        }
    }
}

impl From<tokio::time::error::Elapsed> for AgentError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::Timeout
    }
}

#[cfg(feature = "chrome")]
impl From<chromiumoxide::error::CdpError> for AgentError {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        match e {
            chromiumoxide::error::CdpError::Timeout => Self::Timeout,
            other => Self::Browser(other.to_string()),
        }
    }
}

/// Result type for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_error_display_variants() {
        let err = AgentError::Store("no email 42".into());
        assert_eq!(format!("{}", err), "Store error: no email 42");

        let err = AgentError::NotConfigured("api_key");
        assert_eq!(format!("{}", err), "Not configured: api_key");

        let err = AgentError::Llm("model not found".into());
        assert_eq!(format!("{}", err), "LLM error: model not found");

        let err = AgentError::NotLaunched;
        assert_eq!(format!("{}", err), "Page controller is not launched");

        let err = AgentError::RateLimited;
        assert_eq!(format!("{}", err), "Rate limit exceeded");

        let err = AgentError::Timeout;
        assert_eq!(format!("{}", err), "Request timed out");
    }

    #[test]
    fn test_from_mailbox_error() {
        let err: AgentError = MailboxError::NoAccessToken("acct-1".into()).into();
        assert!(format!("{}", err).starts_with("Mailbox error:"));

        let err: AgentError = MailboxError::QuotaExceeded.into();
        assert!(matches!(err, AgentError::RateLimited));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_parse_errors_are_not_retryable() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let agent_err: AgentError = json_err.into();
        assert!(!agent_err.is_retryable());
        assert!(!AgentError::EmptyResponse.is_retryable());
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error;

        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let agent_err = AgentError::Json(json_err);
        assert!(agent_err.source().is_some());

        let io_err = AgentError::Io(std::io::Error::other("disk"));
        assert!(io_err.source().is_some());

        let store_err = AgentError::Store("gone".into());
        assert!(store_err.source().is_none());
    }
}
