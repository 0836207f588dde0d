use std::fmt;

use strategy_types::{Error as CoreError, ErrorCode};

/// Terminal failure from the external query platform (§7 "External adapter
/// ... surfaces a typed `WDKError` for terminal failures"). Transient
/// failures never reach callers as this type — they're retried inside
/// [`crate::client::RetryingClient`] and only this, the last attempt's
/// outcome, is ever returned.
#[derive(Debug, Clone, PartialEq)]
pub enum WdkError {
    /// The platform responded with a non-retryable status, or attempts were
    /// exhausted on a retryable one.
    Status { status: u16, message: String },
    /// Transport-level failure (connect/timeout/decode) with no status.
    Transport(String),
    /// The caller's deadline/cancellation fired before a response arrived.
    Cancelled,
}

impl fmt::Display for WdkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WdkError::Status { status, message } => write!(f, "platform returned {status}: {message}"),
            WdkError::Transport(msg) => write!(f, "transport error: {msg}"),
            WdkError::Cancelled => f.write_str("request cancelled"),
        }
    }
}

impl std::error::Error for WdkError {}

impl From<WdkError> for CoreError {
    fn from(err: WdkError) -> Self {
        match err {
            WdkError::Cancelled => CoreError::new(ErrorCode::Cancelled, err.to_string()),
            other => CoreError::new(ErrorCode::External, other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, WdkError>;
