//! Step compiler and retrying client for the external WDK-style query
//! platform (C2, C3).

mod client;
mod compiler;
mod error;
mod models;
mod retry;

pub use client::{BooleanSearchInfo, PlatformClient, RetryingClient, DEFAULT_TIMEOUT, STRATEGY_TIMEOUT};
pub use compiler::{compile, CompileOutput};
pub use error::{Result as PlatformResult, WdkError};
pub use models::*;
pub use retry::{backoff_delay, is_retryable_status, MAX_ATTEMPTS};
