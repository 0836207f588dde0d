use std::fmt;

/// Result type alias used across the strategy orchestration core.
pub type Result<T> = std::result::Result<T, Error>;

/// Conceptual error taxonomy from spec.md §7. Each code is a stable,
/// user/tool-surface-visible string; `Error` carries one plus a message and
/// optional structured detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidInputRef,
    InvalidKind,
    ConfirmationRequired,
    WouldEmptyGraph,
    NoRoots,
    MultipleRoots,
    DelegationPlanInvalid,
    MissingCombineInputs,
    GraphNotFound,
    StepNotFound,
    SearchNotFound,
    External,
    Cancelled,
    Fatal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInputRef => "INVALID_INPUT_REF",
            ErrorCode::InvalidKind => "INVALID_KIND",
            ErrorCode::ConfirmationRequired => "CONFIRMATION_REQUIRED",
            ErrorCode::WouldEmptyGraph => "WOULD_EMPTY_GRAPH",
            ErrorCode::NoRoots => "NO_ROOTS",
            ErrorCode::MultipleRoots => "MULTIPLE_ROOTS",
            ErrorCode::DelegationPlanInvalid => "DELEGATION_PLAN_INVALID",
            ErrorCode::MissingCombineInputs => "MISSING_COMBINE_INPUTS",
            ErrorCode::GraphNotFound => "GRAPH_NOT_FOUND",
            ErrorCode::StepNotFound => "STEP_NOT_FOUND",
            ErrorCode::SearchNotFound => "SEARCH_NOT_FOUND",
            ErrorCode::External => "EXTERNAL",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured, synchronously-returned error (§7 propagation policy: "graph
/// operations return structured error records synchronously").
#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: serde_json::Value,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: serde_json::Value::Null,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for Error {}
