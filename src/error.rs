//! The closed error taxonomy shared by every component.

use std::fmt;

/// Closed set of error codes. Every fallible operation in the crate
/// eventually classifies its failure into one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Unknown,
    Internal,
    ConfigValidation,
    ConfigReadError,
    ConfigParseError,
    ConfigNotFound,
    StateReadError,
    StateParseError,
    PlatformApiError,
    PlatformAuthError,
    ResourceNotFound,
    MatchingError,
    ComparisonError,
    TypeAssertionError,
    NotImplemented,
    Timeout,
    HclParseError,
    HclEvalError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::Unknown => "Unknown",
            ErrorCode::Internal => "Internal",
            ErrorCode::ConfigValidation => "ConfigValidation",
            ErrorCode::ConfigReadError => "ConfigReadError",
            ErrorCode::ConfigParseError => "ConfigParseError",
            ErrorCode::ConfigNotFound => "ConfigNotFound",
            ErrorCode::StateReadError => "StateReadError",
            ErrorCode::StateParseError => "StateParseError",
            ErrorCode::PlatformApiError => "PlatformAPIError",
            ErrorCode::PlatformAuthError => "PlatformAuthError",
            ErrorCode::ResourceNotFound => "ResourceNotFound",
            ErrorCode::MatchingError => "MatchingError",
            ErrorCode::ComparisonError => "ComparisonError",
            ErrorCode::TypeAssertionError => "TypeAssertionError",
            ErrorCode::NotImplemented => "NotImplemented",
            ErrorCode::Timeout => "Timeout",
            ErrorCode::HclParseError => "HCLParseError",
            ErrorCode::HclEvalError => "HCLEvalError",
        };
        f.write_str(s)
    }
}

/// A classified domain error. Carries enough structure for callers to
/// branch on `code` without string-matching `message`, while still
/// chaining the original cause for logs.
#[derive(Debug, thiserror::Error)]
#[error("{code}: {message}")]
pub struct DriftError {
    pub code: ErrorCode,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    pub user_facing: bool,
    pub suggested_action: Option<String>,
}

impl DriftError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            user_facing: false,
            suggested_action: None,
        }
    }

    pub fn wrap(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
            user_facing: false,
            suggested_action: None,
        }
    }

    pub fn user_facing(mut self, suggested_action: impl Into<String>) -> Self {
        self.user_facing = true;
        self.suggested_action = Some(suggested_action.into());
        self
    }

    /// Inspect the error chain for a `DriftError` and return its code, or
    /// `ErrorCode::Unknown` if `err` isn't one of ours anywhere in the chain.
    pub fn code(err: &(dyn std::error::Error + 'static)) -> ErrorCode {
        let mut cur: Option<&(dyn std::error::Error + 'static)> = Some(err);
        while let Some(e) = cur {
            if let Some(drift) = e.downcast_ref::<DriftError>() {
                return drift.code;
            }
            cur = e.source();
        }
        ErrorCode::Unknown
    }

    /// Standard equivalence: does `err` (or anything in its chain) carry `code`?
    pub fn is(err: &(dyn std::error::Error + 'static), code: ErrorCode) -> bool {
        Self::code(err) == code
    }
}

pub type Result<T> = std::result::Result<T, DriftError>;
