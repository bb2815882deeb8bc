//! Error types for convergence and lifecycle operations.

use crate::types::{BackendVariant, ResourceKind};
use std::time::Duration;

/// Result type alias for convergence operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for handling strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Retryable provider code that outlived its retry budget
    Transient,
    /// Provider rejected the call
    Provider,
    /// Resource did not converge in time
    Timeout,
    /// Operation has no implementation on the active backend
    Unsupported,
    /// Resource disappeared or took an unexpected turn
    Vanished,
    /// Request or target cannot be satisfied as written
    Misconfigured,
}

impl ErrorCategory {
    /// Whether re-running the whole operation later is likely to help.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient | Self::Timeout)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Transient => "Provider stayed busy",
            Self::Provider => "Provider rejected the request",
            Self::Timeout => "Resource did not converge in time",
            Self::Unsupported => "Not supported by this API generation",
            Self::Vanished => "Resource changed unexpectedly",
            Self::Misconfigured => "Invalid request",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Transient => "Wait for in-flight operations to finish and apply again",
            Self::Provider => "Check the provider's return code and message",
            Self::Timeout => "Raise the operation timeout or check the resource in the console",
            Self::Unsupported => "Switch the session to a backend variant that supports it",
            Self::Vanished => "Refresh state; the resource was changed outside this session",
            Self::Misconfigured => "Fix the resource configuration and try again",
        }
    }
}

/// Errors that can occur while converging a resource.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Provider failure that is not worth retrying in place.
    #[error(transparent)]
    Provider(#[from] apiclient::Error),

    /// A retryable provider code persisted past the retry budget.
    #[error("{policy}: provider still busy after {attempts} attempts: {source}")]
    TransientProvider {
        policy: String,
        attempts: u32,
        #[source]
        source: apiclient::Error,
    },

    /// Poll budget exceeded.
    #[error(
        "timed out after {elapsed:?} waiting for {kind} {id} to reach {target} (last status: {}{})",
        .last_status.as_deref().unwrap_or("unknown"),
        .last_error.as_ref().map(|e| format!(", last error: {e}")).unwrap_or_default()
    )]
    ConvergenceTimeout {
        kind: ResourceKind,
        id: String,
        target: String,
        last_status: Option<String>,
        last_error: Option<apiclient::Error>,
        elapsed: Duration,
    },

    /// Operation has no implementation on the active backend.
    #[error("{operation} is not supported on the {variant} backend")]
    UnsupportedOnVariant {
        operation: String,
        variant: BackendVariant,
    },

    /// Resource disappeared while waiting for a live status.
    #[error("{kind} {id} disappeared while waiting for {target}")]
    UnexpectedAbsence {
        kind: ResourceKind,
        id: String,
        target: String,
    },

    /// Resource entered a status outside the expected set.
    #[error("{kind} {id} entered unexpected status {status} while waiting for {target}")]
    UnexpectedStatus {
        kind: ResourceKind,
        id: String,
        status: String,
        target: String,
    },

    /// Target cannot be reached from the observed status.
    #[error("{kind} {id} cannot reach {target} from {from}")]
    UnreachableTarget {
        kind: ResourceKind,
        id: String,
        from: String,
        target: String,
    },

    /// A region, zone or parent code did not resolve.
    #[error("{what} not found: {code}")]
    Lookup { what: String, code: String },

    /// Request cannot be expressed on the active backend.
    #[error("invalid {operation} request: {reason}")]
    InvalidRequest { operation: String, reason: String },
}

impl Error {
    /// Create an unsupported-operation error.
    pub fn unsupported(operation: impl Into<String>, variant: BackendVariant) -> Self {
        Self::UnsupportedOnVariant {
            operation: operation.into(),
            variant,
        }
    }

    /// Create a lookup error.
    pub fn lookup(what: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Lookup {
            what: what.into(),
            code: code.into(),
        }
    }

    /// Create an invalid-request error.
    pub fn invalid(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Categorize this error for handling purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Provider(_) => ErrorCategory::Provider,
            Self::TransientProvider { .. } => ErrorCategory::Transient,
            Self::ConvergenceTimeout { .. } => ErrorCategory::Timeout,
            Self::UnsupportedOnVariant { .. } => ErrorCategory::Unsupported,
            Self::UnexpectedAbsence { .. } | Self::UnexpectedStatus { .. } => {
                ErrorCategory::Vanished
            }
            Self::UnreachableTarget { .. } | Self::Lookup { .. } | Self::InvalidRequest { .. } => {
                ErrorCategory::Misconfigured
            }
        }
    }

    /// Whether re-running the operation later is likely to help.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Provider return code carried by this error, if any.
    #[must_use]
    pub fn provider_code(&self) -> Option<&str> {
        match self {
            Self::Provider(e) | Self::TransientProvider { source: e, .. } => e.code(),
            Self::ConvergenceTimeout {
                last_error: Some(e),
                ..
            } => e.code(),
            _ => None,
        }
    }

    /// Whether this is a convergence timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ConvergenceTimeout { .. })
    }
}
