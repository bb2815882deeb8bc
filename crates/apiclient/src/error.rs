//! Error types for provider API calls.
//!
//! A provider failure either carries a structured envelope with a return
//! code ([`Error::Api`]) or it does not (HTTP failure without an envelope,
//! undecodable body, transport failure). Only the former can be classified
//! as transient by callers; see [`Error::code`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type alias for provider API calls.
pub type Result<T> = std::result::Result<T, Error>;

/// Structured error reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Provider-issued return code (distinct from the HTTP status).
    pub code: String,
    /// Provider-issued message, kept verbatim.
    pub message: String,
    /// Request id echoed by the provider, when present.
    pub request_id: Option<String>,
}

impl ApiError {
    /// Create an error from a return code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            request_id: None,
        }
    }

    /// Attach the provider's request id.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        let request_id = request_id.into();
        if !request_id.is_empty() {
            self.request_id = Some(request_id);
        }
        self
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(id) = &self.request_id {
            write!(f, " (request {id})")?;
        }
        Ok(())
    }
}

/// Errors that can occur while issuing a provider request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The provider answered with a non-success return code.
    #[error("provider error {0}")]
    Api(ApiError),

    /// HTTP failure without a provider envelope.
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body excerpt.
        message: String,
    },

    /// The response could not be decoded.
    #[error("malformed response for {action}: {message}")]
    Decode {
        /// Action whose response was malformed.
        action: String,
        /// Decoder message.
        message: String,
    },

    /// The request never produced a response (connection, DNS, TLS, timeout).
    #[error("transport failure: {0}")]
    Transport(String),
}

impl Error {
    /// Create a provider error from a return code and message.
    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api(ApiError::new(code, message))
    }

    /// Create a decode error for an action.
    pub fn decode(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            action: action.into(),
            message: message.into(),
        }
    }

    /// Provider return code, when the failure carried a structured body.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api(e) if !e.code.is_empty() => Some(e.code.as_str()),
            _ => None,
        }
    }

    /// The structured provider error, if any.
    #[must_use]
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Api(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ApiError> for Error {
    fn from(e: ApiError) -> Self {
        Self::Api(e)
    }
}
