//! Request and response envelope types.

use crate::error::{ApiError, Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Return code the provider uses for success.
pub const SUCCESS_CODE: &str = "0";

/// A single provider action.
///
/// `service` is the path prefix of the API generation that owns the action
/// (for example `/server/v2`), `action` the action name
/// (for example `getServerInstanceList`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Service path prefix.
    pub service: String,
    /// Action name.
    pub action: String,
    /// Query parameters in insertion order.
    pub params: Vec<(String, String)>,
}

impl Request {
    /// Create a request without parameters.
    pub fn new(service: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            action: action.into(),
            params: Vec::new(),
        }
    }

    /// Add a parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Add a parameter only when a value is present.
    pub fn opt_param(self, key: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(v) => self.param(key, v),
            None => self,
        }
    }

    /// Add a list parameter using the provider's 1-based `key.N` encoding.
    pub fn list_param<I, S>(mut self, key: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for (i, value) in values.into_iter().enumerate() {
            self.params.push((format!("{key}.{}", i + 1), value.into()));
        }
        self
    }

    /// Look up the first value for a parameter.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Envelope fields common to every provider response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonResponse {
    /// Request id assigned by the provider.
    #[serde(default)]
    pub request_id: String,
    /// Return code, `"0"` on success.
    #[serde(default)]
    pub return_code: String,
    /// Return message.
    #[serde(default)]
    pub return_message: String,
}

impl CommonResponse {
    /// Whether the envelope reports success.
    ///
    /// Bodies without a return code are treated as successful.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.return_code.is_empty() || self.return_code == SUCCESS_CODE
    }

    /// Convert a failed envelope into a structured error.
    #[must_use]
    pub fn into_error(self) -> ApiError {
        ApiError::new(self.return_code, self.return_message).with_request_id(self.request_id)
    }
}

/// Extract the common envelope from a response body.
pub fn extract(action: &str, body: &Value) -> Result<CommonResponse> {
    if !body.is_object() {
        return Err(Error::decode(action, "response body is not an object"));
    }
    serde_json::from_value(body.clone()).map_err(|e| Error::decode(action, e.to_string()))
}

/// Decode a typed response, failing with the provider's code when the
/// envelope reports an error.
pub fn decode<T: DeserializeOwned>(action: &str, body: Value) -> Result<T> {
    let common = extract(action, &body)?;
    if !common.is_success() {
        return Err(Error::Api(common.into_error()));
    }
    serde_json::from_value(body).map_err(|e| Error::decode(action, e.to_string()))
}
