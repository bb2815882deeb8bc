//! HTTP transport backed by ureq.

use super::Transport;
use crate::error::{ApiError, Error, Result};
use crate::types::{CommonResponse, Request};
use serde_json::Value;
use std::time::Duration;

/// Default public endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://ncloud.apigw.ntruss.com";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Longest body excerpt kept in an [`Error::Http`].
const EXCERPT_LEN: usize = 256;

/// Produces authentication headers for a request.
///
/// Credential handling lives outside this crate; implementors receive the
/// request about to be sent and return the headers to attach.
pub trait RequestSigner: Send + Sync {
    /// Headers to attach to `request`.
    fn headers(&self, request: &Request) -> Vec<(String, String)>;
}

/// Signer that attaches nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unsigned;

impl RequestSigner for Unsigned {
    fn headers(&self, _request: &Request) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// Blocking HTTP transport.
///
/// Issues `GET {endpoint}{service}/{action}?{params}&responseFormatType=json`.
pub struct HttpTransport {
    agent: ureq::Agent,
    endpoint: String,
    signer: Box<dyn RequestSigner>,
}

impl HttpTransport {
    /// Create a transport for the default endpoint.
    #[must_use]
    pub fn new() -> Self {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    /// Create a transport for a custom endpoint (for testing or private regions).
    #[must_use]
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self::with_config(endpoint, DEFAULT_TIMEOUT)
    }

    /// Create a transport with a custom endpoint and request timeout.
    #[must_use]
    pub fn with_config(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            agent,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            signer: Box::new(Unsigned),
        }
    }

    /// Replace the request signer.
    #[must_use]
    pub fn with_signer(mut self, signer: impl RequestSigner + 'static) -> Self {
        self.signer = Box::new(signer);
        self
    }

    /// The configured endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Full URL (without query) for a request.
    #[must_use]
    pub fn url(&self, request: &Request) -> String {
        format!("{}{}/{}", self.endpoint, request.service, request.action)
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpTransport {
    fn issue(&self, request: &Request) -> Result<Value> {
        let url = self.url(request);
        log::debug!("GET {} ({} params)", url, request.params.len());

        let mut builder = self
            .agent
            .get(&url)
            .header("Accept", "application/json")
            .query("responseFormatType", "json");
        for (key, value) in &request.params {
            builder = builder.query(key, value);
        }
        for (key, value) in self.signer.headers(request) {
            builder = builder.header(key, value);
        }

        let mut response = builder
            .call()
            .map_err(|e| Error::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| Error::Transport(e.to_string()))?;

        log::trace!("{} -> HTTP {}", request.action, status);
        unwrap_body(&request.action, status, &body)
    }
}

/// Turn a raw HTTP answer into the action payload.
///
/// The provider wraps payloads as `{"<action>Response": {...}}` and
/// gateway-level failures as `{"responseError": {...}}`. A non-2xx answer
/// whose body carries a return code becomes [`Error::Api`] so callers can
/// classify it; anything else non-2xx becomes [`Error::Http`].
pub fn unwrap_body(action: &str, status: u16, body: &str) -> Result<Value> {
    let ok = (200..300).contains(&status);
    let parsed: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) if ok => return Err(Error::decode(action, e.to_string())),
        Err(_) => {
            return Err(Error::Http {
                status,
                message: excerpt(body),
            });
        }
    };

    if let Some(err) = parsed.get("responseError") {
        return Err(envelope_error(err).unwrap_or_else(|| Error::Http {
            status,
            message: excerpt(body),
        }));
    }

    let wrapper = format!("{action}Response");
    let payload = match parsed {
        Value::Object(mut map) if map.contains_key(&wrapper) => {
            map.remove(&wrapper).unwrap_or(Value::Null)
        }
        other => other,
    };

    if ok {
        return Ok(payload);
    }
    Err(envelope_error(&payload).unwrap_or_else(|| Error::Http {
        status,
        message: excerpt(body),
    }))
}

fn envelope_error(value: &Value) -> Option<Error> {
    let common: CommonResponse = serde_json::from_value(value.clone()).ok()?;
    if common.return_code.is_empty() {
        return None;
    }
    let api: ApiError = common.into_error();
    Some(Error::Api(api))
}

fn excerpt(body: &str) -> String {
    body.chars().take(EXCERPT_LEN).collect()
}
