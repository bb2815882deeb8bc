//! Transport trait and implementations.
//!
//! The [`Transport`] trait is the only thing the rest of the workspace knows
//! about the wire. [`http::HttpTransport`] talks to the provider;
//! [`mock::MockTransport`] replays scripted replies for tests.

pub mod http;
pub mod mock;

use crate::error::Result;
use crate::types::Request;
use serde_json::Value;
use std::sync::Arc;

pub use http::{HttpTransport, RequestSigner, Unsigned};
pub use mock::MockTransport;

/// Issues provider requests.
///
/// Implementations return the action payload with any transport-level
/// wrapper removed, so the body still carries the common envelope
/// (`returnCode`, `returnMessage`, ...).
pub trait Transport: Send + Sync {
    /// Issue a request and return the response body.
    fn issue(&self, request: &Request) -> Result<Value>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn issue(&self, request: &Request) -> Result<Value> {
        (**self).issue(request)
    }
}
