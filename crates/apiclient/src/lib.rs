//! # apiclient
//!
//! Blocking request/response contract for the cloud provider API.
//!
//! Every provider action is a single request carrying an action name and a
//! flat list of query parameters. Every response carries a common envelope
//! (`requestId`, `returnCode`, `returnMessage`) next to the action-specific
//! payload. This crate provides:
//!
//! - [`Request`]: action plus parameters, with the provider's `name.N` list encoding
//! - [`CommonResponse`], [`extract`] and [`decode`]: envelope handling
//! - [`Error`] / [`ApiError`]: failures, keeping the provider's return code
//! - [`Transport`]: the seam the rest of the workspace depends on
//!
//! ## Example
//!
//! ```
//! use apiclient::{MockTransport, Request, Transport};
//! use serde_json::json;
//!
//! let mock = MockTransport::new();
//! mock.respond("getRegionList", json!({
//!     "returnCode": "0",
//!     "regionList": [{ "regionNo": "1", "regionCode": "KR" }],
//! }));
//!
//! let body = mock.issue(&Request::new("/server/v2", "getRegionList")).unwrap();
//! let common = apiclient::extract("getRegionList", &body).unwrap();
//! assert!(common.is_success());
//! ```
//!
//! ## Transports
//!
//! - [`HttpTransport`]: unsigned ureq client; signing is pluggable via
//!   [`transport::RequestSigner`]
//! - [`MockTransport`]: scripted replies and call recording for tests

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod transport;
pub mod types;

pub use error::{ApiError, Error, Result};
pub use transport::{HttpTransport, MockTransport, Transport};
pub use types::{CommonResponse, Request, decode, extract};
