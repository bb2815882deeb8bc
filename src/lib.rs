//! # stratus
//!
//! Resource convergence for a cloud provider that exposes two incompatible
//! API generations for the same resources.
//!
//! - [`session`]: configuration, backend dispatcher, lookup cache and clock
//! - [`backend`]: one logical operation set, a Legacy and a NextGen implementation
//! - [`orchestrator`]: ordered lifecycle procedures with per-step reports
//! - [`policy`]: named retry policies for busy-object error codes
//! - [`state`]: writing converged results back to the host
//! - [`executor`]: running independent requests on a bounded thread pool
//!
//! ## Example
//!
//! ```
//! use serde_json::json;
//! use std::sync::Arc;
//! use stratus::apiclient::MockTransport;
//! use stratus::config::SessionConfig;
//! use stratus::converge::{BackendVariant, LifecycleState};
//! use stratus::session::Session;
//!
//! let mock = MockTransport::new();
//! mock.respond(
//!     "getServerInstanceList",
//!     json!({
//!         "returnCode": "0",
//!         "serverInstanceList": [{
//!             "serverInstanceNo": "12345",
//!             "serverInstanceStatus": { "code": "RUN" },
//!             "serverInstanceOperation": { "code": "NULL" }
//!         }]
//!     }),
//! );
//!
//! let config = SessionConfig {
//!     variant: BackendVariant::Legacy,
//!     ..SessionConfig::default()
//! };
//! let session = Session::new(config, Arc::new(mock)).unwrap();
//! let report = session.orchestrator().read_server("12345").unwrap();
//!
//! assert_eq!(report.state, LifecycleState::Active);
//! assert_eq!(report.handle.unwrap().status_code, "RUN");
//! ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod executor;
pub mod orchestrator;
pub mod policy;
pub mod session;
pub mod state;
pub mod types;

pub use apiclient;
pub use converge;

pub use backend::{Backend, BackendResult, Dispatcher, LogicalOperation, OperationKind, Placement};
pub use config::SessionConfig;
pub use executor::{BatchOutcome, BatchRequest, LifecycleRequest, run_batch};
pub use orchestrator::{OperationResult, Orchestrator};
pub use session::Session;
pub use state::{MemoryState, StateStore};
