//! # converge
//!
//! Provider-agnostic core for driving cloud resources to a settled state.
//!
//! - [`retry`]: classify provider errors and retry transient ones in place
//! - [`poller`]: wait until a resource reaches a status set, disappears or times out
//! - [`status`]: per-kind status graphs used to reject unreachable targets early
//! - [`lifecycle`]: steps, outcomes and the report an orchestrated operation returns
//! - [`clock`]: the time source every sleep goes through
//!
//! ## Example
//!
//! ```
//! use converge::clock::ManualClock;
//! use converge::poller::{await_state, ConvergenceTarget};
//! use converge::{BackendVariant, ResourceHandle, ResourceKind};
//! use std::time::Duration;
//!
//! let clock = ManualClock::new();
//! let mut statuses = vec!["RUN", "CREAT"];
//! let target = ConvergenceTarget::reach(["RUN"])
//!     .pending(["INIT", "CREAT"])
//!     .poll_interval(Duration::from_secs(1));
//!
//! let done = await_state(&clock, ResourceKind::Server, "12345", &target, || {
//!     let status = statuses.pop().unwrap_or("RUN");
//!     Ok(Some(
//!         ResourceHandle::new("12345", ResourceKind::Server, BackendVariant::NextGen)
//!             .with_status(status),
//!     ))
//! })
//! .unwrap();
//!
//! assert_eq!(done.handle().unwrap().status_code, "RUN");
//! assert_eq!(clock.sleeps().len(), 1);
//! ```

#![warn(clippy::all)]

pub mod clock;
pub mod error;
pub mod lifecycle;
pub mod poller;
pub mod retry;
pub mod status;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, ErrorCategory, Result};
pub use lifecycle::{
    LifecycleState, Operation, OperationError, OperationReport, Step, StepOutcome, StepRecord,
};
pub use poller::{Convergence, ConvergenceTarget, await_state};
pub use retry::{Backoff, CodeSet, RetryClass, RetryPolicy, classify, with_retry};
pub use types::{ABSENT, BackendVariant, IDLE_OPERATION, ResourceHandle, ResourceKind};
