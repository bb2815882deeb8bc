//! Lifecycle orchestration.
//!
//! Each method runs one create/read/update/delete procedure to completion
//! on the calling thread. Every state-changing call goes through a retry
//! policy and is followed by a convergence wait. The returned
//! [`OperationReport`] lists every step; on failure the same report comes
//! back inside an [`OperationError`] together with the error that stopped
//! the operation. Nothing is rolled back.

mod listener;
mod scaling;
mod server;

use crate::session::Session;
use converge::retry::LogCallback;
use converge::{
    Convergence, ConvergenceTarget, OperationError, OperationReport, ResourceHandle, ResourceKind,
    Result, RetryPolicy, Step, await_state, with_retry,
};

/// Result of an orchestrated operation.
pub type OperationResult = std::result::Result<OperationReport, OperationError>;

/// Runs lifecycle operations against a session.
pub struct Orchestrator<'a> {
    session: &'a Session,
}

impl<'a> Orchestrator<'a> {
    /// Borrow a session.
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    fn retry<T, F>(&self, policy: &RetryPolicy, op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        with_retry(self.session.clock(), policy, &LogCallback, op)
    }

    /// Run an `Await*` step and keep the final handle in the report.
    ///
    /// Build `target` with [`Session::target`] so it carries the session's
    /// poll interval and tolerated codes.
    fn await_step<F>(
        &self,
        report: &mut OperationReport,
        step: Step,
        kind: ResourceKind,
        id: &str,
        target: &ConvergenceTarget,
        fetch: F,
    ) -> Result<Convergence>
    where
        F: FnMut() -> Result<Option<ResourceHandle>>,
    {
        let clock = self.session.clock();
        let outcome = report.run(step, || await_state(clock, kind, id, target, fetch))?;
        if let Some(handle) = outcome.handle().filter(|h| h.kind == report.kind) {
            report.observe(handle.clone());
        }
        Ok(outcome)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::config::SessionConfig;
    use crate::session::Session;
    use apiclient::MockTransport;
    use converge::{BackendVariant, ManualClock};
    use serde_json::{Value, json};
    use std::sync::Arc;

    /// Session over a mock transport and a manual clock.
    pub fn session(variant: BackendVariant) -> (MockTransport, Arc<ManualClock>, Session) {
        let mock = MockTransport::new();
        let clock = Arc::new(ManualClock::new());
        let config = SessionConfig {
            variant,
            ..SessionConfig::default()
        };
        let session = Session::new(config, Arc::new(mock.clone()))
            .unwrap()
            .with_clock(clock.clone());
        (mock, clock, session)
    }

    pub fn ok() -> Value {
        json!({ "returnCode": "0", "returnMessage": "success" })
    }

    pub fn server(id: &str, status: &str, operation: &str) -> Value {
        json!({
            "returnCode": "0",
            "serverInstanceList": [{
                "serverInstanceNo": id,
                "serverInstanceStatus": { "code": status },
                "serverInstanceOperation": { "code": operation }
            }]
        })
    }

    pub fn no_servers() -> Value {
        json!({ "returnCode": "0", "serverInstanceList": [] })
    }
}
