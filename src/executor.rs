//! Batch execution of independent lifecycle requests.
//!
//! The host applies many resources at once. Requests share one session and
//! run on a bounded rayon pool; each request still runs its own steps in
//! order on a single worker.

use crate::orchestrator::OperationResult;
use crate::session::Session;
use crate::state::{self, StateStore};
use crate::types::{ListenerChange, ScalingPolicySpec, ServerChange, ServerSpec};
use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// One lifecycle request, as the host would issue it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "request")]
pub enum LifecycleRequest {
    CreateServer { spec: ServerSpec },
    ReadServer { id: String },
    UpdateServer { id: String, change: ServerChange },
    DeleteServer { id: String },
    CreateScalingPolicy { spec: ScalingPolicySpec },
    DeleteScalingPolicy { group_name: String, policy_name: String },
    UpdateListener { change: ListenerChange },
}

impl LifecycleRequest {
    /// Run the request through the session's orchestrator.
    pub fn run(&self, session: &Session) -> OperationResult {
        let orchestrator = session.orchestrator();
        match self {
            Self::CreateServer { spec } => orchestrator.create_server(spec),
            Self::ReadServer { id } => orchestrator.read_server(id),
            Self::UpdateServer { id, change } => orchestrator.update_server(id, change),
            Self::DeleteServer { id } => orchestrator.delete_server(id),
            Self::CreateScalingPolicy { spec } => orchestrator.create_scaling_policy(spec),
            Self::DeleteScalingPolicy {
                group_name,
                policy_name,
            } => orchestrator.delete_scaling_policy(group_name, policy_name),
            Self::UpdateListener { change } => orchestrator.update_listener(change),
        }
    }
}

/// A request addressed to a host state entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub address: String,
    #[serde(flatten)]
    pub request: LifecycleRequest,
}

/// Outcome of one batch request.
#[derive(Debug)]
pub struct BatchOutcome {
    pub address: String,
    pub result: OperationResult,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Run `requests` on at most `jobs` threads and write their outcomes to `store`.
///
/// Outcomes come back in request order. A failed request does not stop the
/// others. When it already saw its resource, the resource is stored as
/// tainted so the host keeps tracking it.
pub fn run_batch(
    session: &Session,
    requests: Vec<BatchRequest>,
    jobs: usize,
    store: &dyn StateStore,
) -> Result<Vec<BatchOutcome>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .context("Failed to create thread pool")?;

    log::info!("running {} lifecycle requests on {} threads", requests.len(), jobs.max(1));

    let outcomes: Vec<BatchOutcome> = pool.install(|| {
        requests
            .into_par_iter()
            .map(|BatchRequest { address, request }| {
                let result = request.run(session);
                match &result {
                    Ok(report) => {
                        state::record(report, &address, store);
                        log::info!("{address}: {}", report.summary());
                    }
                    Err(e) => {
                        log::warn!("{address}: {e}");
                        state::record_failure(&e.report, &address, store);
                    }
                }
                BatchOutcome { address, result }
            })
            .collect()
    });

    let failed = outcomes.iter().filter(|o| !o.is_success()).count();
    if failed > 0 {
        log::warn!("{failed} of {} lifecycle requests failed", outcomes.len());
    }
    Ok(outcomes)
}
