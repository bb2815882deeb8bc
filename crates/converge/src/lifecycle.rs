//! Lifecycle steps and operation reports.
//!
//! Every orchestrated operation records each step it runs, so a failure
//! halfway through a delete still tells the caller what already happened.

use crate::error::{Error, Result};
use crate::types::{ResourceHandle, ResourceKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the resource an operation works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Does not exist
    Absent,
    /// Being provisioned
    Creating,
    /// Exists and is settled
    Active,
    /// Being reconfigured
    Updating,
    /// Being torn down
    Deleting,
}

impl LifecycleState {
    /// Whether moving to `next` follows the lifecycle graph.
    ///
    /// Staying in the same state is always allowed.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use LifecycleState::{Absent, Active, Creating, Deleting, Updating};
        self == next
            || matches!(
                (self, next),
                (Absent, Creating)
                    | (Creating, Active)
                    | (Active, Updating)
                    | (Updating, Active)
                    | (Active, Deleting)
                    | (Deleting, Absent)
            )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Absent => "absent",
            Self::Creating => "creating",
            Self::Active => "active",
            Self::Updating => "updating",
            Self::Deleting => "deleting",
        };
        write!(f, "{s}")
    }
}

/// Lifecycle operation requested by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Create
    Create,
    /// Read
    Read,
    /// Update
    Update,
    /// Delete
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

/// One step of an orchestrated operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "step")]
pub enum Step {
    Resolve,
    ResolveParent,
    Read,
    Create,
    AwaitActive,
    Stop,
    AwaitStopped,
    ListAttachments,
    Detach { storage_id: String },
    AwaitDetached { storage_id: String },
    Terminate,
    VerifyGone,
    AwaitGone,
    ChangeConfiguration,
    SetProtection,
    AwaitStable,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolve => write!(f, "resolve"),
            Self::ResolveParent => write!(f, "resolve parent"),
            Self::Read => write!(f, "read"),
            Self::Create => write!(f, "create"),
            Self::AwaitActive => write!(f, "await active"),
            Self::Stop => write!(f, "stop"),
            Self::AwaitStopped => write!(f, "await stopped"),
            Self::ListAttachments => write!(f, "list attachments"),
            Self::Detach { storage_id } => write!(f, "detach {storage_id}"),
            Self::AwaitDetached { storage_id } => write!(f, "await detached {storage_id}"),
            Self::Terminate => write!(f, "terminate"),
            Self::VerifyGone => write!(f, "verify gone"),
            Self::AwaitGone => write!(f, "await gone"),
            Self::ChangeConfiguration => write!(f, "change configuration"),
            Self::SetProtection => write!(f, "set protection"),
            Self::AwaitStable => write!(f, "await stable"),
        }
    }
}

/// How a step ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum StepOutcome {
    /// Step ran and succeeded
    Completed,
    /// Nothing to do; the effect was already in place
    AlreadyDone,
    /// Step was not needed
    Skipped { reason: String },
    /// Step failed in a way the operation can live with
    Tolerated { error: String },
    /// Step failed and ended the operation
    Failed { error: String },
}

impl StepOutcome {
    /// Whether the step did not end the operation.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

/// Recorded step with its outcome and timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: Step,
    #[serde(flatten)]
    pub outcome: StepOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Report of one orchestrated operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationReport {
    pub operation: Operation,
    pub kind: ResourceKind,
    pub resource_id: Option<String>,
    pub state: LifecycleState,
    pub steps: Vec<StepRecord>,
    pub handle: Option<ResourceHandle>,
}

impl OperationReport {
    /// Start a report in `state`.
    #[must_use]
    pub fn new(operation: Operation, kind: ResourceKind, state: LifecycleState) -> Self {
        Self {
            operation,
            kind,
            resource_id: None,
            state,
            steps: Vec::new(),
            handle: None,
        }
    }

    /// Set the resource id once it is known.
    pub fn identify(&mut self, id: impl Into<String>) {
        self.resource_id = Some(id.into());
    }

    /// Keep the latest observed handle.
    pub fn observe(&mut self, handle: ResourceHandle) {
        if self.resource_id.is_none() {
            self.resource_id = Some(handle.id.clone());
        }
        self.handle = Some(handle);
    }

    /// Move to `next`; transitions outside the lifecycle graph are logged and ignored.
    pub fn advance(&mut self, next: LifecycleState) {
        if self.state.can_transition_to(next) {
            self.state = next;
        } else {
            log::warn!(
                "{} {}: ignoring lifecycle transition {} -> {}",
                self.kind,
                self.id_or_placeholder(),
                self.state,
                next
            );
        }
    }

    /// Run a step, recording `Completed` or `Failed`.
    pub fn run<T, F>(&mut self, step: Step, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let started_at = Utc::now();
        log::info!("{} {}: {}", self.kind, self.id_or_placeholder(), step);
        let result = f();
        let outcome = match &result {
            Ok(_) => StepOutcome::Completed,
            Err(e) => StepOutcome::Failed {
                error: e.to_string(),
            },
        };
        self.push(step, outcome, started_at);
        result
    }

    /// Run a step whose success outcome depends on the value it produced.
    ///
    /// `outcome` decides between `Completed`, `AlreadyDone` and friends;
    /// errors are still recorded as `Failed`.
    pub fn run_with<T, F, O>(&mut self, step: Step, f: F, outcome: O) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
        O: FnOnce(&T) -> StepOutcome,
    {
        let started_at = Utc::now();
        log::info!("{} {}: {}", self.kind, self.id_or_placeholder(), step);
        let result = f();
        let recorded = match &result {
            Ok(value) => outcome(value),
            Err(e) => StepOutcome::Failed {
                error: e.to_string(),
            },
        };
        self.push(step, recorded, started_at);
        result
    }

    /// Record a step that did not go through [`run`](Self::run).
    pub fn record(&mut self, step: Step, outcome: StepOutcome) {
        match &outcome {
            StepOutcome::Tolerated { error } => log::warn!(
                "{} {}: {} failed but was tolerated: {}",
                self.kind,
                self.id_or_placeholder(),
                step,
                error
            ),
            StepOutcome::Skipped { reason } => log::info!(
                "{} {}: skipping {}: {}",
                self.kind,
                self.id_or_placeholder(),
                step,
                reason
            ),
            _ => log::info!("{} {}: {} ({:?})", self.kind, self.id_or_placeholder(), step, outcome),
        }
        self.push(step, outcome, Utc::now());
    }

    fn push(&mut self, step: Step, outcome: StepOutcome, started_at: DateTime<Utc>) {
        self.steps.push(StepRecord {
            step,
            outcome,
            started_at,
            finished_at: Utc::now(),
        });
    }

    fn id_or_placeholder(&self) -> &str {
        self.resource_id.as_deref().unwrap_or("(new)")
    }

    /// Steps that did not end the operation, in order.
    pub fn completed_steps(&self) -> impl Iterator<Item = &Step> {
        self.steps
            .iter()
            .filter(|r| r.outcome.is_success())
            .map(|r| &r.step)
    }

    /// The step that ended the operation, if any.
    #[must_use]
    pub fn failed_step(&self) -> Option<&Step> {
        self.steps
            .iter()
            .find(|r| !r.outcome.is_success())
            .map(|r| &r.step)
    }

    /// Outcome recorded for the first occurrence of `step`.
    #[must_use]
    pub fn outcome_of(&self, step: &Step) -> Option<&StepOutcome> {
        self.steps.iter().find(|r| &r.step == step).map(|r| &r.outcome)
    }

    /// Step names in execution order.
    #[must_use]
    pub fn step_names(&self) -> Vec<String> {
        self.steps.iter().map(|r| r.step.to_string()).collect()
    }

    /// One-line description of where the operation stands.
    #[must_use]
    pub fn summary(&self) -> String {
        let done: Vec<String> = self.completed_steps().map(ToString::to_string).collect();
        let mut s = format!("{} {} {}", self.operation, self.kind, self.id_or_placeholder());
        if let Some(step) = self.failed_step() {
            s.push_str(&format!(" failed at {step}"));
        }
        if done.is_empty() {
            s.push_str(" (no steps completed)");
        } else {
            s.push_str(&format!(" after [{}]", done.join(", ")));
        }
        s
    }

    /// Close the report with the operation's result.
    pub fn finish(self, result: Result<()>) -> std::result::Result<Self, OperationError> {
        match result {
            Ok(()) => Ok(self),
            Err(source) => Err(self.fail(source)),
        }
    }

    /// Turn the report into an error carrying `source`.
    #[must_use]
    pub fn fail(self, source: Error) -> OperationError {
        OperationError {
            report: Box::new(self),
            source,
        }
    }
}

/// A failed operation: the partial report plus the innermost error.
#[derive(Debug, thiserror::Error)]
#[error("{}: {source}", .report.summary())]
pub struct OperationError {
    /// Everything that happened before the failure.
    pub report: Box<OperationReport>,
    /// The error that ended the operation.
    #[source]
    pub source: Error,
}

impl OperationError {
    /// The step that failed, if it ran through the report.
    #[must_use]
    pub fn failed_step(&self) -> Option<&Step> {
        self.report.failed_step()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_graph() {
        use LifecycleState::*;
        assert!(Absent.can_transition_to(Creating));
        assert!(Creating.can_transition_to(Active));
        assert!(Active.can_transition_to(Updating));
        assert!(Updating.can_transition_to(Active));
        assert!(Active.can_transition_to(Deleting));
        assert!(Deleting.can_transition_to(Absent));
        assert!(!Absent.can_transition_to(Active));
        assert!(!Deleting.can_transition_to(Active));
        assert!(!Creating.can_transition_to(Deleting));
    }

    #[test]
    fn test_advance_ignores_invalid_transition() {
        let mut report =
            OperationReport::new(Operation::Create, ResourceKind::Server, LifecycleState::Absent);
        report.advance(LifecycleState::Deleting);
        assert_eq!(report.state, LifecycleState::Absent);
        report.advance(LifecycleState::Creating);
        assert_eq!(report.state, LifecycleState::Creating);
    }

    #[test]
    fn test_run_records_outcomes() {
        let mut report =
            OperationReport::new(Operation::Delete, ResourceKind::Server, LifecycleState::Active);
        report.identify("12345");
        report.run(Step::Read, || Ok(())).unwrap();
        let err = report
            .run(Step::Stop, || -> Result<()> {
                Err(Error::lookup("zone", "KR-9"))
            })
            .unwrap_err();
        assert!(matches!(err, Error::Lookup { .. }));
        assert_eq!(report.outcome_of(&Step::Read), Some(&StepOutcome::Completed));
        assert_eq!(report.failed_step(), Some(&Step::Stop));
        assert!(report.steps[0].finished_at >= report.steps[0].started_at);
    }

    #[test]
    fn test_error_display_lists_progress() {
        let mut report =
            OperationReport::new(Operation::Delete, ResourceKind::Server, LifecycleState::Active);
        report.identify("12345");
        report.run(Step::Read, || Ok(())).unwrap();
        let source = report
            .run(Step::Terminate, || -> Result<()> {
                Err(apiclient::Error::api("1", "denied").into())
            })
            .unwrap_err();
        let err = report.finish(Err(source)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "delete server 12345 failed at terminate after [read]: provider error [1] denied"
        );
        assert_eq!(err.failed_step(), Some(&Step::Terminate));
    }

    #[test]
    fn test_run_with_custom_outcome() {
        let mut report =
            OperationReport::new(Operation::Delete, ResourceKind::Server, LifecycleState::Active);
        let found = report
            .run_with(
                Step::Read,
                || Ok(None::<u32>),
                |v| match v {
                    Some(_) => StepOutcome::Completed,
                    None => StepOutcome::AlreadyDone,
                },
            )
            .unwrap();
        assert_eq!(found, None);
        assert_eq!(report.outcome_of(&Step::Read), Some(&StepOutcome::AlreadyDone));
    }

    #[test]
    fn test_tolerated_step_counts_as_completed() {
        let mut report =
            OperationReport::new(Operation::Delete, ResourceKind::Server, LifecycleState::Deleting);
        report.record(
            Step::AwaitGone,
            StepOutcome::Tolerated {
                error: "timed out".into(),
            },
        );
        assert_eq!(report.failed_step(), None);
        assert_eq!(report.step_names(), vec!["await gone"]);
    }

    #[test]
    fn test_step_display() {
        assert_eq!(
            Step::Detach {
                storage_id: "55".into()
            }
            .to_string(),
            "detach 55"
        );
        assert_eq!(Step::AwaitStable.to_string(), "await stable");
    }
}
