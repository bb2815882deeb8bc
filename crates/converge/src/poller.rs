//! Convergence poller.
//!
//! One loop for every "wait until the resource reaches X" in the workspace,
//! parameterised by a fetch closure and a [`ConvergenceTarget`].

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::retry::{CodeSet, RetryClass, classify};
use crate::status;
use crate::types::{ABSENT, ResourceHandle, ResourceKind};
use std::collections::BTreeSet;
use std::time::Duration;

/// Lower bound on the poll interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Default poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default poll budget.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// What a wait is waiting for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvergenceTarget {
    /// Statuses that are expected on the way. Empty means "anything goes".
    pub pending: BTreeSet<String>,
    /// Statuses that end the wait. May contain [`ABSENT`].
    pub terminal: BTreeSet<String>,
    /// Total time budget.
    pub timeout: Duration,
    /// Delay between fetches.
    pub poll_interval: Duration,
    /// Provider codes a fetch may fail with without ending the wait.
    pub retryable_codes: CodeSet,
    /// Only accept a terminal status once no operation is in flight.
    pub require_idle: bool,
}

impl ConvergenceTarget {
    /// Wait for any of `statuses`.
    pub fn reach<I, S>(statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pending: BTreeSet::new(),
            terminal: statuses.into_iter().map(Into::into).collect(),
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            retryable_codes: CodeSet::new(),
            require_idle: false,
        }
    }

    /// Wait for the resource to disappear.
    #[must_use]
    pub fn gone() -> Self {
        Self::reach([ABSENT])
    }

    /// Set the expected intermediate statuses.
    #[must_use]
    pub fn pending<I, S>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pending = statuses.into_iter().map(Into::into).collect();
        self
    }

    /// Set the time budget.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the poll interval.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Tolerate fetch failures carrying these codes.
    #[must_use]
    pub fn retry_on(mut self, codes: CodeSet) -> Self {
        self.retryable_codes = codes;
        self
    }

    /// Require an idle handle before accepting a terminal status.
    #[must_use]
    pub fn require_idle(mut self) -> Self {
        self.require_idle = true;
        self
    }

    /// Whether absence ends the wait successfully.
    #[must_use]
    pub fn accepts_absence(&self) -> bool {
        self.terminal.contains(ABSENT)
    }

    /// Whether `handle` satisfies the target.
    #[must_use]
    pub fn is_satisfied_by(&self, handle: &ResourceHandle) -> bool {
        self.terminal.contains(&handle.status_code) && (!self.require_idle || handle.is_idle())
    }

    /// Terminal statuses joined with `|`.
    #[must_use]
    pub fn describe(&self) -> String {
        self.terminal
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Fail with [`Error::UnreachableTarget`] when no terminal status can be
    /// reached from the handle's status.
    pub fn check_reachable(&self, handle: &ResourceHandle) -> Result<()> {
        if status::can_reach(
            handle.kind,
            &handle.status_code,
            self.terminal.iter().map(String::as_str),
        ) {
            return Ok(());
        }
        Err(Error::UnreachableTarget {
            kind: handle.kind,
            id: handle.id.clone(),
            from: handle.status_code.clone(),
            target: self.describe(),
        })
    }
}

/// How a wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Convergence {
    /// Resource reached a terminal status.
    Reached(ResourceHandle),
    /// Resource no longer exists.
    Gone {
        /// Id that was waited on.
        id: String,
    },
}

impl Convergence {
    /// The final handle, if the resource still exists.
    #[must_use]
    pub fn handle(&self) -> Option<&ResourceHandle> {
        match self {
            Self::Reached(h) => Some(h),
            Self::Gone { .. } => None,
        }
    }
}

/// Poll `fetch` until the resource satisfies `target`, disappears, or the
/// budget runs out.
///
/// `fetch` returns `Ok(None)` when the provider reports the resource as
/// absent. No sleep happens when the first fetch is already terminal.
pub fn await_state<F>(
    clock: &dyn Clock,
    kind: ResourceKind,
    id: &str,
    target: &ConvergenceTarget,
    mut fetch: F,
) -> Result<Convergence>
where
    F: FnMut() -> Result<Option<ResourceHandle>>,
{
    let start = clock.now();
    let interval = target.poll_interval.max(MIN_POLL_INTERVAL);
    let mut last_status: Option<String> = None;
    let mut last_error: Option<apiclient::Error> = None;
    let mut polls: u32 = 0;

    loop {
        polls += 1;
        match fetch() {
            Err(Error::Provider(e))
                if classify(&e, &target.retryable_codes) == RetryClass::Retryable =>
            {
                log::debug!("{kind} {id}: poll {polls} tolerated {e}");
                last_error = Some(e);
            }
            Err(e) => return Err(e),
            Ok(None) => {
                if target.accepts_absence() {
                    log::debug!("{kind} {id}: gone after {polls} polls");
                    return Ok(Convergence::Gone { id: id.to_string() });
                }
                return Err(Error::UnexpectedAbsence {
                    kind,
                    id: id.to_string(),
                    target: target.describe(),
                });
            }
            Ok(Some(handle)) => {
                log::debug!("{kind} {id}: poll {polls} observed {handle}");
                target.check_reachable(&handle)?;
                if target.is_satisfied_by(&handle) {
                    return Ok(Convergence::Reached(handle));
                }
                let expected = target.pending.is_empty()
                    || target.pending.contains(&handle.status_code)
                    || target.terminal.contains(&handle.status_code);
                if !expected {
                    return Err(Error::UnexpectedStatus {
                        kind,
                        id: id.to_string(),
                        status: handle.status_code,
                        target: target.describe(),
                    });
                }
                last_status = Some(handle.status_code);
                last_error = None;
            }
        }

        let elapsed = clock.since(start);
        if elapsed >= target.timeout {
            return Err(Error::ConvergenceTimeout {
                kind,
                id: id.to_string(),
                target: target.describe(),
                last_status,
                last_error,
                elapsed,
            });
        }
        clock.sleep(interval.min(target.timeout - elapsed));
    }
}
