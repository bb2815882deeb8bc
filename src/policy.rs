//! Named retry policies and the provider codes behind them.

use crate::config::RetrySettings;
use converge::{CodeSet, RetryPolicy};
use std::time::Duration;

/// Previous servers have not been entirely terminated.
pub const PREVIOUS_SERVERS_NOT_TERMINATED: &str = "23006";
/// Server (or another object) is in operation.
pub const OBJECT_IN_OPERATION: &str = "25033";
/// Block storage detach already in progress.
pub const DETACH_IN_PROGRESS: &str = "24002";
/// Load balancer is in operation.
pub const LOAD_BALANCER_IN_OPERATION: &str = "1300";
/// Auto-scaling group is in operation.
pub const SCALING_GROUP_IN_OPERATION: &str = "50160";
/// Scaling activity in progress.
pub const SCALING_ACTIVITY_IN_PROGRESS: &str = "50150";

/// Retry policies for every call site that can hit a busy object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policies {
    /// Server create/terminate racing a previous teardown
    pub create_contention: RetryPolicy,
    /// Stop, spec change and protection calls on a busy server
    pub server_busy: RetryPolicy,
    /// Load balancer configuration while the balancer is busy
    pub busy_object: RetryPolicy,
    /// Detach while another detach is running
    pub detach_in_progress: RetryPolicy,
    /// Scaling policy calls while the group is busy
    pub scaling_busy: RetryPolicy,
}

impl Policies {
    /// Build the policies from session retry settings.
    pub fn from_settings(settings: &RetrySettings) -> Self {
        let delay = Duration::from_secs(settings.delay);
        let busy_delay = Duration::from_secs(settings.busy_object_delay);
        let max_wait = Duration::from_secs(settings.max_wait);

        Self {
            create_contention: RetryPolicy::fixed(
                "create_contention",
                [PREVIOUS_SERVERS_NOT_TERMINATED],
                delay,
                max_wait,
            ),
            server_busy: RetryPolicy::fixed("server_busy", [OBJECT_IN_OPERATION], delay, max_wait),
            busy_object: RetryPolicy::fixed(
                "busy_object",
                [LOAD_BALANCER_IN_OPERATION, OBJECT_IN_OPERATION],
                busy_delay,
                max_wait,
            ),
            detach_in_progress: RetryPolicy::fixed(
                "detach_in_progress",
                [DETACH_IN_PROGRESS, OBJECT_IN_OPERATION],
                delay,
                max_wait,
            ),
            scaling_busy: RetryPolicy::fixed(
                "scaling_busy",
                [SCALING_GROUP_IN_OPERATION, SCALING_ACTIVITY_IN_PROGRESS],
                busy_delay,
                max_wait,
            ),
        }
    }

    /// Codes a status poll may fail with without ending the wait.
    pub fn poll_codes(&self) -> CodeSet {
        self.create_contention
            .retryable_codes
            .iter()
            .chain(self.server_busy.retryable_codes.iter())
            .chain(self.busy_object.retryable_codes.iter())
            .chain(self.detach_in_progress.retryable_codes.iter())
            .chain(self.scaling_busy.retryable_codes.iter())
            .collect()
    }
}

impl Default for Policies {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}
