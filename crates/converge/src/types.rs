//! Core types shared by the poller, the retry layer and the backends.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker used in target sets for "the resource no longer exists".
pub const ABSENT: &str = "<absent>";

/// Operation code the provider reports when nothing is in flight.
pub const IDLE_OPERATION: &str = "NULL";

/// API generation a session talks to.
///
/// Chosen once per session and never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendVariant {
    /// The original API generation.
    Legacy,
    /// The VPC-based API generation.
    #[default]
    NextGen,
}

impl BackendVariant {
    /// Stable lowercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::NextGen => "next_gen",
        }
    }
}

impl fmt::Display for BackendVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of resource a handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Compute instance.
    Server,
    /// Block storage volume.
    BlockStorage,
    /// Load balancer.
    LoadBalancer,
    /// Auto-scaling group.
    AutoScalingGroup,
    /// Scaling policy attached to an auto-scaling group.
    ScalingPolicy,
}

impl ResourceKind {
    /// Human-readable name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::BlockStorage => "block storage",
            Self::LoadBalancer => "load balancer",
            Self::AutoScalingGroup => "auto-scaling group",
            Self::ScalingPolicy => "scaling policy",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Normalized view of a provider resource.
///
/// Both backend variants produce this shape, so nothing above the
/// dispatcher needs to know which API generation answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHandle {
    /// Provider-assigned id.
    pub id: String,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Provider status code (`RUN`, `NSTOP`, ...).
    pub status_code: String,
    /// Provider operation code; empty or `NULL` when idle.
    #[serde(default)]
    pub operation_code: String,
    /// Variant that produced this handle.
    pub variant: BackendVariant,
}

impl ResourceHandle {
    /// Create an idle handle with an empty status.
    pub fn new(id: impl Into<String>, kind: ResourceKind, variant: BackendVariant) -> Self {
        Self {
            id: id.into(),
            kind,
            status_code: String::new(),
            operation_code: String::new(),
            variant,
        }
    }

    /// Set the status code.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status_code = status.into();
        self
    }

    /// Set the operation code.
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation_code = operation.into();
        self
    }

    /// Whether the provider reports no operation in flight.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.operation_code.is_empty() || self.operation_code == IDLE_OPERATION
    }

    /// Whether the handle is currently in `status`.
    #[must_use]
    pub fn has_status(&self, status: &str) -> bool {
        self.status_code == status
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} [{}", self.kind, self.id, self.status_code)?;
        if !self.is_idle() {
            write!(f, "/{}", self.operation_code)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_operation_codes() {
        let h = ResourceHandle::new("1", ResourceKind::Server, BackendVariant::Legacy);
        assert!(h.is_idle());
        assert!(h.clone().with_operation("NULL").is_idle());
        assert!(!h.with_operation("SETUP").is_idle());
    }

    #[test]
    fn test_display() {
        let h = ResourceHandle::new("12345", ResourceKind::Server, BackendVariant::NextGen)
            .with_status("RUN")
            .with_operation("RESTA");
        assert_eq!(h.to_string(), "server 12345 [RUN/RESTA]");
        let h = h.with_operation("NULL");
        assert_eq!(h.to_string(), "server 12345 [RUN]");
    }

    #[test]
    fn test_variant_names() {
        assert_eq!(BackendVariant::Legacy.to_string(), "legacy");
        assert_eq!(BackendVariant::NextGen.to_string(), "next_gen");
        assert_eq!(BackendVariant::default(), BackendVariant::NextGen);
    }

    #[test]
    fn test_has_status() {
        let h = ResourceHandle::new("7", ResourceKind::LoadBalancer, BackendVariant::Legacy)
            .with_status("USED");
        assert!(h.has_status("USED"));
        assert!(!h.has_status("INIT"));
    }
}
