//! Backend dispatch.
//!
//! The provider exposes two incompatible API generations for the same
//! resources. Each is a [`Backend`]; a session picks one through
//! [`Dispatcher::for_variant`] and never switches. Backends absorb every
//! request and response difference, so callers only ever see
//! [`ResourceHandle`]s and the shared types in [`crate::types`].
//!
//! ## Testing
//!
//! Pair a backend with [`apiclient::MockTransport`]:
//!
//! ```
//! use apiclient::MockTransport;
//! use converge::BackendVariant;
//! use serde_json::json;
//! use std::sync::Arc;
//! use stratus::backend::Dispatcher;
//!
//! let mock = MockTransport::new();
//! mock.respond("getServerInstanceList", json!({
//!     "returnCode": "0",
//!     "serverInstanceList": [],
//! }));
//!
//! let dispatcher = Dispatcher::for_variant(BackendVariant::Legacy, Arc::new(mock), "KR");
//! assert!(dispatcher.get_server("12345").unwrap().is_none());
//! ```

pub mod legacy;
pub mod nextgen;
pub mod wire;

use crate::types::{BlockStorage, CodeEntry, ListenerChange, ScalingPolicySpec, ServerSpec};
use apiclient::Transport;
use converge::{BackendVariant, Error, ResourceHandle, Result};
use std::fmt;
use std::sync::Arc;

pub use legacy::LegacyBackend;
pub use nextgen::NextGenBackend;

/// Logical operations, independent of API generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    GetServer,
    CreateServer,
    StopServer,
    StartServer,
    TerminateServer,
    ChangeServerSpec,
    SetTerminationProtection,
    ListBlockStorage,
    GetBlockStorage,
    DetachBlockStorage,
    GetLoadBalancer,
    ChangeListenerConfiguration,
    GetAutoScalingGroup,
    CreateScalingPolicy,
    GetScalingPolicy,
    DeleteScalingPolicy,
    ListRegions,
    ListZones,
}

impl OperationKind {
    /// Stable snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetServer => "get_server",
            Self::CreateServer => "create_server",
            Self::StopServer => "stop_server",
            Self::StartServer => "start_server",
            Self::TerminateServer => "terminate_server",
            Self::ChangeServerSpec => "change_server_spec",
            Self::SetTerminationProtection => "set_termination_protection",
            Self::ListBlockStorage => "list_block_storage",
            Self::GetBlockStorage => "get_block_storage",
            Self::DetachBlockStorage => "detach_block_storage",
            Self::GetLoadBalancer => "get_load_balancer",
            Self::ChangeListenerConfiguration => "change_listener_configuration",
            Self::GetAutoScalingGroup => "get_auto_scaling_group",
            Self::CreateScalingPolicy => "create_scaling_policy",
            Self::GetScalingPolicy => "get_scaling_policy",
            Self::DeleteScalingPolicy => "delete_scaling_policy",
            Self::ListRegions => "list_regions",
            Self::ListZones => "list_zones",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a server is placed, as keys of the active variant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Placement {
    /// Region key (number on Legacy, code on NextGen)
    pub region_key: String,
    /// Zone key; provider default when absent
    pub zone_key: Option<String>,
}

/// A logical operation with its inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogicalOperation {
    GetServer { id: String },
    CreateServer { spec: ServerSpec, placement: Placement },
    StopServer { id: String },
    StartServer { id: String },
    TerminateServer { id: String },
    ChangeServerSpec { id: String, product_code: String },
    SetTerminationProtection { id: String, protect: bool },
    ListBlockStorage { server_id: String },
    GetBlockStorage { id: String },
    DetachBlockStorage { id: String },
    GetLoadBalancer { id: String },
    ChangeListenerConfiguration(ListenerChange),
    /// Look up a group by name; the handle id is the variant's group key
    GetAutoScalingGroup { name: String },
    CreateScalingPolicy { spec: ScalingPolicySpec, group_key: String },
    GetScalingPolicy { name: String, group_key: String },
    DeleteScalingPolicy { name: String, group_key: String },
    ListRegions,
    ListZones { region_key: String },
}

impl LogicalOperation {
    /// Kind of this operation.
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::GetServer { .. } => OperationKind::GetServer,
            Self::CreateServer { .. } => OperationKind::CreateServer,
            Self::StopServer { .. } => OperationKind::StopServer,
            Self::StartServer { .. } => OperationKind::StartServer,
            Self::TerminateServer { .. } => OperationKind::TerminateServer,
            Self::ChangeServerSpec { .. } => OperationKind::ChangeServerSpec,
            Self::SetTerminationProtection { .. } => OperationKind::SetTerminationProtection,
            Self::ListBlockStorage { .. } => OperationKind::ListBlockStorage,
            Self::GetBlockStorage { .. } => OperationKind::GetBlockStorage,
            Self::DetachBlockStorage { .. } => OperationKind::DetachBlockStorage,
            Self::GetLoadBalancer { .. } => OperationKind::GetLoadBalancer,
            Self::ChangeListenerConfiguration(_) => OperationKind::ChangeListenerConfiguration,
            Self::GetAutoScalingGroup { .. } => OperationKind::GetAutoScalingGroup,
            Self::CreateScalingPolicy { .. } => OperationKind::CreateScalingPolicy,
            Self::GetScalingPolicy { .. } => OperationKind::GetScalingPolicy,
            Self::DeleteScalingPolicy { .. } => OperationKind::DeleteScalingPolicy,
            Self::ListRegions => OperationKind::ListRegions,
            Self::ListZones { .. } => OperationKind::ListZones,
        }
    }
}

/// Normalized result of a logical operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendResult {
    /// A single resource, `None` when the provider reports it absent
    Resource(Option<ResourceHandle>),
    /// Block storage listing
    Storages(Vec<BlockStorage>),
    /// Region or zone listing
    Codes(Vec<CodeEntry>),
    /// Call accepted; nothing to return
    Accepted,
}

/// One API generation.
///
/// `execute` is only called for operations `supports` accepts and that
/// passed `validate`.
pub trait Backend: Send + Sync {
    /// Variant this backend talks to.
    fn variant(&self) -> BackendVariant;

    /// Whether the operation exists on this variant.
    fn supports(&self, kind: OperationKind) -> bool;

    /// Reject inputs this variant cannot express. Never touches the network.
    fn validate(&self, _op: &LogicalOperation) -> Result<()> {
        Ok(())
    }

    /// Issue the operation.
    fn execute(&self, op: &LogicalOperation) -> Result<BackendResult>;
}

/// Routes logical operations to the session's backend.
pub struct Dispatcher {
    backend: Box<dyn Backend>,
}

impl Dispatcher {
    /// Wrap a backend.
    pub fn new(backend: Box<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Dispatcher for `variant` over `transport`, scoped to `region` (a region code).
    pub fn for_variant(
        variant: BackendVariant,
        transport: Arc<dyn Transport>,
        region: &str,
    ) -> Self {
        let backend: Box<dyn Backend> = match variant {
            BackendVariant::Legacy => Box::new(LegacyBackend::new(transport)),
            BackendVariant::NextGen => Box::new(NextGenBackend::new(transport, region)),
        };
        Self::new(backend)
    }

    /// Active variant.
    pub fn variant(&self) -> BackendVariant {
        self.backend.variant()
    }

    /// Whether the active variant has the operation.
    pub fn supports(&self, kind: OperationKind) -> bool {
        self.backend.supports(kind)
    }

    /// Fail early if `op` cannot run on the active variant.
    pub fn check(&self, op: &LogicalOperation) -> Result<()> {
        let kind = op.kind();
        if !self.backend.supports(kind) {
            return Err(Error::unsupported(kind.as_str(), self.variant()));
        }
        self.backend.validate(op)
    }

    /// Check and issue a logical operation.
    pub fn dispatch(&self, op: LogicalOperation) -> Result<BackendResult> {
        self.check(&op)?;
        log::debug!("{}: dispatching {}", self.variant(), op.kind());
        self.backend.execute(&op)
    }

    fn resource(&self, op: LogicalOperation) -> Result<Option<ResourceHandle>> {
        let kind = op.kind();
        match self.dispatch(op)? {
            BackendResult::Resource(handle) => Ok(handle),
            other => Err(unexpected(kind, &other)),
        }
    }

    fn accepted(&self, op: LogicalOperation) -> Result<()> {
        let kind = op.kind();
        match self.dispatch(op)? {
            BackendResult::Accepted => Ok(()),
            other => Err(unexpected(kind, &other)),
        }
    }

    fn codes(&self, op: LogicalOperation) -> Result<Vec<CodeEntry>> {
        let kind = op.kind();
        match self.dispatch(op)? {
            BackendResult::Codes(codes) => Ok(codes),
            other => Err(unexpected(kind, &other)),
        }
    }

    /// Current server, `None` when absent.
    pub fn get_server(&self, id: &str) -> Result<Option<ResourceHandle>> {
        self.resource(LogicalOperation::GetServer { id: id.to_string() })
    }

    /// Create a server and return its first handle.
    pub fn create_server(
        &self,
        spec: &ServerSpec,
        placement: &Placement,
    ) -> Result<ResourceHandle> {
        let op = LogicalOperation::CreateServer {
            spec: spec.clone(),
            placement: placement.clone(),
        };
        self.resource(op)?.ok_or_else(|| {
            Error::Provider(apiclient::Error::decode(
                OperationKind::CreateServer.as_str(),
                "provider returned no server instance",
            ))
        })
    }

    /// Stop a server.
    pub fn stop_server(&self, id: &str) -> Result<()> {
        self.accepted(LogicalOperation::StopServer { id: id.to_string() })
    }

    /// Terminate a server.
    pub fn terminate_server(&self, id: &str) -> Result<()> {
        self.accepted(LogicalOperation::TerminateServer { id: id.to_string() })
    }

    /// Change a server's product code.
    pub fn change_server_spec(&self, id: &str, product_code: &str) -> Result<()> {
        self.accepted(LogicalOperation::ChangeServerSpec {
            id: id.to_string(),
            product_code: product_code.to_string(),
        })
    }

    /// Enable or disable termination protection.
    pub fn set_termination_protection(&self, id: &str, protect: bool) -> Result<()> {
        self.accepted(LogicalOperation::SetTerminationProtection {
            id: id.to_string(),
            protect,
        })
    }

    /// Block storage attached to a server.
    pub fn list_block_storage(&self, server_id: &str) -> Result<Vec<BlockStorage>> {
        let op = LogicalOperation::ListBlockStorage {
            server_id: server_id.to_string(),
        };
        let kind = op.kind();
        match self.dispatch(op)? {
            BackendResult::Storages(storages) => Ok(storages),
            other => Err(unexpected(kind, &other)),
        }
    }

    /// Current block storage, `None` when absent.
    pub fn get_block_storage(&self, id: &str) -> Result<Option<ResourceHandle>> {
        self.resource(LogicalOperation::GetBlockStorage { id: id.to_string() })
    }

    /// Detach a block storage volume.
    pub fn detach_block_storage(&self, id: &str) -> Result<()> {
        self.accepted(LogicalOperation::DetachBlockStorage { id: id.to_string() })
    }

    /// Current load balancer, `None` when absent.
    pub fn get_load_balancer(&self, id: &str) -> Result<Option<ResourceHandle>> {
        self.resource(LogicalOperation::GetLoadBalancer { id: id.to_string() })
    }

    /// Apply a listener change.
    pub fn change_listener(&self, change: &ListenerChange) -> Result<()> {
        self.accepted(LogicalOperation::ChangeListenerConfiguration(change.clone()))
    }

    /// Auto-scaling group by name; the handle id is the variant's group key.
    pub fn get_auto_scaling_group(&self, name: &str) -> Result<Option<ResourceHandle>> {
        self.resource(LogicalOperation::GetAutoScalingGroup {
            name: name.to_string(),
        })
    }

    /// Create a scaling policy under a resolved group.
    pub fn create_scaling_policy(&self, spec: &ScalingPolicySpec, group_key: &str) -> Result<()> {
        self.accepted(LogicalOperation::CreateScalingPolicy {
            spec: spec.clone(),
            group_key: group_key.to_string(),
        })
    }

    /// Scaling policy by name, `None` when absent.
    pub fn get_scaling_policy(
        &self,
        name: &str,
        group_key: &str,
    ) -> Result<Option<ResourceHandle>> {
        self.resource(LogicalOperation::GetScalingPolicy {
            name: name.to_string(),
            group_key: group_key.to_string(),
        })
    }

    /// Delete a scaling policy.
    pub fn delete_scaling_policy(&self, name: &str, group_key: &str) -> Result<()> {
        self.accepted(LogicalOperation::DeleteScalingPolicy {
            name: name.to_string(),
            group_key: group_key.to_string(),
        })
    }

    /// Regions visible to the account.
    pub fn list_regions(&self) -> Result<Vec<CodeEntry>> {
        self.codes(LogicalOperation::ListRegions)
    }

    /// Zones of a region.
    pub fn list_zones(&self, region_key: &str) -> Result<Vec<CodeEntry>> {
        self.codes(LogicalOperation::ListZones {
            region_key: region_key.to_string(),
        })
    }
}

fn unexpected(kind: OperationKind, result: &BackendResult) -> Error {
    Error::Provider(apiclient::Error::decode(
        kind.as_str(),
        format!("unexpected backend result: {result:?}"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use apiclient::MockTransport;
    use serde_json::json;

    fn dispatcher(variant: BackendVariant) -> (MockTransport, Dispatcher) {
        let mock = MockTransport::new();
        let dispatcher = Dispatcher::for_variant(variant, Arc::new(mock.clone()), "KR");
        (mock, dispatcher)
    }

    #[test]
    fn test_unsupported_makes_no_call() {
        let (mock, dispatcher) = dispatcher(BackendVariant::Legacy);
        let err = dispatcher.set_termination_protection("12345", true).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedOnVariant {
                variant: BackendVariant::Legacy,
                ..
            }
        ));
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_invalid_request_makes_no_call() {
        let (mock, dispatcher) = dispatcher(BackendVariant::NextGen);
        let placement = Placement {
            region_key: "KR".into(),
            zone_key: None,
        };
        let err = dispatcher
            .create_server(&ServerSpec::new("SW.VSVR.OS.LNX64.UBNTU.SVR2004.B050"), &placement)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest { .. }));
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_variant_is_fixed_per_dispatcher() {
        let (_, legacy) = dispatcher(BackendVariant::Legacy);
        let (_, next) = dispatcher(BackendVariant::NextGen);
        assert_eq!(legacy.variant(), BackendVariant::Legacy);
        assert_eq!(next.variant(), BackendVariant::NextGen);
        assert!(!legacy.supports(OperationKind::SetTerminationProtection));
        assert!(next.supports(OperationKind::SetTerminationProtection));
    }

    #[test]
    fn test_same_logical_read_normalizes_identically() {
        let (legacy_mock, legacy) = dispatcher(BackendVariant::Legacy);
        legacy_mock.respond(
            "getServerInstanceList",
            json!({
                "returnCode": "0",
                "serverInstanceList": [{
                    "serverInstanceNo": "12345",
                    "serverInstanceStatus": { "code": "RUN", "codeName": "Server run state" },
                    "serverInstanceOperation": { "code": "NULL", "codeName": "Server NULL OP" }
                }]
            }),
        );
        let (next_mock, next) = dispatcher(BackendVariant::NextGen);
        next_mock.respond(
            "getServerInstanceDetail",
            json!({
                "returnCode": "0",
                "serverInstanceList": [{
                    "serverInstanceNo": "12345",
                    "serverInstanceStatus": { "code": "RUN", "codeName": "Server run state" },
                    "serverInstanceOperation": { "code": "NULL", "codeName": "Server NULL OP" }
                }]
            }),
        );

        let a = legacy.get_server("12345").unwrap().unwrap();
        let b = next.get_server("12345").unwrap().unwrap();
        assert_eq!(a.status_code, b.status_code);
        assert_eq!(a.operation_code, b.operation_code);
        assert_eq!(a.id, b.id);
        assert_ne!(a.variant, b.variant);
    }

    #[test]
    fn test_provider_error_passes_through() {
        let (mock, dispatcher) = dispatcher(BackendVariant::Legacy);
        mock.fail("stopServerInstances", "25033", "Server is in operation.");
        let err = dispatcher.stop_server("12345").unwrap_err();
        assert_eq!(err.provider_code(), Some("25033"));
    }
}
