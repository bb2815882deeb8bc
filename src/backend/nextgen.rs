//! NextGen (VPC) API generation.
//!
//! Single resources are read through detail calls that fail with
//! [`OBJECT_NOT_FOUND`] when the resource is gone. Regions and zones are
//! addressed by code, scaling groups by number, and every call carries the
//! session's region code.

use super::wire::{
    CommonCode, LoadBalancerInstanceList, RegionList, ScalingPolicyList, ServerInstanceList,
    ZoneList,
};
use super::{Backend, BackendResult, LogicalOperation, OperationKind};
use crate::types::{
    BlockStorage, CodeEntry, DiskType, ListenerChange, ScalingPolicySpec, ServerSpec,
};
use apiclient::{CommonResponse, Request, Transport};
use converge::{BackendVariant, Error, ResourceHandle, ResourceKind, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

const SERVER: &str = "/vserver/v2";
const LOAD_BALANCER: &str = "/vloadbalancer/v2";
const AUTO_SCALING: &str = "/vautoscaling/v2";

/// Return code of a detail call for an id that does not exist.
pub const OBJECT_NOT_FOUND: &str = "1200002";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageInstance {
    block_storage_instance_no: String,
    #[serde(default)]
    server_instance_no: Option<String>,
    #[serde(default)]
    block_storage_instance_status: CommonCode,
    #[serde(default)]
    block_storage_instance_operation: CommonCode,
    #[serde(default)]
    block_storage_type_code: String,
}

impl StorageInstance {
    fn into_storage(self) -> BlockStorage {
        BlockStorage {
            handle: ResourceHandle::new(
                self.block_storage_instance_no,
                ResourceKind::BlockStorage,
                BackendVariant::NextGen,
            )
            .with_status(self.block_storage_instance_status.code)
            .with_operation(self.block_storage_instance_operation.code),
            server_id: self.server_instance_no.filter(|s| !s.is_empty()),
            disk_type: DiskType::from_code(&self.block_storage_type_code),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageInstanceList {
    #[serde(default)]
    block_storage_instance_list: Vec<StorageInstance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScalingGroup {
    auto_scaling_group_no: String,
    auto_scaling_group_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScalingGroupList {
    #[serde(default)]
    auto_scaling_group_list: Vec<ScalingGroup>,
}

/// Backend for the NextGen API generation.
pub struct NextGenBackend {
    transport: Arc<dyn Transport>,
    region: String,
}

impl NextGenBackend {
    /// Create a backend over `transport` for a region code.
    pub fn new(transport: Arc<dyn Transport>, region: impl Into<String>) -> Self {
        Self {
            transport,
            region: region.into(),
        }
    }

    fn request(&self, service: &str, action: &str) -> Request {
        Request::new(service, action).param("regionCode", self.region.as_str())
    }

    fn call<T: DeserializeOwned>(&self, request: &Request) -> Result<T> {
        let body = self.transport.issue(request)?;
        Ok(apiclient::decode(&request.action, body)?)
    }

    /// Detail call where "object not found" means absent.
    fn detail<T: DeserializeOwned>(&self, request: &Request) -> Result<Option<T>> {
        match self.call(request) {
            Ok(value) => Ok(Some(value)),
            Err(Error::Provider(e)) if e.code() == Some(OBJECT_NOT_FOUND) => {
                log::debug!("{}: {} reports object not found", request.action, self.region);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn accept(&self, request: &Request) -> Result<BackendResult> {
        self.call::<CommonResponse>(request)?;
        Ok(BackendResult::Accepted)
    }

    fn server_action(&self, action: &str, id: &str) -> Result<BackendResult> {
        self.accept(&self.request(SERVER, action).list_param("serverInstanceNoList", [id]))
    }

    fn get_server(&self, id: &str) -> Result<BackendResult> {
        let req = self
            .request(SERVER, "getServerInstanceDetail")
            .param("serverInstanceNo", id);
        let handle = self
            .detail::<ServerInstanceList>(&req)?
            .and_then(|list| list.first_handle(BackendVariant::NextGen));
        Ok(BackendResult::Resource(handle))
    }

    fn create_server(&self, spec: &ServerSpec, region_key: &str) -> Result<BackendResult> {
        let subnet = spec.subnet_id.as_deref().ok_or_else(|| {
            Error::invalid(OperationKind::CreateServer.as_str(), "subnet_id is required")
        })?;
        let req = Request::new(SERVER, "createServerInstances")
            .param("regionCode", region_key)
            .param("serverImageProductCode", spec.image_product_code.as_str())
            .opt_param("serverProductCode", spec.product_code.as_deref())
            .opt_param("serverName", spec.name.as_deref())
            .param("subnetNo", subnet);
        let list: ServerInstanceList = self.call(&req)?;
        Ok(BackendResult::Resource(list.first_handle(BackendVariant::NextGen)))
    }

    fn storages(&self, server_id: &str) -> Result<Vec<BlockStorage>> {
        let req = self
            .request(SERVER, "getBlockStorageInstanceList")
            .param("serverInstanceNo", server_id);
        let list: StorageInstanceList = self.call(&req)?;
        Ok(list
            .block_storage_instance_list
            .into_iter()
            .map(StorageInstance::into_storage)
            .collect())
    }

    fn get_storage(&self, id: &str) -> Result<BackendResult> {
        let req = self
            .request(SERVER, "getBlockStorageInstanceDetail")
            .param("blockStorageInstanceNo", id);
        let handle = self.detail::<StorageInstanceList>(&req)?.and_then(|list| {
            list.block_storage_instance_list
                .into_iter()
                .next()
                .map(|s| s.into_storage().handle)
        });
        Ok(BackendResult::Resource(handle))
    }

    fn get_load_balancer(&self, id: &str) -> Result<BackendResult> {
        let req = self
            .request(LOAD_BALANCER, "getLoadBalancerInstanceDetail")
            .param("loadBalancerInstanceNo", id);
        let handle = self
            .detail::<LoadBalancerInstanceList>(&req)?
            .and_then(|list| list.first_handle(BackendVariant::NextGen));
        Ok(BackendResult::Resource(handle))
    }

    fn change_listener(&self, change: &ListenerChange) -> Result<BackendResult> {
        let listener = change.listener_id.as_deref().ok_or_else(|| {
            Error::invalid(
                OperationKind::ChangeListenerConfiguration.as_str(),
                "listener_id is required",
            )
        })?;
        let req = self
            .request(LOAD_BALANCER, "changeLoadBalancerListenerConfiguration")
            .param("loadBalancerListenerNo", listener)
            .param("protocolTypeCode", change.protocol.as_str())
            .param("port", change.port.to_string());
        self.accept(&req)
    }

    fn get_group(&self, name: &str) -> Result<BackendResult> {
        let req = self.request(AUTO_SCALING, "getAutoScalingGroupList");
        let list: ScalingGroupList = self.call(&req)?;
        let handle = list
            .auto_scaling_group_list
            .into_iter()
            .find(|g| g.auto_scaling_group_name == name)
            .map(|g| {
                ResourceHandle::new(
                    g.auto_scaling_group_no,
                    ResourceKind::AutoScalingGroup,
                    BackendVariant::NextGen,
                )
                .with_status(converge::status::ACTIVE)
            });
        Ok(BackendResult::Resource(handle))
    }

    fn put_policy(&self, spec: &ScalingPolicySpec, group_key: &str) -> Result<BackendResult> {
        let req = self
            .request(AUTO_SCALING, "putScalingPolicy")
            .param("autoScalingGroupNo", group_key)
            .param("policyName", spec.name.as_str())
            .param("adjustmentTypeCode", spec.adjustment_type.as_str())
            .param("scalingAdjustment", spec.scaling_adjustment.to_string())
            .opt_param("coolDown", spec.cooldown.map(|c| c.to_string()));
        self.accept(&req)
    }

    fn get_policy(&self, name: &str, group_key: &str) -> Result<BackendResult> {
        let req = self
            .request(AUTO_SCALING, "getScalingPolicyList")
            .param("autoScalingGroupNo", group_key)
            .list_param("policyNameList", [name]);
        let list: ScalingPolicyList = self.call(&req)?;
        Ok(BackendResult::Resource(list.find_handle(name, BackendVariant::NextGen)))
    }

    fn regions(&self) -> Result<BackendResult> {
        let list: RegionList = self.call(&Request::new(SERVER, "getRegionList"))?;
        let codes = list
            .region_list
            .into_iter()
            .map(|r| CodeEntry {
                key: r.region_code.clone(),
                code: r.region_code,
                name: r.region_name,
            })
            .collect();
        Ok(BackendResult::Codes(codes))
    }

    fn zones(&self, region_key: &str) -> Result<BackendResult> {
        let req = Request::new(SERVER, "getZoneList").param("regionCode", region_key);
        let list: ZoneList = self.call(&req)?;
        let codes = list
            .zone_list
            .into_iter()
            .map(|z| CodeEntry {
                key: z.zone_code.clone(),
                code: z.zone_code,
                name: z.zone_name,
            })
            .collect();
        Ok(BackendResult::Codes(codes))
    }
}

impl Backend for NextGenBackend {
    fn variant(&self) -> BackendVariant {
        BackendVariant::NextGen
    }

    fn supports(&self, _kind: OperationKind) -> bool {
        true
    }

    fn validate(&self, op: &LogicalOperation) -> Result<()> {
        match op {
            LogicalOperation::CreateServer { spec, .. } if spec.subnet_id.is_none() => {
                Err(Error::invalid(
                    op.kind().as_str(),
                    "subnet_id is required by the next_gen backend",
                ))
            }
            LogicalOperation::ChangeListenerConfiguration(change)
                if change.listener_id.is_none() =>
            {
                Err(Error::invalid(
                    op.kind().as_str(),
                    "listener_id is required by the next_gen backend",
                ))
            }
            _ => Ok(()),
        }
    }

    fn execute(&self, op: &LogicalOperation) -> Result<BackendResult> {
        match op {
            LogicalOperation::GetServer { id } => self.get_server(id),
            LogicalOperation::CreateServer { spec, placement } => {
                self.create_server(spec, &placement.region_key)
            }
            LogicalOperation::StopServer { id } => self.server_action("stopServerInstances", id),
            LogicalOperation::StartServer { id } => self.server_action("startServerInstances", id),
            LogicalOperation::TerminateServer { id } => {
                self.server_action("terminateServerInstances", id)
            }
            LogicalOperation::ChangeServerSpec { id, product_code } => self.accept(
                &self
                    .request(SERVER, "changeServerInstanceSpec")
                    .param("serverInstanceNo", id.as_str())
                    .param("serverProductCode", product_code.as_str()),
            ),
            LogicalOperation::SetTerminationProtection { id, protect } => self.accept(
                &self
                    .request(SERVER, "setProtectServerTermination")
                    .param("serverInstanceNo", id.as_str())
                    .param("isProtectServerTermination", protect.to_string()),
            ),
            LogicalOperation::ListBlockStorage { server_id } => {
                Ok(BackendResult::Storages(self.storages(server_id)?))
            }
            LogicalOperation::GetBlockStorage { id } => self.get_storage(id),
            LogicalOperation::DetachBlockStorage { id } => self.accept(
                &self
                    .request(SERVER, "detachBlockStorageInstances")
                    .list_param("blockStorageInstanceNoList", [id.as_str()]),
            ),
            LogicalOperation::GetLoadBalancer { id } => self.get_load_balancer(id),
            LogicalOperation::ChangeListenerConfiguration(change) => self.change_listener(change),
            LogicalOperation::GetAutoScalingGroup { name } => self.get_group(name),
            LogicalOperation::CreateScalingPolicy { spec, group_key } => {
                self.put_policy(spec, group_key)
            }
            LogicalOperation::GetScalingPolicy { name, group_key } => {
                self.get_policy(name, group_key)
            }
            LogicalOperation::DeleteScalingPolicy { name, group_key } => self.accept(
                &self
                    .request(AUTO_SCALING, "deleteScalingPolicy")
                    .param("autoScalingGroupNo", group_key.as_str())
                    .param("policyName", name.as_str()),
            ),
            LogicalOperation::ListRegions => self.regions(),
            LogicalOperation::ListZones { region_key } => self.zones(region_key),
        }
    }
}
