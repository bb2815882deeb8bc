//! Legacy API generation.
//!
//! Servers are looked up through filtered list calls (an empty list means
//! absent), regions and zones are addressed by number, scaling groups by
//! name, and listener changes rewrite the whole rule set.

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

const SERVER: &str = "/server/v2";
const LOAD_BALANCER: &str = "/loadbalancer/v2";
const AUTO_SCALING: &str = "/autoscaling/v2";

/// Algorithm used when a listener change names none.
const DEFAULT_ALGORITHM: &str = "RR";

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
    block_storage_type: CommonCode,
}

impl StorageInstance {
    fn into_storage(self) -> BlockStorage {
        BlockStorage {
            handle: ResourceHandle::new(
                self.block_storage_instance_no,
                ResourceKind::BlockStorage,
                BackendVariant::Legacy,
            )
            .with_status(self.block_storage_instance_status.code)
            .with_operation(self.block_storage_instance_operation.code),
            server_id: self.server_instance_no.filter(|s| !s.is_empty()),
            disk_type: DiskType::from_code(&self.block_storage_type.code),
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
    auto_scaling_group_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScalingGroupList {
    #[serde(default)]
    auto_scaling_group_list: Vec<ScalingGroup>,
}

/// Backend for the legacy API generation.
pub struct LegacyBackend {
    transport: Arc<dyn Transport>,
}

impl LegacyBackend {
    /// Create a backend over `transport`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    fn call<T: DeserializeOwned>(&self, request: &Request) -> Result<T> {
        let body = self.transport.issue(request)?;
        Ok(apiclient::decode(&request.action, body)?)
    }

    fn accept(&self, request: &Request) -> Result<BackendResult> {
        self.call::<CommonResponse>(request)?;
        Ok(BackendResult::Accepted)
    }

    fn server_action(&self, action: &str, id: &str) -> Result<BackendResult> {
        self.accept(&Request::new(SERVER, action).list_param("serverInstanceNoList", [id]))
    }

    fn get_server(&self, id: &str) -> Result<BackendResult> {
        let req =
            Request::new(SERVER, "getServerInstanceList").list_param("serverInstanceNoList", [id]);
        let list: ServerInstanceList = self.call(&req)?;
        Ok(BackendResult::Resource(list.first_handle(BackendVariant::Legacy)))
    }

    fn create_server(
        &self,
        spec: &ServerSpec,
        region_key: &str,
        zone_key: Option<&str>,
    ) -> Result<BackendResult> {
        let req = Request::new(SERVER, "createServerInstances")
            .param("serverImageProductCode", spec.image_product_code.as_str())
            .opt_param("serverProductCode", spec.product_code.as_deref())
            .opt_param("serverName", spec.name.as_deref())
            .param("regionNo", region_key)
            .opt_param("zoneNo", zone_key);
        let list: ServerInstanceList = self.call(&req)?;
        Ok(BackendResult::Resource(list.first_handle(BackendVariant::Legacy)))
    }

    fn storages(&self, req: &Request) -> Result<Vec<BlockStorage>> {
        let list: StorageInstanceList = self.call(req)?;
        Ok(list
            .block_storage_instance_list
            .into_iter()
            .map(StorageInstance::into_storage)
            .collect())
    }

    fn change_listener(&self, change: &ListenerChange) -> Result<BackendResult> {
        let target_port = change.target_port.ok_or_else(|| {
            Error::invalid(
                OperationKind::ChangeListenerConfiguration.as_str(),
                "target_port is required",
            )
        })?;
        let req = Request::new(LOAD_BALANCER, "changeLoadBalancerInstanceConfiguration")
            .param("loadBalancerInstanceNo", change.load_balancer_id.as_str())
            .param(
                "loadBalancerAlgorithmTypeCode",
                change.algorithm.as_deref().unwrap_or(DEFAULT_ALGORITHM),
            )
            .param("loadBalancerRuleList.1.protocolTypeCode", change.protocol.as_str())
            .param("loadBalancerRuleList.1.loadBalancerPort", change.port.to_string())
            .param("loadBalancerRuleList.1.serverPort", target_port.to_string());
        self.accept(&req)
    }

    fn get_group(&self, name: &str) -> Result<BackendResult> {
        let req = Request::new(AUTO_SCALING, "getAutoScalingGroupList")
            .list_param("autoScalingGroupNameList", [name]);
        let list: ScalingGroupList = self.call(&req)?;
        let handle = list
            .auto_scaling_group_list
            .into_iter()
            .find(|g| g.auto_scaling_group_name == name)
            .map(|g| {
                ResourceHandle::new(
                    g.auto_scaling_group_name,
                    ResourceKind::AutoScalingGroup,
                    BackendVariant::Legacy,
                )
                .with_status(converge::status::ACTIVE)
            });
        Ok(BackendResult::Resource(handle))
    }

    fn put_policy(&self, spec: &ScalingPolicySpec, group_key: &str) -> Result<BackendResult> {
        let req = Request::new(AUTO_SCALING, "putScalingPolicy")
            .param("policyName", spec.name.as_str())
            .param("autoScalingGroupName", group_key)
            .param("adjustmentTypeCode", spec.adjustment_type.as_str())
            .param("scalingAdjustment", spec.scaling_adjustment.to_string())
            .opt_param("cooldown", spec.cooldown.map(|c| c.to_string()));
        self.accept(&req)
    }

    fn get_policy(&self, name: &str, group_key: &str) -> Result<BackendResult> {
        let req = Request::new(AUTO_SCALING, "getAutoScalingPolicyList")
            .param("autoScalingGroupName", group_key)
            .list_param("policyNameList", [name]);
        let list: ScalingPolicyList = self.call(&req)?;
        Ok(BackendResult::Resource(list.find_handle(name, BackendVariant::Legacy)))
    }

    fn regions(&self) -> Result<BackendResult> {
        let req = Request::new(SERVER, "getRegionList");
        let list: RegionList = self.call(&req)?;
        let codes = list
            .region_list
            .into_iter()
            .map(|r| -> Result<CodeEntry> {
                let key = r.region_no.ok_or_else(|| {
                    let detail = format!("region {} has no regionNo", r.region_code);
                    apiclient::Error::decode("getRegionList", detail)
                })?;
                Ok(CodeEntry {
                    key,
                    code: r.region_code,
                    name: r.region_name,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(BackendResult::Codes(codes))
    }

    fn zones(&self, region_key: &str) -> Result<BackendResult> {
        let req = Request::new(SERVER, "getZoneList").param("regionNo", region_key);
        let list: ZoneList = self.call(&req)?;
        let codes = list
            .zone_list
            .into_iter()
            .map(|z| -> Result<CodeEntry> {
                let key = z.zone_no.ok_or_else(|| {
                    let detail = format!("zone {} has no zoneNo", z.zone_code);
                    apiclient::Error::decode("getZoneList", detail)
                })?;
                Ok(CodeEntry {
                    key,
                    code: z.zone_code,
                    name: z.zone_name,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(BackendResult::Codes(codes))
    }
}

impl Backend for LegacyBackend {
    fn variant(&self) -> BackendVariant {
        BackendVariant::Legacy
    }

    fn supports(&self, kind: OperationKind) -> bool {
        !matches!(kind, OperationKind::SetTerminationProtection)
    }

    fn validate(&self, op: &LogicalOperation) -> Result<()> {
        match op {
            LogicalOperation::CreateServer { spec, .. } if spec.subnet_id.is_some() => {
                Err(Error::invalid(
                    op.kind().as_str(),
                    "subnet_id is not accepted by the legacy backend",
                ))
            }
            LogicalOperation::ChangeListenerConfiguration(change)
                if change.target_port.is_none() =>
            {
                Err(Error::invalid(op.kind().as_str(), "target_port is required"))
            }
            _ => Ok(()),
        }
    }

    fn execute(&self, op: &LogicalOperation) -> Result<BackendResult> {
        match op {
            LogicalOperation::GetServer { id } => self.get_server(id),
            LogicalOperation::CreateServer { spec, placement } => {
                self.create_server(spec, &placement.region_key, placement.zone_key.as_deref())
            }
            LogicalOperation::StopServer { id } => self.server_action("stopServerInstances", id),
            LogicalOperation::StartServer { id } => self.server_action("startServerInstances", id),
            LogicalOperation::TerminateServer { id } => {
                self.server_action("terminateServerInstances", id)
            }
            LogicalOperation::ChangeServerSpec { id, product_code } => self.accept(
                &Request::new(SERVER, "changeServerInstanceSpec")
                    .param("serverInstanceNo", id.as_str())
                    .param("serverProductCode", product_code.as_str()),
            ),
            LogicalOperation::ListBlockStorage { server_id } => {
                let req = Request::new(SERVER, "getBlockStorageInstanceList")
                    .param("serverInstanceNo", server_id.as_str());
                Ok(BackendResult::Storages(self.storages(&req)?))
            }
            LogicalOperation::GetBlockStorage { id } => {
                let req = Request::new(SERVER, "getBlockStorageInstanceList")
                    .list_param("blockStorageInstanceNoList", [id.as_str()]);
                let handle = self.storages(&req)?.into_iter().next().map(|s| s.handle);
                Ok(BackendResult::Resource(handle))
            }
            LogicalOperation::DetachBlockStorage { id } => self.accept(
                &Request::new(SERVER, "detachBlockStorageInstances")
                    .list_param("blockStorageInstanceNoList", [id.as_str()]),
            ),
            LogicalOperation::GetLoadBalancer { id } => {
                let req = Request::new(LOAD_BALANCER, "getLoadBalancerInstanceList")
                    .list_param("loadBalancerInstanceNoList", [id.as_str()]);
                let list: LoadBalancerInstanceList = self.call(&req)?;
                Ok(BackendResult::Resource(list.first_handle(BackendVariant::Legacy)))
            }
            LogicalOperation::ChangeListenerConfiguration(change) => self.change_listener(change),
            LogicalOperation::GetAutoScalingGroup { name } => self.get_group(name),
            LogicalOperation::CreateScalingPolicy { spec, group_key } => {
                self.put_policy(spec, group_key)
            }
            LogicalOperation::GetScalingPolicy { name, group_key } => {
                self.get_policy(name, group_key)
            }
            LogicalOperation::DeleteScalingPolicy { name, group_key } => self.accept(
                &Request::new(AUTO_SCALING, "deleteScalingPolicy")
                    .param("policyName", name.as_str())
                    .param("autoScalingGroupName", group_key.as_str()),
            ),
            LogicalOperation::ListRegions => self.regions(),
            LogicalOperation::ListZones { region_key } => self.zones(region_key),
            LogicalOperation::SetTerminationProtection { .. } => {
                Err(Error::unsupported(op.kind().as_str(), BackendVariant::Legacy))
            }
        }
    }
}
