//! Response shapes shared by both API generations.
//!
//! Only the fields the backends normalize are modelled; everything else in
//! a response body is ignored.

use converge::{BackendVariant, ResourceHandle, ResourceKind};
use serde::Deserialize;

/// `{code, codeName}` pair used for statuses, operations and types.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonCode {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub code_name: String,
}

/// Server entry in `serverInstanceList`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInstance {
    pub server_instance_no: String,
    #[serde(default)]
    pub server_instance_status: CommonCode,
    #[serde(default)]
    pub server_instance_operation: CommonCode,
}

impl ServerInstance {
    pub fn into_handle(self, variant: BackendVariant) -> ResourceHandle {
        ResourceHandle::new(self.server_instance_no, ResourceKind::Server, variant)
            .with_status(self.server_instance_status.code)
            .with_operation(self.server_instance_operation.code)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInstanceList {
    #[serde(default)]
    pub server_instance_list: Vec<ServerInstance>,
}

impl ServerInstanceList {
    /// First instance as a handle; an empty list means absent.
    pub fn first_handle(self, variant: BackendVariant) -> Option<ResourceHandle> {
        self.server_instance_list
            .into_iter()
            .next()
            .map(|s| s.into_handle(variant))
    }
}

/// Load balancer entry in `loadBalancerInstanceList`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerInstance {
    pub load_balancer_instance_no: String,
    #[serde(default)]
    pub load_balancer_instance_status: CommonCode,
    #[serde(default)]
    pub load_balancer_instance_operation: CommonCode,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerInstanceList {
    #[serde(default)]
    pub load_balancer_instance_list: Vec<LoadBalancerInstance>,
}

impl LoadBalancerInstanceList {
    pub fn first_handle(self, variant: BackendVariant) -> Option<ResourceHandle> {
        self.load_balancer_instance_list.into_iter().next().map(|lb| {
            ResourceHandle::new(lb.load_balancer_instance_no, ResourceKind::LoadBalancer, variant)
                .with_status(lb.load_balancer_instance_status.code)
                .with_operation(lb.load_balancer_instance_operation.code)
        })
    }
}

/// Scaling policy entry in `scalingPolicyList`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalingPolicy {
    pub policy_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalingPolicyList {
    #[serde(default)]
    pub scaling_policy_list: Vec<ScalingPolicy>,
}

impl ScalingPolicyList {
    /// Policy named `name` as a handle. Policies carry no provider status.
    pub fn find_handle(self, name: &str, variant: BackendVariant) -> Option<ResourceHandle> {
        self.scaling_policy_list
            .into_iter()
            .find(|p| p.policy_name == name)
            .map(|p| {
                ResourceHandle::new(p.policy_name, ResourceKind::ScalingPolicy, variant)
                    .with_status(converge::status::ACTIVE)
            })
    }
}

/// Region entry; `regionNo` only exists on Legacy.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    #[serde(default)]
    pub region_no: Option<String>,
    pub region_code: String,
    #[serde(default)]
    pub region_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionList {
    #[serde(default)]
    pub region_list: Vec<Region>,
}

/// Zone entry; `zoneNo` only exists on Legacy.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    #[serde(default)]
    pub zone_no: Option<String>,
    pub zone_code: String,
    #[serde(default)]
    pub zone_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneList {
    #[serde(default)]
    pub zone_list: Vec<Zone>,
}
