//! Resource descriptions the orchestrator works from.

use converge::ResourceHandle;
use serde::{Deserialize, Serialize};

/// Desired server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSpec {
    /// Server name; the provider generates one when absent
    #[serde(default)]
    pub name: Option<String>,
    /// Image product code
    pub image_product_code: String,
    /// Server product code (sizing); provider default when absent
    #[serde(default)]
    pub product_code: Option<String>,
    /// Zone code; falls back to the session's zone
    #[serde(default)]
    pub zone: Option<String>,
    /// Subnet id (NextGen only)
    #[serde(default)]
    pub subnet_id: Option<String>,
    /// Enable termination protection after creation (NextGen only)
    #[serde(default)]
    pub protect_termination: bool,
}

impl ServerSpec {
    /// Spec for an image with everything else defaulted.
    pub fn new(image_product_code: impl Into<String>) -> Self {
        Self {
            image_product_code: image_product_code.into(),
            ..Self::default()
        }
    }
}

/// Change to an existing server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerChange {
    /// New server product code
    #[serde(default)]
    pub product_code: Option<String>,
    /// New termination-protection setting
    #[serde(default)]
    pub protect_termination: Option<bool>,
}

/// Block storage type as far as teardown is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiskType {
    /// Boot disk; goes away with the server and is never detached
    Basic,
    /// Additional volume; must be detached before the server is terminated
    Additional,
}

impl DiskType {
    /// Map a provider storage type code.
    pub fn from_code(code: &str) -> Self {
        if code.eq_ignore_ascii_case("BASIC") {
            Self::Basic
        } else {
            Self::Additional
        }
    }
}

/// Block storage attached to (or listed for) a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStorage {
    /// Normalized handle
    pub handle: ResourceHandle,
    /// Server the volume is attached to
    pub server_id: Option<String>,
    /// Storage type
    pub disk_type: DiskType,
}

impl BlockStorage {
    /// Whether teardown has to detach this volume.
    pub fn needs_detach(&self) -> bool {
        self.disk_type == DiskType::Additional
    }
}

/// Change to one load balancer listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerChange {
    /// Load balancer id
    pub load_balancer_id: String,
    /// Listener id (NextGen only, required there)
    #[serde(default)]
    pub listener_id: Option<String>,
    /// Protocol code (`HTTP`, `TCP`, ...)
    pub protocol: String,
    /// Listening port
    pub port: u16,
    /// Backend server port (Legacy only, required there)
    #[serde(default)]
    pub target_port: Option<u16>,
    /// Balancing algorithm code (Legacy only)
    #[serde(default)]
    pub algorithm: Option<String>,
}

/// Desired scaling policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingPolicySpec {
    /// Policy name, unique within its group
    pub name: String,
    /// Name of the owning auto-scaling group
    pub group_name: String,
    /// Adjustment type code (`CHANG`, `EXACT`, `PRCNT`)
    pub adjustment_type: String,
    /// Adjustment amount
    pub scaling_adjustment: i32,
    /// Cooldown in seconds
    #[serde(default)]
    pub cooldown: Option<u32>,
}

/// Region or zone entry, normalized across variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeEntry {
    /// Key the active variant uses in requests (number or code)
    pub key: String,
    /// Public code (`KR`, `KR-2`, ...)
    pub code: String,
    /// Display name
    pub name: String,
}
