//! Hypervisor client seam.
//!
//! The collectors never talk to vSphere directly. They go through
//! [`HypervisorClient`] to open a [`HypervisorSession`], and the session is
//! shared read-only by every concurrent task of a run.
//!
//! The SDK binding itself lives outside this crate; [`mock::MockHypervisor`]
//! provides a scripted inventory for tests.

pub mod mock;

use std::fmt;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::Result;

pub use mock::MockHypervisor;

/// Connection parameters for one vCenter / ESXi endpoint
pub struct Endpoint {
    /// SDK URL, e.g. `https://vcenter.example.com/sdk`
    pub url: String,
    /// Login user
    pub username: String,
    password: SecretString,
}

impl Endpoint {
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password: SecretString,
    ) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            password,
        }
    }

    /// Endpoint for the standard SDK path of `host`
    pub fn for_host(host: &str, username: impl Into<String>, password: SecretString) -> Self {
        Self::new(format!("https://{}/sdk", host), username, password)
    }

    /// Password for the login call
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Opaque reference to a host system in the inventory
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostHandle {
    /// Managed object id (e.g. `host-42`)
    pub id: String,
    /// Inventory display name
    pub name: String,
}

impl HostHandle {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Opaque reference to a virtual machine in the inventory
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VmHandle {
    /// Managed object id (e.g. `vm-1017`)
    pub id: String,
    /// Inventory display name
    pub name: String,
}

impl VmHandle {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Overall health of a managed entity.
///
/// Discriminants are the codes reported in the `Status` metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityStatus {
    Gray = 0,
    Green = 1,
    Yellow = 2,
    Red = 3,
}

impl EntityStatus {
    /// Numeric status code
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Red entities are reported but not collected
    pub fn is_critical(self) -> bool {
        self == EntityStatus::Red
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityStatus::Gray => write!(f, "gray"),
            EntityStatus::Green => write!(f, "green"),
            EntityStatus::Yellow => write!(f, "yellow"),
            EntityStatus::Red => write!(f, "red"),
        }
    }
}

/// Host quick stats. Fields the hypervisor version does not report are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostQuickStats {
    /// Aggregated CPU usage across all cores, in MHz
    pub overall_cpu_usage: Option<i64>,
    /// Physical memory usage, in MB
    pub overall_memory_usage: Option<i64>,
    pub distributed_cpu_fairness: Option<i64>,
    pub distributed_memory_fairness: Option<i64>,
    /// Seconds since boot
    pub uptime: Option<i64>,
}

/// Host hardware summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostHardware {
    /// Physical memory, in bytes
    pub memory_size: Option<i64>,
    /// Per-core frequency, in Hz
    pub cpu_hz: Option<i64>,
    pub num_cpu_cores: Option<i16>,
}

/// VM quick stats. Fields the hypervisor version does not report are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VmQuickStats {
    pub ballooned_memory: Option<i64>,
    pub compressed_memory: Option<i64>,
    pub consumed_overhead_memory: Option<i64>,
    pub distributed_cpu_entitlement: Option<i64>,
    pub distributed_memory_entitlement: Option<i64>,
    pub guest_memory_usage: Option<i64>,
    pub host_memory_usage: Option<i64>,
    pub overall_cpu_usage: Option<i64>,
    pub overall_cpu_demand: Option<i64>,
    pub private_memory: Option<i64>,
    pub shared_memory: Option<i64>,
    pub static_cpu_entitlement: Option<i64>,
    pub static_memory_entitlement: Option<i64>,
    pub swapped_memory: Option<i64>,
    pub uptime_seconds: Option<i64>,
}

/// VM hardware configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VmHardware {
    pub memory_mb: Option<i64>,
    pub num_cpu: Option<i64>,
}

/// Opens sessions against a hypervisor endpoint
#[async_trait::async_trait]
pub trait HypervisorClient: Send + Sync {
    /// Log in and return a session rooted at the inventory root folder.
    ///
    /// Failures are reported as [`crate::Error::Connection`].
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn HypervisorSession>>;
}

/// An authenticated, read-only view of the inventory.
///
/// Shared by every collection task of a run; implementations must be safe
/// for concurrent queries.
#[async_trait::async_trait]
pub trait HypervisorSession: Send + Sync {
    /// Find a host by name, ignoring ASCII case
    async fn find_host(&self, name: &str) -> Result<Option<HostHandle>>;

    /// Every host reachable from the inventory root
    async fn all_hosts(&self) -> Result<Vec<HostHandle>>;

    /// VMs currently attached to `host`
    async fn host_vms(&self, host: &HostHandle) -> Result<Vec<VmHandle>>;

    async fn host_status(&self, host: &HostHandle) -> Result<EntityStatus>;

    async fn host_quick_stats(&self, host: &HostHandle) -> Result<HostQuickStats>;

    async fn host_hardware(&self, host: &HostHandle) -> Result<HostHardware>;

    async fn vm_status(&self, vm: &VmHandle) -> Result<EntityStatus>;

    async fn vm_quick_stats(&self, vm: &VmHandle) -> Result<VmQuickStats>;

    async fn vm_hardware(&self, vm: &VmHandle) -> Result<VmHardware>;

    /// Log out
    async fn disconnect(&self) -> Result<()>;
}
