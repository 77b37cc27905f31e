//! Scripted in-memory hypervisor for tests.
//!
//! ```
//! use vsphere_monitor::client::mock::{MockHost, MockHypervisor, MockVm};
//! use vsphere_monitor::client::EntityStatus;
//!
//! let hypervisor = MockHypervisor::new()
//!     .host(MockHost::new("esx-01").vm(MockVm::new("web-01")))
//!     .host(MockHost::new("esx-02").status(EntityStatus::Red));
//! assert_eq!(hypervisor.host_count(), 2);
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{
    Endpoint, EntityStatus, HostHandle, HostHardware, HostQuickStats, HypervisorClient,
    HypervisorSession, VmHandle, VmHardware, VmQuickStats,
};
use crate::{Error, Result};

/// A scripted virtual machine
#[derive(Debug, Clone)]
pub struct MockVm {
    name: String,
    status: EntityStatus,
    quick_stats: VmQuickStats,
    hardware: VmHardware,
    delay: Option<Duration>,
    panic_on_stats: bool,
}

impl MockVm {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: EntityStatus::Green,
            quick_stats: VmQuickStats::default(),
            hardware: VmHardware::default(),
            delay: None,
            panic_on_stats: false,
        }
    }

    pub fn status(mut self, status: EntityStatus) -> Self {
        self.status = status;
        self
    }

    pub fn quick_stats(mut self, stats: VmQuickStats) -> Self {
        self.quick_stats = stats;
        self
    }

    pub fn hardware(mut self, hardware: VmHardware) -> Self {
        self.hardware = hardware;
        self
    }

    /// Sleep this long before answering any query about the VM
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Panic when quick stats are requested
    pub fn panic_on_stats(mut self) -> Self {
        self.panic_on_stats = true;
        self
    }
}

/// A scripted host system
#[derive(Debug, Clone)]
pub struct MockHost {
    name: String,
    status: EntityStatus,
    quick_stats: HostQuickStats,
    hardware: HostHardware,
    vms: Vec<MockVm>,
    delay: Option<Duration>,
    fail_stats: bool,
}

impl MockHost {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: EntityStatus::Green,
            quick_stats: HostQuickStats::default(),
            hardware: HostHardware::default(),
            vms: Vec::new(),
            delay: None,
            fail_stats: false,
        }
    }

    pub fn status(mut self, status: EntityStatus) -> Self {
        self.status = status;
        self
    }

    pub fn quick_stats(mut self, stats: HostQuickStats) -> Self {
        self.quick_stats = stats;
        self
    }

    pub fn hardware(mut self, hardware: HostHardware) -> Self {
        self.hardware = hardware;
        self
    }

    pub fn vm(mut self, vm: MockVm) -> Self {
        self.vms.push(vm);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the quick stats query with a hypervisor error
    pub fn fail_stats(mut self) -> Self {
        self.fail_stats = true;
        self
    }
}

/// Call counters, shared between the client and every session it opened
#[derive(Debug, Default)]
pub struct MockCalls {
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub host_stats: AtomicUsize,
    pub vm_stats: AtomicUsize,
}

impl MockCalls {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn host_stats(&self) -> usize {
        self.host_stats.load(Ordering::SeqCst)
    }

    pub fn vm_stats(&self) -> usize {
        self.vm_stats.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct Inventory {
    hosts: Vec<(HostHandle, MockHost)>,
    vms: Vec<(VmHandle, String, MockVm)>,
}

/// In-memory [`HypervisorClient`]
#[derive(Debug, Clone, Default)]
pub struct MockHypervisor {
    hosts: Vec<MockHost>,
    connect_error: Option<String>,
    disconnect_error: Option<String>,
    calls: Arc<MockCalls>,
}

impl MockHypervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: MockHost) -> Self {
        self.hosts.push(host);
        self
    }

    /// Make every `connect` fail with this message
    pub fn fail_connect(mut self, message: impl Into<String>) -> Self {
        self.connect_error = Some(message.into());
        self
    }

    /// Make every `disconnect` fail with this message
    pub fn fail_disconnect(mut self, message: impl Into<String>) -> Self {
        self.disconnect_error = Some(message.into());
        self
    }

    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    pub fn calls(&self) -> Arc<MockCalls> {
        self.calls.clone()
    }

    fn inventory(&self) -> Inventory {
        let mut inventory = Inventory::default();
        let mut vm_seq = 0;
        for (i, host) in self.hosts.iter().enumerate() {
            let handle = HostHandle::new(format!("host-{}", i + 1), host.name.clone());
            for vm in &host.vms {
                vm_seq += 1;
                inventory.vms.push((
                    VmHandle::new(format!("vm-{}", vm_seq), vm.name.clone()),
                    handle.id.clone(),
                    vm.clone(),
                ));
            }
            inventory.hosts.push((handle, host.clone()));
        }
        inventory
    }
}

#[async_trait::async_trait]
impl HypervisorClient for MockHypervisor {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn HypervisorSession>> {
        self.calls.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(ref message) = self.connect_error {
            return Err(Error::Connection(format!("{}: {}", endpoint.url, message)));
        }
        Ok(Arc::new(MockSession {
            inventory: self.inventory(),
            closed: AtomicBool::new(false),
            disconnect_error: self.disconnect_error.clone(),
            calls: self.calls.clone(),
        }))
    }
}

struct MockSession {
    inventory: Inventory,
    /// Set on disconnect; every later query fails
    closed: AtomicBool,
    disconnect_error: Option<String>,
    calls: Arc<MockCalls>,
}

impl MockSession {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Hypervisor("session is logged out".into()));
        }
        Ok(())
    }

    async fn host(&self, handle: &HostHandle) -> Result<&MockHost> {
        self.ensure_open()?;
        let host = self
            .inventory
            .hosts
            .iter()
            .find(|(h, _)| h.id == handle.id)
            .map(|(_, host)| host)
            .ok_or_else(|| Error::Hypervisor(format!("unknown host {}", handle.id)))?;
        if let Some(delay) = host.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(host)
    }

    async fn vm(&self, handle: &VmHandle) -> Result<&MockVm> {
        self.ensure_open()?;
        let vm = self
            .inventory
            .vms
            .iter()
            .find(|(v, _, _)| v.id == handle.id)
            .map(|(_, _, vm)| vm)
            .ok_or_else(|| Error::Hypervisor(format!("unknown vm {}", handle.id)))?;
        if let Some(delay) = vm.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(vm)
    }
}

#[async_trait::async_trait]
impl HypervisorSession for MockSession {
    async fn find_host(&self, name: &str) -> Result<Option<HostHandle>> {
        self.ensure_open()?;
        Ok(self
            .inventory
            .hosts
            .iter()
            .find(|(h, _)| h.name.eq_ignore_ascii_case(name))
            .map(|(h, _)| h.clone()))
    }

    async fn all_hosts(&self) -> Result<Vec<HostHandle>> {
        self.ensure_open()?;
        Ok(self.inventory.hosts.iter().map(|(h, _)| h.clone()).collect())
    }

    async fn host_vms(&self, host: &HostHandle) -> Result<Vec<VmHandle>> {
        self.ensure_open()?;
        Ok(self
            .inventory
            .vms
            .iter()
            .filter(|(_, owner, _)| *owner == host.id)
            .map(|(v, _, _)| v.clone())
            .collect())
    }

    async fn host_status(&self, host: &HostHandle) -> Result<EntityStatus> {
        Ok(self.host(host).await?.status)
    }

    async fn host_quick_stats(&self, host: &HostHandle) -> Result<HostQuickStats> {
        self.calls.host_stats.fetch_add(1, Ordering::SeqCst);
        let host = self.host(host).await?;
        if host.fail_stats {
            return Err(Error::Hypervisor(format!(
                "quick stats unavailable for {}",
                host.name
            )));
        }
        Ok(host.quick_stats.clone())
    }

    async fn host_hardware(&self, host: &HostHandle) -> Result<HostHardware> {
        Ok(self.host(host).await?.hardware.clone())
    }

    async fn vm_status(&self, vm: &VmHandle) -> Result<EntityStatus> {
        Ok(self.vm(vm).await?.status)
    }

    async fn vm_quick_stats(&self, vm: &VmHandle) -> Result<VmQuickStats> {
        self.calls.vm_stats.fetch_add(1, Ordering::SeqCst);
        let vm = self.vm(vm).await?;
        if vm.panic_on_stats {
            panic!("scripted panic while reading stats of {}", vm.name);
        }
        Ok(vm.quick_stats.clone())
    }

    async fn vm_hardware(&self, vm: &VmHandle) -> Result<VmHardware> {
        Ok(self.vm(vm).await?.hardware.clone())
    }

    async fn disconnect(&self) -> Result<()> {
        self.calls.disconnects.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        match self.disconnect_error {
            Some(ref message) => Err(Error::Hypervisor(message.clone())),
            None => Ok(()),
        }
    }
}
