//! Host and VM collection tasks.
//!
//! Every task owns the [`BarrierParty`] it was registered with and drops it
//! when it finishes, whatever the outcome. Host tasks register a child party
//! for each VM task before spawning it, so the barrier cannot drain while a
//! VM task is still pending.

pub mod host;
pub mod vm;

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::barrier::{BarrierParty, CollectionBarrier};
use crate::catalog::{CompiledCatalog, MetricCatalogEntry};
use crate::client::{EntityStatus, HostHandle, HypervisorSession, VmHandle};
use crate::format::{to_whole_number_string, Observation};
use crate::inventory::HostSelector;
use crate::metric::{metric_path, CollectedMetric, ResultBuffer};
use crate::sanitize::NameSanitizer;
use crate::{Error, Result};

pub use host::{HostCollectionTask, HostOutcome};
pub use vm::{VmCollectionTask, VmOutcome};

/// Path segment between a server prefix and a host name
pub const HOST_SEGMENT: &str = "HostSystem";
/// Path segment between a host path and a VM name
pub const VM_SEGMENT: &str = "VirtualMachine";
/// Name of the per-entity status metric
pub const STATUS_METRIC: &str = "status";
/// Last path segment of the per-entity status metric
pub const STATUS_SEGMENT: &str = "Status";

/// Default host worker pool size
pub const DEFAULT_HOST_WORKERS: usize = 2;
/// Default VM worker pool size
pub const DEFAULT_VM_WORKERS: usize = 4;

/// Bounded worker pools for host and VM tasks
#[derive(Debug, Clone)]
pub struct WorkerPools {
    host: Arc<Semaphore>,
    vm: Arc<Semaphore>,
}

impl WorkerPools {
    pub fn new(host_workers: usize, vm_workers: usize) -> Self {
        Self {
            host: Arc::new(Semaphore::new(host_workers.max(1))),
            vm: Arc::new(Semaphore::new(vm_workers.max(1))),
        }
    }

    async fn acquire_host(&self) -> Result<OwnedSemaphorePermit> {
        self.host
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| Error::Task(format!("host pool closed: {}", e)))
    }

    async fn acquire_vm(&self) -> Result<OwnedSemaphorePermit> {
        self.vm
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| Error::Task(format!("VM pool closed: {}", e)))
    }

    /// Idle host workers
    pub fn available_host_workers(&self) -> usize {
        self.host.available_permits()
    }

    /// Idle VM workers
    pub fn available_vm_workers(&self) -> usize {
        self.vm.available_permits()
    }
}

impl Default for WorkerPools {
    fn default() -> Self {
        Self::new(DEFAULT_HOST_WORKERS, DEFAULT_VM_WORKERS)
    }
}

/// State shared by every task of one run
pub struct CollectionContext {
    pub session: Arc<dyn HypervisorSession>,
    pub buffer: Arc<ResultBuffer>,
    pub barrier: CollectionBarrier,
    pub sanitizer: Arc<NameSanitizer>,
    pub catalog: Arc<CompiledCatalog>,
    pub selectors: Arc<Vec<HostSelector>>,
    pub pools: WorkerPools,
}

impl CollectionContext {
    /// `<server prefix>|HostSystem|<sanitized host name>`
    pub fn host_path(&self, server_prefix: &str, host: &HostHandle) -> String {
        metric_path([
            server_prefix,
            HOST_SEGMENT,
            self.sanitizer.apply(&host.name).as_str(),
        ])
    }

    /// `<host path>|VirtualMachine|<sanitized vm name>`
    pub fn vm_path(&self, host_path: &str, vm: &VmHandle) -> String {
        metric_path([
            host_path,
            VM_SEGMENT,
            self.sanitizer.apply(&vm.name).as_str(),
        ])
    }
}

/// Status metric for an entity rooted at `base_path`
pub fn status_metric(base_path: &str, status: EntityStatus) -> CollectedMetric {
    CollectedMetric::new(
        STATUS_METRIC,
        status.code().to_string(),
        metric_path([base_path, STATUS_SEGMENT]),
    )
}

/// Counter metric for a catalog entry rooted at `base_path`
pub fn counter_metric(
    base_path: &str,
    entry: &MetricCatalogEntry,
    value: Observation,
) -> Result<CollectedMetric> {
    if !value.is_finite() {
        return Err(Error::extraction(&entry.name, "value is not finite"));
    }
    let name = entry.display_name();
    Ok(CollectedMetric::new(
        name,
        to_whole_number_string(value),
        metric_path([base_path, name]),
    )
    .with_properties(entry.extra_properties.clone()))
}

/// Register a party for `host` and run its task on the host pool.
pub fn spawn_host_task(
    ctx: &Arc<CollectionContext>,
    server_prefix: Arc<str>,
    host: HostHandle,
) -> tokio::task::JoinHandle<()> {
    let party = ctx.barrier.register();
    let task = HostCollectionTask::new(ctx.clone(), server_prefix, host, party);
    let pools = ctx.pools.clone();
    tokio::spawn(async move {
        let _permit = match pools.acquire_host().await {
            Ok(permit) => permit,
            Err(e) => {
                tracing::error!(host = %task.host().name, error = %e, "host task not started");
                return;
            }
        };
        let outcome = task.run().await;
        tracing::debug!(?outcome, "host task finished");
    })
}

/// Run a VM task on the VM pool. `party` must already be registered.
pub fn spawn_vm_task(
    ctx: &Arc<CollectionContext>,
    host_path: Arc<str>,
    vm: VmHandle,
    party: BarrierParty,
) -> tokio::task::JoinHandle<()> {
    let task = VmCollectionTask::new(ctx.clone(), host_path, vm, party);
    let pools = ctx.pools.clone();
    tokio::spawn(async move {
        let _permit = match pools.acquire_vm().await {
            Ok(permit) => permit,
            Err(e) => {
                tracing::error!(vm = %task.vm().name, error = %e, "VM task not started");
                return;
            }
        };
        let outcome = task.run().await;
        tracing::debug!(?outcome, "VM task finished");
    })
}

/// Render a caught panic payload
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
