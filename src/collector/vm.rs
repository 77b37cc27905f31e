//! VM collection task.
//!
//! `Created -> StatusChecked -> {Skipped | MetricsCollected} -> Done`

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::{debug, error, info};

use super::{counter_metric, panic_message, status_metric, CollectionContext};
use crate::barrier::BarrierParty;
use crate::catalog::VmSnapshot;
use crate::client::{EntityStatus, VmHandle};
use crate::Result;

/// How a VM task ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmOutcome {
    Skipped { status: EntityStatus },
    Collected { status: EntityStatus, counters: usize },
    Failed(String),
}

/// Collects one VM's counters
pub struct VmCollectionTask {
    ctx: Arc<CollectionContext>,
    host_path: Arc<str>,
    vm: VmHandle,
    party: BarrierParty,
}

impl VmCollectionTask {
    pub fn new(
        ctx: Arc<CollectionContext>,
        host_path: Arc<str>,
        vm: VmHandle,
        party: BarrierParty,
    ) -> Self {
        Self {
            ctx,
            host_path,
            vm,
            party,
        }
    }

    pub fn vm(&self) -> &VmHandle {
        &self.vm
    }

    pub async fn run(self) -> VmOutcome {
        let outcome = match AssertUnwindSafe(self.collect()).catch_unwind().await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!(vm = %self.vm.name, error = %e, "error while collecting VM metrics");
                VmOutcome::Failed(e.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(vm = %self.vm.name, panic = %message, "VM collector panicked");
                VmOutcome::Failed(message)
            }
        };
        drop(self.party);
        outcome
    }

    async fn collect(&self) -> Result<VmOutcome> {
        let ctx = &self.ctx;
        let session = ctx.session.as_ref();
        let vm_path = ctx.vm_path(&self.host_path, &self.vm);

        let status = session.vm_status(&self.vm).await?;
        ctx.buffer.push(status_metric(&vm_path, status));
        if status.is_critical() {
            error!(vm = %self.vm.name, %status, "VM status is critical, not collecting metrics");
            return Ok(VmOutcome::Skipped { status });
        }

        info!(vm = %self.vm.name, "collecting VM metrics");

        let quick_stats = session.vm_quick_stats(&self.vm).await?;
        let hardware = match session.vm_hardware(&self.vm).await {
            Ok(hardware) => hardware,
            Err(e) => {
                debug!(vm = %self.vm.name, error = %e, "hardware config unavailable");
                Default::default()
            }
        };
        let snapshot = VmSnapshot {
            quick_stats,
            hardware,
        };

        let mut counters = 0;
        for compiled in &ctx.catalog.vm {
            match (compiled.extract)(&snapshot)
                .and_then(|value| counter_metric(&vm_path, &compiled.entry, value))
            {
                Ok(metric) => {
                    ctx.buffer.push(metric);
                    counters += 1;
                }
                Err(e) => {
                    debug!(
                        vm = %self.vm.name,
                        metric = %compiled.entry.name,
                        error = %e,
                        "skipping metric"
                    );
                }
            }
        }

        info!(vm = %self.vm.name, counters, "finished collecting VM metrics");
        Ok(VmOutcome::Collected { status, counters })
    }
}
