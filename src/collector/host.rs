//! Host collection task.
//!
//! `Created -> StatusChecked -> {Skipped | MetricsCollected} -> VmsDispatched -> Done`

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::{debug, error, info};

use super::{counter_metric, panic_message, spawn_vm_task, status_metric, CollectionContext};
use crate::barrier::BarrierParty;
use crate::catalog::HostSnapshot;
use crate::client::{EntityStatus, HostHandle};
use crate::inventory::resolve_vms;
use crate::Result;

/// How a host task ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOutcome {
    /// Host reported a critical status; only the status metric was emitted
    Skipped { status: EntityStatus },
    /// Counters were collected and VM tasks dispatched
    Collected {
        status: EntityStatus,
        counters: usize,
        vms_dispatched: usize,
    },
    /// The task failed; the error was logged
    Failed(String),
}

/// Collects one host's counters and fans out to its VMs
pub struct HostCollectionTask {
    ctx: Arc<CollectionContext>,
    server_prefix: Arc<str>,
    host: HostHandle,
    party: BarrierParty,
}

impl HostCollectionTask {
    /// `party` must be registered on `ctx.barrier`
    pub fn new(
        ctx: Arc<CollectionContext>,
        server_prefix: Arc<str>,
        host: HostHandle,
        party: BarrierParty,
    ) -> Self {
        Self {
            ctx,
            server_prefix,
            host,
            party,
        }
    }

    pub fn host(&self) -> &HostHandle {
        &self.host
    }

    /// Run to completion. The barrier party is released on every path.
    pub async fn run(self) -> HostOutcome {
        let outcome = match AssertUnwindSafe(self.collect()).catch_unwind().await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!(host = %self.host.name, error = %e, "error collecting metrics from host");
                HostOutcome::Failed(e.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(host = %self.host.name, panic = %message, "host collector panicked");
                HostOutcome::Failed(message)
            }
        };
        drop(self.party);
        outcome
    }

    async fn collect(&self) -> Result<HostOutcome> {
        let ctx = &self.ctx;
        let session = ctx.session.as_ref();
        let host_path = ctx.host_path(&self.server_prefix, &self.host);

        info!(host = %self.host.name, "collecting host metrics");

        let status = session.host_status(&self.host).await?;
        ctx.buffer.push(status_metric(&host_path, status));
        if status.is_critical() {
            error!(
                host = %self.host.name,
                %status,
                "host status is critical, not collecting metrics"
            );
            return Ok(HostOutcome::Skipped { status });
        }

        let quick_stats = session.host_quick_stats(&self.host).await?;
        let hardware = match session.host_hardware(&self.host).await {
            Ok(hardware) => hardware,
            Err(e) => {
                debug!(host = %self.host.name, error = %e, "hardware info unavailable");
                Default::default()
            }
        };
        let snapshot = HostSnapshot {
            quick_stats,
            hardware,
        };

        let mut counters = 0;
        for compiled in &ctx.catalog.host {
            let metric = (compiled.extract)(&snapshot)
                .and_then(|value| counter_metric(&host_path, &compiled.entry, value));
            match metric {
                Ok(metric) => {
                    ctx.buffer.push(metric);
                    counters += 1;
                }
                Err(e) => {
                    debug!(
                        host = %self.host.name,
                        metric = %compiled.entry.name,
                        error = %e,
                        "skipping metric"
                    );
                }
            }
        }
        info!(host = %self.host.name, counters, "finished collecting host metrics");

        let vms = resolve_vms(session, &self.host, &ctx.selectors).await;
        let host_path: Arc<str> = Arc::from(host_path);
        for vm in vms.found.iter().cloned() {
            info!(host = %self.host.name, vm = %vm.name, "dispatching VM collector");
            // Registered before this task's own party is released.
            let child = self.party.register_child();
            spawn_vm_task(ctx, host_path.clone(), vm, child);
        }

        Ok(HostOutcome::Collected {
            status,
            counters,
            vms_dispatched: vms.found.len(),
        })
    }
}
