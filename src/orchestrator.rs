//! One collection run against one endpoint.
//!
//! connect -> heartbeat -> resolve hosts -> fan out -> barrier -> disconnect -> publish

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, Instrument};
use uuid::Uuid;

use crate::barrier::CollectionBarrier;
use crate::catalog::CompiledCatalog;
use crate::client::{Endpoint, HypervisorClient, HypervisorSession};
use crate::collector::{
    spawn_host_task, CollectionContext, WorkerPools, DEFAULT_HOST_WORKERS, DEFAULT_VM_WORKERS,
};
use crate::config::{MonitorConfig, ServerConfig};
use crate::inventory::{resolve_hosts, HostSelector};
use crate::metric::{metric_path, CollectedMetric, ResultBuffer};
use crate::sanitize::NameSanitizer;
use crate::sink::MetricSink;
use crate::{Error, Result};

/// Name and last path segment of the heartbeat metric
pub const HEARTBEAT: &str = "HeartBeat";

/// Summary of one completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub server: String,
    pub hosts: usize,
    pub missing_hosts: Vec<String>,
    pub vm_tasks: usize,
    pub metrics_published: usize,
    pub duration_ms: u64,
}

/// Per-endpoint state that outlives individual runs
pub struct RunContext {
    endpoint: Endpoint,
    display_name: Option<String>,
    server_prefix: Arc<str>,
    selectors: Arc<Vec<HostSelector>>,
    sanitizer: Arc<NameSanitizer>,
    catalog: Arc<CompiledCatalog>,
    host_workers: usize,
    vm_workers: usize,
    session: Mutex<Option<Arc<dyn HypervisorSession>>>,
}

impl RunContext {
    pub fn new(endpoint: Endpoint, metric_prefix: &str, display_name: Option<String>) -> Self {
        let display_name = display_name.filter(|d| !d.is_empty());
        let server_prefix: Arc<str> = Arc::from(metric_path([
            metric_prefix,
            display_name.as_deref().unwrap_or(""),
        ]));
        Self {
            endpoint,
            display_name,
            server_prefix,
            selectors: Arc::new(Vec::new()),
            sanitizer: Arc::new(NameSanitizer::passthrough()),
            catalog: Arc::new(CompiledCatalog::default()),
            host_workers: DEFAULT_HOST_WORKERS,
            vm_workers: DEFAULT_VM_WORKERS,
            session: Mutex::new(None),
        }
    }

    /// Build the context for one configured server
    pub fn from_server(
        config: &MonitorConfig,
        server: &ServerConfig,
        sanitizer: Arc<NameSanitizer>,
        catalog: Arc<CompiledCatalog>,
    ) -> Result<Self> {
        Ok(
            Self::new(server.endpoint()?, &config.metric_prefix, server.display_name.clone())
                .with_selectors(server.host_config.clone())
                .with_shared_sanitizer(sanitizer)
                .with_shared_catalog(catalog)
                .with_pools(config.pools.host_workers, config.pools.vm_workers),
        )
    }

    pub fn with_selectors(mut self, selectors: Vec<HostSelector>) -> Self {
        self.selectors = Arc::new(selectors);
        self
    }

    pub fn with_sanitizer(self, sanitizer: NameSanitizer) -> Self {
        self.with_shared_sanitizer(Arc::new(sanitizer))
    }

    pub fn with_shared_sanitizer(mut self, sanitizer: Arc<NameSanitizer>) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    pub fn with_catalog(self, catalog: CompiledCatalog) -> Self {
        self.with_shared_catalog(Arc::new(catalog))
    }

    pub fn with_shared_catalog(mut self, catalog: Arc<CompiledCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_pools(mut self, host_workers: usize, vm_workers: usize) -> Self {
        self.host_workers = host_workers;
        self.vm_workers = vm_workers;
        self
    }

    /// `<metric prefix>[|<display name>]`
    pub fn server_prefix(&self) -> &str {
        &self.server_prefix
    }

    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or("DEFAULT")
    }

    pub fn heartbeat_path(&self) -> String {
        metric_path([self.server_prefix.as_ref(), HEARTBEAT])
    }

    /// Connect unless a session is already open. Idempotent.
    pub async fn ensure_connected(
        &self,
        client: &dyn HypervisorClient,
    ) -> Result<Arc<dyn HypervisorSession>> {
        let mut slot = self.session.lock().await;
        if let Some(ref session) = *slot {
            return Ok(session.clone());
        }

        let session = client.connect(&self.endpoint).await.map_err(|e| match e {
            Error::Connection(_) => e,
            other => Error::Connection(other.to_string()),
        })?;
        info!(url = %self.endpoint.url, "connection successful");
        *slot = Some(session.clone());
        Ok(session)
    }

    /// Log out of the open session, if any. Failures are logged only.
    pub async fn close(&self) {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            info!(url = %self.endpoint.url, "closing the connection");
            if let Err(e) = session.disconnect().await {
                error!(url = %self.endpoint.url, error = %e, "unable to close the connection");
            }
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.is_some()
    }
}

/// Runs collection for one endpoint and publishes the batch
pub struct CollectionOrchestrator {
    client: Arc<dyn HypervisorClient>,
    sink: Arc<dyn MetricSink>,
    context: RunContext,
    /// Held for a whole run; the session is shared and closed at run end
    running: Mutex<()>,
}

impl CollectionOrchestrator {
    pub fn new(
        client: Arc<dyn HypervisorClient>,
        sink: Arc<dyn MetricSink>,
        context: RunContext,
    ) -> Self {
        Self {
            client,
            sink,
            context,
            running: Mutex::new(()),
        }
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    /// Execute one collection run.
    ///
    /// Overlapping calls on one orchestrator are serialized, since each run
    /// closes the shared session when it finishes.
    ///
    /// Returns [`Error::Connection`] after publishing a zero heartbeat when the
    /// endpoint cannot be reached, and [`Error::Publish`] when the sink rejects
    /// the batch.
    pub async fn run(&self) -> Result<RunReport> {
        let _running = self.running.lock().await;
        let run_id = Uuid::now_v7();
        let span = tracing::info_span!("collection_run", %run_id, server = %self.context.label());
        self.run_inner(run_id).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid) -> Result<RunReport> {
        let started = Instant::now();
        let heartbeat_path = self.context.heartbeat_path();

        let session = match self.context.ensure_connected(self.client.as_ref()).await {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "unable to connect, publishing heartbeat 0");
                self.publish(vec![CollectedMetric::new(HEARTBEAT, "0", heartbeat_path)])
                    .await?;
                return Err(e);
            }
        };

        let buffer = Arc::new(ResultBuffer::new());
        buffer.push(CollectedMetric::new(HEARTBEAT, "1", heartbeat_path));

        if self.context.selectors.is_empty() {
            info!("host_config not specified, collecting heartbeat only");
        }
        let hosts = resolve_hosts(session.as_ref(), &self.context.selectors).await;
        info!(hosts = hosts.found.len(), "found hosts");

        let ctx = Arc::new(CollectionContext {
            session,
            buffer: buffer.clone(),
            barrier: CollectionBarrier::new(),
            sanitizer: self.context.sanitizer.clone(),
            catalog: self.context.catalog.clone(),
            selectors: self.context.selectors.clone(),
            pools: WorkerPools::new(self.context.host_workers, self.context.vm_workers),
        });

        let me = ctx.barrier.register();
        for host in hosts.found.iter().cloned() {
            spawn_host_task(&ctx, self.context.server_prefix.clone(), host);
        }
        me.arrive_and_await().await;
        info!("all tasks finished");

        let barrier = ctx.barrier.clone();
        drop(ctx);
        self.context.close().await;

        let batch = buffer.drain();
        let metrics_published = batch.len();
        if !batch.is_empty() {
            debug!(count = metrics_published, "publishing metrics");
            self.publish(batch).await?;
        }

        Ok(RunReport {
            run_id: run_id.to_string(),
            server: self.context.label().to_string(),
            hosts: hosts.found.len(),
            missing_hosts: hosts.missing,
            vm_tasks: barrier
                .registered()
                .saturating_sub(hosts.found.len() + 1),
            metrics_published,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn publish(&self, batch: Vec<CollectedMetric>) -> Result<()> {
        self.sink.publish(batch).await.map_err(|e| match e {
            Error::Publish(_) => e,
            other => Error::Publish(other.to_string()),
        })
    }
}
