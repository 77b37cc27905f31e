//! Runs every configured server concurrently.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{error, info};

use crate::catalog::CompiledCatalog;
use crate::client::HypervisorClient;
use crate::config::{validate_config, MonitorConfig};
use crate::orchestrator::{CollectionOrchestrator, RunContext, RunReport};
use crate::sanitize::NameSanitizer;
use crate::sink::MetricSink;
use crate::{Error, Result};

/// Outcome of one server's run
#[derive(Debug)]
pub struct ServerRunResult {
    pub server: String,
    pub result: Result<RunReport>,
}

impl ServerRunResult {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// One orchestrator per configured server, sharing the compiled catalog and
/// the name sanitizer.
pub struct VmwareMonitor {
    orchestrators: Vec<Arc<CollectionOrchestrator>>,
}

impl VmwareMonitor {
    pub fn new(
        config: &MonitorConfig,
        client: Arc<dyn HypervisorClient>,
        sink: Arc<dyn MetricSink>,
    ) -> Result<Self> {
        validate_config(config)?;

        let sanitizer = Arc::new(NameSanitizer::new(&config.name_replacers)?);
        let catalog = Arc::new(CompiledCatalog::compile(&config.catalog));

        let orchestrators = config
            .servers
            .iter()
            .map(|server| {
                let context =
                    RunContext::from_server(config, server, sanitizer.clone(), catalog.clone())?;
                Ok(Arc::new(CollectionOrchestrator::new(
                    client.clone(),
                    sink.clone(),
                    context,
                )))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { orchestrators })
    }

    pub fn server_count(&self) -> usize {
        self.orchestrators.len()
    }

    /// Run every server once. Results are in configuration order.
    pub async fn run_once(&self) -> Vec<ServerRunResult> {
        let mut join_set = JoinSet::new();
        for (index, orchestrator) in self.orchestrators.iter().enumerate() {
            let orchestrator = orchestrator.clone();
            join_set.spawn(async move { (index, orchestrator.run().await) });
        }

        let mut slots: Vec<Option<Result<RunReport>>> =
            (0..self.orchestrators.len()).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => error!(error = %e, "server run aborted"),
            }
        }

        let results: Vec<ServerRunResult> = self
            .orchestrators
            .iter()
            .zip(slots)
            .map(|(orchestrator, slot)| ServerRunResult {
                server: orchestrator.context().label().to_string(),
                result: slot.unwrap_or_else(|| {
                    Err(Error::Task("server run did not complete".into()))
                }),
            })
            .collect();

        let failed = results.iter().filter(|r| !r.is_ok()).count();
        info!(servers = results.len(), failed, "monitor run complete");
        results
    }
}
