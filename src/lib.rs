//! vsphere-monitor: concurrent vSphere host and VM metric collection
//!
//! Polls a vSphere endpoint for host and virtual machine counters and hands
//! them to a metric sink as one batch per run.
//!
//! # Key Features
//!
//! - **Bounded fan-out**: host and VM tasks run on separate worker pools
//! - **Completion barrier**: the batch is published only after every host task
//!   and every VM task it spawned has finished
//! - **Wildcard selection**: `*` for all hosts or all VMs of a host
//! - **Name sanitization**: ordered regex replacers applied to entity names
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vsphere_monitor::client::mock::{MockHost, MockHypervisor, MockVm};
//! use vsphere_monitor::inventory::HostSelector;
//! use vsphere_monitor::sink::LogSink;
//! use vsphere_monitor::{CollectionOrchestrator, RunContext, Endpoint};
//! use secrecy::SecretString;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     vsphere_monitor::logging::init_tracing("info");
//!
//!     let client = Arc::new(
//!         MockHypervisor::new().host(MockHost::new("esx-01").vm(MockVm::new("web"))),
//!     );
//!     let password = SecretString::from("pw".to_string());
//!     let endpoint = Endpoint::for_host("vcenter.local", "monitor", password);
//!     let context = RunContext::new(endpoint, "Custom Metrics|vmware|Status", None)
//!         .with_selectors(vec![HostSelector::new("*", ["*"])]);
//!
//!     let report = CollectionOrchestrator::new(client, Arc::new(LogSink), context)
//!         .run()
//!         .await?;
//!     println!("published {} metrics", report.metrics_published);
//!     Ok(())
//! }
//! ```

// Core engine
pub mod barrier;
pub mod collector;
pub mod error;
pub mod orchestrator;

// Inventory and naming
pub mod catalog;
pub mod format;
pub mod inventory;
pub mod metric;
pub mod sanitize;

// Collaborators
pub mod client;
pub mod sink;

// Ambient
pub mod config;
pub mod logging;
pub mod monitor;

// Re-exports for convenience
pub use client::Endpoint;
pub use error::{Error, Result};
pub use metric::CollectedMetric;
pub use monitor::{ServerRunResult, VmwareMonitor};
pub use orchestrator::{CollectionOrchestrator, RunContext, RunReport};

// Prelude for common imports
pub mod prelude {
    pub use crate::barrier::{BarrierParty, CollectionBarrier};
    pub use crate::catalog::{CompiledCatalog, MetricCatalog, MetricCatalogEntry};
    pub use crate::client::{EntityStatus, HypervisorClient, HypervisorSession};
    pub use crate::config::{load_config, validate_config, MonitorConfig};
    pub use crate::error::{Error, Result};
    pub use crate::inventory::HostSelector;
    pub use crate::sanitize::{NameSanitizer, ReplacerRule};
    pub use crate::sink::{LogSink, MemorySink, MetricSink};
    pub use crate::{CollectionOrchestrator, RunContext, RunReport, VmwareMonitor};
}
