//! Metric catalog and counter extractors.
//!
//! The catalog names which counters to report and under what display name.
//! Each canonical counter name maps to a pure extraction function over the
//! entity's stats snapshot; the mapping is resolved once when the catalog is
//! compiled, so collection never compares names.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::client::{HostHardware, HostQuickStats, VmHardware, VmQuickStats};
use crate::format::Observation;
use crate::{Error, Result};

/// One counter definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetricCatalogEntry {
    /// Canonical counter name, e.g. `Overall CPU Usage`
    pub name: String,
    /// Display name used in the metric path instead of `name`
    #[serde(default)]
    pub alias: Option<String>,
    /// Extra display properties passed through to the controller
    #[serde(default, alias = "properties")]
    pub extra_properties: BTreeMap<String, String>,
}

impl MetricCatalogEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            extra_properties: BTreeMap::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_properties.insert(key.into(), value.into());
        self
    }

    /// Alias if present, else the canonical name
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// Host and VM counter lists
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetricCatalog {
    #[serde(default)]
    pub host: Vec<MetricCatalogEntry>,
    #[serde(default)]
    pub vm: Vec<MetricCatalogEntry>,
}

/// Everything a host extractor can read
#[derive(Debug, Clone, Default)]
pub struct HostSnapshot {
    pub quick_stats: HostQuickStats,
    pub hardware: HostHardware,
}

/// Everything a VM extractor can read
#[derive(Debug, Clone, Default)]
pub struct VmSnapshot {
    pub quick_stats: VmQuickStats,
    pub hardware: VmHardware,
}

pub type HostExtractor = fn(&HostSnapshot) -> Result<Observation>;
pub type VmExtractor = fn(&VmSnapshot) -> Result<Observation>;

fn field<T: Into<Observation>>(value: Option<T>, metric: &str) -> Result<Observation> {
    value
        .map(Into::into)
        .ok_or_else(|| Error::extraction(metric, "not reported by this host"))
}

/// `round(usage MHz * 100 / (core Hz * cores * 1e-6))`
fn host_cpu_usage_percent(s: &HostSnapshot) -> Result<Observation> {
    const NAME: &str = "Overall CPU Usage %";
    let usage = field(s.quick_stats.overall_cpu_usage, NAME)?;
    let hz = s
        .hardware
        .cpu_hz
        .ok_or_else(|| Error::extraction(NAME, "CPU frequency not reported"))?;
    let cores = s
        .hardware
        .num_cpu_cores
        .ok_or_else(|| Error::extraction(NAME, "CPU core count not reported"))?;

    let capacity_mhz = hz as f64 * cores as f64 * 0.000001;
    if capacity_mhz <= 0.0 {
        return Err(Error::extraction(NAME, "host reports zero CPU capacity"));
    }
    let usage = match usage {
        Observation::Int(v) => v as f64,
        Observation::Float(v) => v,
    };
    Ok(Observation::Int((usage * 100.0 / capacity_mhz).round() as i64))
}

static HOST_EXTRACTORS: LazyLock<HashMap<&'static str, HostExtractor>> = LazyLock::new(|| {
    let mut table: HashMap<&'static str, HostExtractor> = HashMap::new();
    table.insert("Distributed CPU Fairness", |s| {
        field(s.quick_stats.distributed_cpu_fairness, "Distributed CPU Fairness")
    });
    table.insert("Distributed Memory Fairness", |s| {
        field(
            s.quick_stats.distributed_memory_fairness,
            "Distributed Memory Fairness",
        )
    });
    table.insert("Overall CPU Usage", |s| {
        field(s.quick_stats.overall_cpu_usage, "Overall CPU Usage")
    });
    table.insert("Overall CPU Usage %", host_cpu_usage_percent);
    table.insert("Overall Memory Usage", |s| {
        field(s.quick_stats.overall_memory_usage, "Overall Memory Usage")
    });
    table.insert("Up Time", |s| field(s.quick_stats.uptime, "Up Time"));
    table.insert("Memory Size", |s| {
        field(s.hardware.memory_size, "Memory Size")
    });
    table.insert("CPU Cores", |s| field(s.hardware.num_cpu_cores, "CPU Cores"));
    table
});

static VM_EXTRACTORS: LazyLock<HashMap<&'static str, VmExtractor>> = LazyLock::new(|| {
    let mut table: HashMap<&'static str, VmExtractor> = HashMap::new();
    table.insert("Ballooned Memory", |s| {
        field(s.quick_stats.ballooned_memory, "Ballooned Memory")
    });
    table.insert("Compressed Memory", |s| {
        field(s.quick_stats.compressed_memory, "Compressed Memory")
    });
    table.insert("Overhead Memory Consumed", |s| {
        field(
            s.quick_stats.consumed_overhead_memory,
            "Overhead Memory Consumed",
        )
    });
    table.insert("Distributed CPU Entitlement", |s| {
        field(
            s.quick_stats.distributed_cpu_entitlement,
            "Distributed CPU Entitlement",
        )
    });
    table.insert("Distributed Memory Entitlement", |s| {
        field(
            s.quick_stats.distributed_memory_entitlement,
            "Distributed Memory Entitlement",
        )
    });
    table.insert("Guest Memory Usage", |s| {
        field(s.quick_stats.guest_memory_usage, "Guest Memory Usage")
    });
    table.insert("Host Memory Usage", |s| {
        field(s.quick_stats.host_memory_usage, "Host Memory Usage")
    });
    table.insert("Overall CPU Usage", |s| {
        field(s.quick_stats.overall_cpu_usage, "Overall CPU Usage")
    });
    table.insert("Overall CPU Demand", |s| {
        field(s.quick_stats.overall_cpu_demand, "Overall CPU Demand")
    });
    table.insert("Private Memory", |s| {
        field(s.quick_stats.private_memory, "Private Memory")
    });
    table.insert("Shared Memory", |s| {
        field(s.quick_stats.shared_memory, "Shared Memory")
    });
    table.insert("Static CPU Entitlement", |s| {
        field(s.quick_stats.static_cpu_entitlement, "Static CPU Entitlement")
    });
    table.insert("Static Memory Entitlement", |s| {
        field(
            s.quick_stats.static_memory_entitlement,
            "Static Memory Entitlement",
        )
    });
    table.insert("Swapped Memory", |s| {
        field(s.quick_stats.swapped_memory, "Swapped Memory")
    });
    table.insert("Up Time", |s| field(s.quick_stats.uptime_seconds, "Up Time"));
    table.insert("Memory MB", |s| field(s.hardware.memory_mb, "Memory MB"));
    table.insert("Num CPU", |s| field(s.hardware.num_cpu, "Num CPU"));
    table
});

/// Canonical host counter names
pub fn host_counter_names() -> Vec<&'static str> {
    let mut names: Vec<_> = HOST_EXTRACTORS.keys().copied().collect();
    names.sort_unstable();
    names
}

/// Canonical VM counter names
pub fn vm_counter_names() -> Vec<&'static str> {
    let mut names: Vec<_> = VM_EXTRACTORS.keys().copied().collect();
    names.sort_unstable();
    names
}

/// A catalog entry bound to its extractor
#[derive(Debug, Clone)]
pub struct CompiledEntry<F> {
    pub entry: MetricCatalogEntry,
    pub extract: F,
}

/// Catalog with every entry resolved to an extractor
#[derive(Debug, Clone, Default)]
pub struct CompiledCatalog {
    pub host: Vec<CompiledEntry<HostExtractor>>,
    pub vm: Vec<CompiledEntry<VmExtractor>>,
}

impl CompiledCatalog {
    /// Bind every entry to its extractor. Unknown counter names are dropped
    /// with a warning.
    pub fn compile(catalog: &MetricCatalog) -> Self {
        let host = catalog
            .host
            .iter()
            .filter_map(|entry| match HOST_EXTRACTORS.get(entry.name.as_str()) {
                Some(extract) => Some(CompiledEntry {
                    entry: entry.clone(),
                    extract: *extract,
                }),
                None => {
                    tracing::warn!(metric = %entry.name, "unknown host counter, ignoring");
                    None
                }
            })
            .collect();

        let vm = catalog
            .vm
            .iter()
            .filter_map(|entry| match VM_EXTRACTORS.get(entry.name.as_str()) {
                Some(extract) => Some(CompiledEntry {
                    entry: entry.clone(),
                    extract: *extract,
                }),
                None => {
                    tracing::warn!(metric = %entry.name, "unknown VM counter, ignoring");
                    None
                }
            })
            .collect();

        Self { host, vm }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_snapshot() -> HostSnapshot {
        HostSnapshot {
            quick_stats: HostQuickStats {
                overall_cpu_usage: Some(3000),
                overall_memory_usage: Some(20),
                uptime: Some(86400),
                ..Default::default()
            },
            hardware: HostHardware {
                memory_size: Some(64 * 1024 * 1024 * 1024),
                cpu_hz: Some(2_500_000_000),
                num_cpu_cores: Some(4),
            },
        }
    }

    fn compile_host(names: &[&str]) -> CompiledCatalog {
        CompiledCatalog::compile(&MetricCatalog {
            host: names.iter().map(|n| MetricCatalogEntry::new(*n)).collect(),
            vm: Vec::new(),
        })
    }

    #[test]
    fn test_display_name_prefers_alias() {
        let entry = MetricCatalogEntry::new("Up Time");
        assert_eq!(entry.display_name(), "Up Time");
        let entry = entry.with_alias("Uptime (s)");
        assert_eq!(entry.display_name(), "Uptime (s)");
    }

    #[test]
    fn test_unknown_counters_are_dropped() {
        let catalog = compile_host(&["Overall CPU Usage", "Quantum Flux", "CPU Cores"]);
        let names: Vec<_> = catalog.host.iter().map(|c| c.entry.name.as_str()).collect();
        assert_eq!(names, vec!["Overall CPU Usage", "CPU Cores"]);
    }

    #[test]
    fn test_cpu_usage_percent() {
        let catalog = compile_host(&["Overall CPU Usage %"]);
        let value = (catalog.host[0].extract)(&host_snapshot()).unwrap();
        // 3000 MHz of 4 x 2500 MHz
        assert_eq!(value, Observation::Int(30));
    }

    #[test]
    fn test_cpu_usage_percent_zero_capacity_is_skipped() {
        let catalog = compile_host(&["Overall CPU Usage %"]);
        let mut snapshot = host_snapshot();
        snapshot.hardware.cpu_hz = Some(0);
        let err = (catalog.host[0].extract)(&snapshot).unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }));
    }

    #[test]
    fn test_missing_field_is_extraction_error() {
        let catalog = compile_host(&["Distributed CPU Fairness"]);
        let err = (catalog.host[0].extract)(&host_snapshot()).unwrap_err();
        match err {
            Error::Extraction { metric, .. } => assert_eq!(metric, "Distributed CPU Fairness"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_vm_extractors() {
        let catalog = CompiledCatalog::compile(&MetricCatalog {
            host: Vec::new(),
            vm: vec![
                MetricCatalogEntry::new("Ballooned Memory"),
                MetricCatalogEntry::new("Num CPU"),
            ],
        });
        let snapshot = VmSnapshot {
            quick_stats: VmQuickStats {
                ballooned_memory: Some(128),
                ..Default::default()
            },
            hardware: VmHardware {
                memory_mb: Some(4096),
                num_cpu: Some(2),
            },
        };
        let values: Vec<_> = catalog
            .vm
            .iter()
            .map(|c| (c.extract)(&snapshot).unwrap())
            .collect();
        assert_eq!(values, vec![Observation::Int(128), Observation::Int(2)]);
    }

    #[test]
    fn test_counter_tables_are_complete() {
        assert_eq!(host_counter_names().len(), 8);
        assert_eq!(vm_counter_names().len(), 17);
    }
}
