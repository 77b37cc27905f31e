//! Collected metrics and the shared per-run result buffer.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

/// Separator between metric path segments
pub const PATH_SEPARATOR: &str = "|";

/// A single metric ready for the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectedMetric {
    /// Metric display name
    pub name: String,
    /// Whole-number formatted value
    pub value: String,
    /// Full `|` separated metric path
    pub full_path: String,
    /// Extra display properties from the catalog
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl CollectedMetric {
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        full_path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            full_path: full_path.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Attach catalog properties
    pub fn with_properties(mut self, properties: BTreeMap<String, String>) -> Self {
        self.properties = properties;
        self
    }
}

/// Join path segments with the controller separator
pub fn metric_path<I, S>(segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut path = String::new();
    for segment in segments {
        let segment = segment.as_ref();
        if segment.is_empty() {
            continue;
        }
        if !path.is_empty() {
            path.push_str(PATH_SEPARATOR);
        }
        path.push_str(segment);
    }
    path
}

/// Append-only buffer shared by every task of one run.
///
/// Tasks only ever push. The orchestrator drains it once, after the barrier
/// has released.
#[derive(Debug, Default)]
pub struct ResultBuffer {
    metrics: Mutex<Vec<CollectedMetric>>,
}

impl ResultBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<CollectedMetric>> {
        // push/extend are the only mutations; a poisoned lock still guards a valid Vec.
        self.metrics.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append one metric
    pub fn push(&self, metric: CollectedMetric) {
        self.lock().push(metric);
    }

    /// Append several metrics
    pub fn extend(&self, metrics: impl IntoIterator<Item = CollectedMetric>) {
        self.lock().extend(metrics);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> Vec<CollectedMetric> {
        self.lock().clone()
    }

    /// Take every buffered metric, leaving the buffer empty
    pub fn drain(&self) -> Vec<CollectedMetric> {
        std::mem::take(&mut *self.lock())
    }
}
