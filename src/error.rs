//! Error types for vsphere-monitor

use thiserror::Error;

/// Result type alias using the monitor Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while collecting and publishing metrics
#[derive(Error, Debug)]
pub enum Error {
    /// Cannot reach or authenticate to the hypervisor endpoint
    #[error("Connection error: {0}")]
    Connection(String),

    /// A configured host or VM could not be found in the inventory
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// A single counter could not be computed for an entity
    #[error("Extraction error for metric '{metric}': {reason}")]
    Extraction { metric: String, reason: String },

    /// The metric sink rejected a batch
    #[error("Publish error: {0}")]
    Publish(String),

    /// Hypervisor SDK call failed after the connection was established
    #[error("Hypervisor error: {0}")]
    Hypervisor(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid name-replacer pattern
    #[error("Invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex_lite::Error,
    },

    /// Worker pool or task join failures
    #[error("Task error: {0}")]
    Task(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML (de)serialization errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON (de)serialization errors
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl Error {
    /// Build an extraction error for the named counter
    pub fn extraction(metric: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Extraction {
            metric: metric.into(),
            reason: reason.into(),
        }
    }
}
