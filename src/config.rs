//! Monitor configuration: loading and validation.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use secrecy::SecretString;

use crate::catalog::MetricCatalog;
use crate::client::Endpoint;
use crate::collector::{DEFAULT_HOST_WORKERS, DEFAULT_VM_WORKERS};
use crate::inventory::HostSelector;
use crate::sanitize::{NameSanitizer, ReplacerRule};
use crate::{Error, Result};

/// Default metric path prefix
pub const DEFAULT_METRIC_PREFIX: &str = "Custom Metrics|vmware|Status";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_metric_prefix")]
    pub metric_prefix: String,
    pub servers: Vec<ServerConfig>,
    #[serde(default)]
    pub name_replacers: Vec<ReplacerRule>,
    #[serde(default)]
    pub pools: PoolConfig,
    #[serde(default)]
    pub catalog: MetricCatalog,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// vCenter / ESXi host name
    pub host: String,
    pub username: String,
    /// Plain-text password
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Environment variable holding the password
    #[serde(default)]
    pub password_env: Option<String>,
    /// Extra path segment; required when more than one server is configured
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub host_config: Vec<HostSelector>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_host_workers")]
    pub host_workers: usize,
    #[serde(default = "default_vm_workers")]
    pub vm_workers: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            host_workers: DEFAULT_HOST_WORKERS,
            vm_workers: DEFAULT_VM_WORKERS,
        }
    }
}

impl ServerConfig {
    /// Task name used in logs
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or("DEFAULT")
    }

    /// Resolve credentials into an SDK endpoint
    pub fn endpoint(&self) -> Result<Endpoint> {
        let password = match (&self.password, &self.password_env) {
            (Some(password), _) if !password.is_empty() => password.clone(),
            (_, Some(var)) => std::env::var(var).map_err(|_| {
                Error::Config(format!(
                    "server {}: environment variable {} is not set",
                    self.host, var
                ))
            })?,
            _ => {
                return Err(Error::Config(format!(
                    "server {}: either 'password' or 'password_env' is required",
                    self.host
                )))
            }
        };
        Ok(Endpoint::for_host(
            &self.host,
            self.username.clone(),
            SecretString::from(password),
        ))
    }
}

fn default_metric_prefix() -> String {
    DEFAULT_METRIC_PREFIX.to_string()
}

fn default_host_workers() -> usize {
    DEFAULT_HOST_WORKERS
}

fn default_vm_workers() -> usize {
    DEFAULT_VM_WORKERS
}

/// Read a YAML config, or JSON when the extension is `.json`.
///
/// Read and parse failures surface as [`Error::Io`], [`Error::Yaml`] or
/// [`Error::Serde`]; the path is logged alongside.
pub fn load_config(path: &Path) -> Result<MonitorConfig> {
    parse_config_file(path).inspect_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "failed to load config");
    })
}

fn parse_config_file(path: &Path) -> Result<MonitorConfig> {
    let raw = fs::read_to_string(path)?;

    let is_json = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let config = if is_json {
        serde_json::from_str(&raw)?
    } else {
        serde_yaml::from_str(&raw)?
    };

    Ok(config)
}

pub fn validate_config(config: &MonitorConfig) -> Result<()> {
    if config.servers.is_empty() {
        return Err(Error::Config(
            "'servers' must list at least one server".into(),
        ));
    }

    if config.servers.len() > 1 {
        if let Some(server) = config
            .servers
            .iter()
            .find(|s| s.display_name.as_deref().map_or(true, str::is_empty))
        {
            return Err(Error::Config(format!(
                "server {}: display_name can not be empty when multiple servers are configured",
                server.host
            )));
        }
    }

    for server in &config.servers {
        if server.host.trim().is_empty() {
            return Err(Error::Config("server host cannot be empty".into()));
        }
        if server.password.as_deref().map_or(true, str::is_empty) && server.password_env.is_none() {
            return Err(Error::Config(format!(
                "server {}: either 'password' or 'password_env' is required",
                server.host
            )));
        }
    }

    if config.pools.host_workers == 0 || config.pools.vm_workers == 0 {
        return Err(Error::Config(
            "pools.host_workers and pools.vm_workers must be greater than zero".into(),
        ));
    }

    NameSanitizer::new(&config.name_replacers)?;

    Ok(())
}
