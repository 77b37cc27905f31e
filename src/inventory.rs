//! Host and VM selection against the live inventory.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::client::{HostHandle, HypervisorSession, VmHandle};
use crate::Error;

/// Matches every host or every VM
pub const WILDCARD: &str = "*";

/// Which hosts to collect, and which of their VMs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostSelector {
    /// Host name, or `*` for every host
    #[serde(alias = "host")]
    pub host_name: String,
    /// VM names, or `*` for every VM of the host. Order is kept, duplicates too.
    #[serde(default, alias = "vms")]
    pub vm_names: Vec<String>,
}

impl HostSelector {
    pub fn new<I, S>(host_name: impl Into<String>, vm_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            host_name: host_name.into(),
            vm_names: vm_names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.host_name == WILDCARD
    }

    /// Exact (ASCII case-insensitive) match, or the wildcard selector
    fn applies_to(&self, host_name: &str) -> bool {
        self.is_wildcard() || self.host_name.eq_ignore_ascii_case(host_name)
    }
}

/// Outcome of a resolution pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<T> {
    /// Matched handles, in selection order
    pub found: Vec<T>,
    /// Configured names with no match
    pub missing: Vec<String>,
}

impl<T> Default for Resolved<T> {
    fn default() -> Self {
        Self {
            found: Vec::new(),
            missing: Vec::new(),
        }
    }
}

/// Resolve the configured hosts.
///
/// A `*` selector returns every host and ends resolution. Exact names are
/// looked up one by one; misses and lookup failures are logged and skipped.
pub async fn resolve_hosts(
    session: &dyn HypervisorSession,
    selectors: &[HostSelector],
) -> Resolved<HostHandle> {
    let mut resolved = Resolved::default();

    for selector in selectors {
        if selector.is_wildcard() {
            match session.all_hosts().await {
                Ok(hosts) => {
                    resolved.found = hosts;
                }
                Err(e) => {
                    error!(error = %e, "unable to list hosts");
                    resolved.found.clear();
                }
            }
            resolved.missing.clear();
            break;
        }

        match session.find_host(&selector.host_name).await {
            Ok(Some(host)) => {
                if !resolved.found.contains(&host) {
                    resolved.found.push(host);
                }
            }
            Ok(None) => {
                let e = Error::Resolution(format!("could not find host {}", selector.host_name));
                error!(host = %selector.host_name, error = %e, "skipping host");
                resolved.missing.push(selector.host_name.clone());
            }
            Err(e) => {
                error!(host = %selector.host_name, error = %e, "unable to get the host details");
                resolved.missing.push(selector.host_name.clone());
            }
        }
    }

    debug!(
        count = resolved.found.len(),
        hosts = %resolved
            .found
            .iter()
            .map(|h| h.name.as_str())
            .collect::<Vec<_>>()
            .join(","),
        "resolved hosts"
    );
    resolved
}

/// VM names configured for `host_name`: the first selector that names the
/// host exactly or is `*`.
pub fn vm_names_for_host<'a>(host_name: &str, selectors: &'a [HostSelector]) -> &'a [String] {
    selectors
        .iter()
        .find(|s| s.applies_to(host_name))
        .map(|s| s.vm_names.as_slice())
        .unwrap_or(&[])
}

/// Pick the VMs of one host that its selector asks for.
///
/// `*` takes every live VM and stops scanning the configured names. Any
/// other name takes the first case-insensitive match.
pub fn select_vms(
    host_name: &str,
    live_vms: &[VmHandle],
    selectors: &[HostSelector],
) -> Resolved<VmHandle> {
    let mut resolved = Resolved::default();
    let configured = vm_names_for_host(host_name, selectors);

    if live_vms.is_empty() || configured.is_empty() {
        info!(host = %host_name, "no VMs configured for host");
        return resolved;
    }

    for wanted in configured {
        if wanted == WILDCARD {
            resolved.found.extend(live_vms.iter().cloned());
            break;
        }

        match live_vms.iter().find(|vm| vm.name.eq_ignore_ascii_case(wanted)) {
            Some(vm) => resolved.found.push(vm.clone()),
            None => {
                let e = Error::Resolution(format!("could not find VM {}", wanted));
                error!(host = %host_name, vm = %wanted, error = %e, "skipping VM");
                resolved.missing.push(wanted.clone());
            }
        }
    }

    resolved
}

/// Fetch the live VMs of `host` and select the configured ones.
pub async fn resolve_vms(
    session: &dyn HypervisorSession,
    host: &HostHandle,
    selectors: &[HostSelector],
) -> Resolved<VmHandle> {
    let live = match session.host_vms(host).await {
        Ok(vms) => vms,
        Err(e) => {
            error!(host = %host.name, error = %e, "unable to get the VMs for host");
            return Resolved::default();
        }
    };
    debug!(host = %host.name, live = live.len(), "found VMs");

    let resolved = select_vms(&host.name, &live, selectors);
    info!(
        host = %host.name,
        selected = resolved.found.len(),
        "VMs after filtering"
    );
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vms(names: &[&str]) -> Vec<VmHandle> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| VmHandle::new(format!("vm-{}", i), *n))
            .collect()
    }

    fn names(resolved: &Resolved<VmHandle>) -> Vec<&str> {
        resolved.found.iter().map(|v| v.name.as_str()).collect()
    }

    #[test]
    fn test_wildcard_vms() {
        let live = vms(&["A", "B", "C"]);
        let selectors = vec![HostSelector::new("h1", ["*"])];
        let resolved = select_vms("h1", &live, &selectors);
        assert_eq!(names(&resolved), vec!["A", "B", "C"]);
        assert!(resolved.missing.is_empty());
    }

    #[test]
    fn test_exact_vm() {
        let live = vms(&["A", "B", "C"]);
        let selectors = vec![HostSelector::new("h1", ["b"])];
        let resolved = select_vms("H1", &live, &selectors);
        assert_eq!(names(&resolved), vec!["B"]);
    }

    #[test]
    fn test_absent_vm_is_reported() {
        let live = vms(&["A", "B", "C"]);
        let selectors = vec![HostSelector::new("h1", ["Z"])];
        let resolved = select_vms("h1", &live, &selectors);
        assert!(resolved.found.is_empty());
        assert_eq!(resolved.missing, vec!["Z".to_string()]);
    }

    #[test]
    fn test_wildcard_stops_scanning() {
        let live = vms(&["A", "B"]);
        let selectors = vec![HostSelector::new("h1", ["B", "*", "A", "nope"])];
        let resolved = select_vms("h1", &live, &selectors);
        assert_eq!(names(&resolved), vec!["B", "A", "B"]);
        assert!(resolved.missing.is_empty());
    }

    #[test]
    fn test_duplicates_are_kept() {
        let live = vms(&["A", "B"]);
        let selectors = vec![HostSelector::new("h1", ["A", "a"])];
        let resolved = select_vms("h1", &live, &selectors);
        assert_eq!(names(&resolved), vec!["A", "A"]);
    }

    #[test]
    fn test_first_applicable_selector_wins() {
        let selectors = vec![
            HostSelector::new("h2", ["x"]),
            HostSelector::new("*", ["y"]),
            HostSelector::new("h3", ["z"]),
        ];
        assert_eq!(vm_names_for_host("H2", &selectors), ["x".to_string()]);
        assert_eq!(vm_names_for_host("h3", &selectors), ["y".to_string()]);
        assert!(vm_names_for_host("h9", &selectors[..1]).is_empty());
    }

    #[test]
    fn test_no_live_vms_or_no_selector() {
        let selectors = vec![HostSelector::new("h1", ["*"])];
        assert!(select_vms("h1", &[], &selectors).found.is_empty());
        assert!(select_vms("other", &vms(&["A"]), &selectors).found.is_empty());

        let empty = vec![HostSelector::new("h1", Vec::<String>::new())];
        let resolved = select_vms("h1", &vms(&["A"]), &empty);
        assert!(resolved.found.is_empty());
        assert!(resolved.missing.is_empty());
    }
}
