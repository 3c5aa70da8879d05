//! Host identity probe and node-selector matching.
//!
//! The probe runs once at startup; every capability match afterwards is a
//! pure function over the resulting [`HostInfo`].

use crate::error::ConvergeError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

pub const OS_RELEASE_PATH: &str = "/etc/os-release";
pub const KERNEL_RELEASE_PATH: &str = "/proc/sys/kernel/osrelease";

/// Identity of the host the reconciler runs on. Read-only after the single
/// probe at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    /// Distribution id from os-release, e.g. "ubuntu" or "debian".
    pub distribution_id: String,
    /// Distribution version from os-release, e.g. "22.04".
    pub distribution_version: String,
    /// Kernel name, "Linux" on every supported host.
    pub kernel_name: String,
    /// Kernel release string, e.g. "6.1.0-18-amd64".
    pub kernel_version: String,
}

/// Probe the well-known OS metadata files. Fails fast: the process must not
/// start without host identity, since handler activation depends on it.
pub fn probe() -> Result<HostInfo, ConvergeError> {
    probe_from(Path::new(OS_RELEASE_PATH), Path::new(KERNEL_RELEASE_PATH))
}

/// Probe from explicit paths.
pub fn probe_from(os_release: &Path, kernel_release: &Path) -> Result<HostInfo, ConvergeError> {
    let data = fs::read_to_string(os_release)
        .map_err(|e| ConvergeError::HostProbe(format!("read {}: {e}", os_release.display())))?;
    let (distribution_id, distribution_version) = parse_os_release(&data);

    let kernel = fs::read_to_string(kernel_release)
        .map_err(|e| ConvergeError::HostProbe(format!("read {}: {e}", kernel_release.display())))?;

    Ok(HostInfo {
        distribution_id,
        distribution_version,
        kernel_name: "Linux".to_string(),
        kernel_version: kernel.trim().to_string(),
    })
}

fn parse_os_release(data: &str) -> (String, String) {
    let mut id = String::new();
    let mut version = String::new();
    for line in data.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"');
        match key {
            "ID" => id = value.to_string(),
            "VERSION_ID" => version = value.to_string(),
            _ => {}
        }
    }
    (id, version)
}

/// Predicate restricting which host(s) a spec entry applies to. Unset
/// fields do not constrain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeSelector {
    pub hostname: Option<String>,
    pub mac_address: Option<String>,
}

impl NodeSelector {
    pub fn is_empty(&self) -> bool {
        !has_value(&self.hostname) && !has_value(&self.mac_address)
    }
}

fn has_value(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|s| !s.is_empty())
}

/// Evaluate a selector against the live host: current hostname and the MAC
/// address of every local interface.
pub fn selector_matches(selector: &NodeSelector) -> Result<bool, ConvergeError> {
    if selector.is_empty() {
        return Ok(true);
    }
    let hostname = nix::unistd::gethostname()
        .map_err(|e| ConvergeError::Io(io::Error::from_raw_os_error(e as i32)))?
        .to_string_lossy()
        .into_owned();
    let macs = if has_value(&selector.mac_address) {
        local_mac_addresses()?
    } else {
        Vec::new()
    };
    Ok(selector_matches_identity(selector, &hostname, &macs))
}

/// Pure selector evaluation: hostname compares exactly, MAC address matches
/// any local interface case-insensitively.
pub fn selector_matches_identity(selector: &NodeSelector, hostname: &str, macs: &[String]) -> bool {
    if let Some(want) = selector.hostname.as_deref() {
        if !want.is_empty() && want != hostname {
            return false;
        }
    }
    if let Some(want) = selector.mac_address.as_deref() {
        if !want.is_empty() && !macs.iter().any(|mac| mac.eq_ignore_ascii_case(want)) {
            return false;
        }
    }
    true
}

/// MAC addresses of every interface under /sys/class/net.
pub fn local_mac_addresses() -> Result<Vec<String>, ConvergeError> {
    let mut macs = Vec::new();
    for entry in fs::read_dir("/sys/class/net")? {
        let entry = entry?;
        let Ok(address) = fs::read_to_string(entry.path().join("address")) else {
            continue;
        };
        let address = address.trim();
        if !address.is_empty() {
            macs.push(address.to_string());
        }
    }
    Ok(macs)
}
