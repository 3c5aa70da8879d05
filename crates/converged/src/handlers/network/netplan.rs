//! Netplan backend: structured YAML per interface.
//!
//! Comparison is structural: the current file is decoded into the typed
//! netplan model and compared with the desired document, so formatting and
//! key order differences do not force a rewrite.

use super::NetworkBackend;
use async_trait::async_trait;
use converge_common::exec::CommandRunner;
use converge_common::fsutil::{atomic_write, MANAGED_HEADER};
use converge_common::spec::{NetworkInterfaceSpec, ReconcileOutcome};
use converge_common::ConvergeError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

pub struct Netplan {
    probe_path: PathBuf,
    netplan_dir: PathBuf,
    runner: CommandRunner,
}

impl Default for Netplan {
    fn default() -> Self {
        Self {
            probe_path: PathBuf::from("/usr/sbin/netplan"),
            netplan_dir: PathBuf::from("/etc/netplan"),
            runner: CommandRunner::default(),
        }
    }
}

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NetplanDocument {
    pub network: NetplanNetwork,
}

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NetplanNetwork {
    #[serde(default)]
    pub version: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ethernets: BTreeMap<String, NetplanInterface>,
}

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NetplanInterface {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway4: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway6: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nameservers: Option<NetplanNameservers>,
}

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NetplanNameservers {
    #[serde(default)]
    pub addresses: Vec<String>,
}

impl Netplan {
    pub fn with_paths(probe_path: PathBuf, netplan_dir: PathBuf) -> Self {
        Self {
            probe_path,
            netplan_dir,
            runner: CommandRunner::default(),
        }
    }

    /// Locate the netplan file already referencing this interface, falling
    /// back to a synthesized name when none does.
    pub fn find_config(&self, iface_name: &str) -> PathBuf {
        if let Ok(entries) = std::fs::read_dir(&self.netplan_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                let is_yaml = matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("yaml" | "yml")
                );
                if !is_yaml {
                    continue;
                }
                let Ok(content) = std::fs::read_to_string(&path) else {
                    continue;
                };
                let Ok(value) = serde_yaml::from_str::<serde_yaml::Value>(&content) else {
                    continue;
                };
                if value
                    .get("network")
                    .and_then(|n| n.get("ethernets"))
                    .and_then(|e| e.get(iface_name))
                    .is_some()
                {
                    return path;
                }
            }
        }
        self.netplan_dir.join(format!("99-{iface_name}.yaml"))
    }

    fn build_document(&self, iface: &NetworkInterfaceSpec) -> NetplanDocument {
        let mut addresses = Vec::new();
        if let Some(address) = &iface.ip_address {
            addresses.push(address.clone());
        }
        if let Some(address) = &iface.ipv6_address {
            addresses.push(address.clone());
        }

        let nameservers = if iface.nameservers.is_empty() {
            None
        } else {
            Some(NetplanNameservers {
                addresses: iface.nameservers.clone(),
            })
        };

        let mut ethernets = BTreeMap::new();
        ethernets.insert(
            iface.name.clone(),
            NetplanInterface {
                mtu: iface.mtu,
                addresses,
                gateway4: iface.gateway.clone(),
                gateway6: iface.ipv6_gateway.clone(),
                nameservers,
            },
        );

        NetplanDocument {
            network: NetplanNetwork {
                version: 2,
                ethernets,
            },
        }
    }
}

#[async_trait]
impl NetworkBackend for Netplan {
    fn name(&self) -> &'static str {
        "netplan"
    }

    fn is_installed(&self) -> bool {
        self.probe_path.exists()
    }

    async fn configure(&self, iface: &NetworkInterfaceSpec) -> Result<ReconcileOutcome, ConvergeError> {
        let path = self.find_config(&iface.name);
        let desired = self.build_document(iface);

        if let Ok(content) = std::fs::read_to_string(&path) {
            match serde_yaml::from_str::<NetplanDocument>(&content) {
                Ok(current) if current == desired => return Ok(ReconcileOutcome::Unchanged),
                Ok(_) => {}
                Err(e) => debug!("existing netplan file {} does not decode: {e}", path.display()),
            }
        }

        let rendered = format!("{}{}", MANAGED_HEADER, serde_yaml::to_string(&desired)?);
        atomic_write(&path, rendered.as_bytes(), 0o644)?;
        Ok(ReconcileOutcome::Applied)
    }

    async fn reload(&self) -> Result<(), ConvergeError> {
        // netplan renders for one of these two services.
        if !self.runner.is_service_active("systemd-networkd").await
            && !self.runner.is_service_active("NetworkManager").await
        {
            return Ok(());
        }
        self.runner.run_checked("netplan", &["apply"]).await?;
        Ok(())
    }
}
