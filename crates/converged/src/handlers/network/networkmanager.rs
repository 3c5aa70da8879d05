//! NetworkManager backend: keyfile connection profiles.

use super::NetworkBackend;
use async_trait::async_trait;
use converge_common::exec::CommandRunner;
use converge_common::fsutil::{atomic_write, MANAGED_HEADER};
use converge_common::spec::{NetworkInterfaceSpec, ReconcileOutcome};
use converge_common::ConvergeError;
use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub struct NetworkManager {
    probe_path: PathBuf,
    connections_dir: PathBuf,
    runner: CommandRunner,
}

impl Default for NetworkManager {
    fn default() -> Self {
        Self {
            probe_path: PathBuf::from("/usr/sbin/NetworkManager"),
            connections_dir: PathBuf::from("/etc/NetworkManager/system-connections"),
            runner: CommandRunner::default(),
        }
    }
}

impl NetworkManager {
    pub fn with_paths(probe_path: PathBuf, connections_dir: PathBuf) -> Self {
        Self {
            probe_path,
            connections_dir,
            runner: CommandRunner::default(),
        }
    }

    fn config_path(&self, iface: &NetworkInterfaceSpec) -> PathBuf {
        self.connections_dir
            .join(format!("{}.nmconnection", iface.name))
    }

    fn render(&self, iface: &NetworkInterfaceSpec) -> String {
        let mut content = String::from(MANAGED_HEADER);
        let _ = write!(
            content,
            "\n[connection]\nid={name}\ntype=ethernet\ninterface-name={name}\n",
            name = iface.name
        );

        if iface.mtu.is_some() || iface.mac_address.is_some() {
            content.push_str("\n[ethernet]\n");
            if let Some(mac) = &iface.mac_address {
                let _ = writeln!(content, "cloned-mac-address={mac}");
            }
            if let Some(mtu) = iface.mtu {
                let _ = writeln!(content, "mtu={mtu}");
            }
        }

        content.push_str("\n[ipv4]\n");
        match &iface.ip_address {
            Some(address) => {
                content.push_str("method=manual\n");
                match &iface.gateway {
                    Some(gateway) => {
                        let _ = writeln!(content, "address1={address},{gateway}");
                    }
                    None => {
                        let _ = writeln!(content, "address1={address}");
                    }
                }
                if !iface.nameservers.is_empty() {
                    let _ = writeln!(content, "dns={};", iface.nameservers.join(";"));
                }
            }
            None => content.push_str("method=disabled\n"),
        }

        content.push_str("\n[ipv6]\n");
        match &iface.ipv6_address {
            Some(address) => {
                content.push_str("method=manual\n");
                match &iface.ipv6_gateway {
                    Some(gateway) => {
                        let _ = writeln!(content, "address1={address},{gateway}");
                    }
                    None => {
                        let _ = writeln!(content, "address1={address}");
                    }
                }
            }
            None => content.push_str("method=ignore\n"),
        }

        content
    }
}

fn read_current(path: &Path) -> Result<String, ConvergeError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(ConvergeError::Io(e)),
    }
}

#[async_trait]
impl NetworkBackend for NetworkManager {
    fn name(&self) -> &'static str {
        "networkmanager"
    }

    fn is_installed(&self) -> bool {
        self.probe_path.exists()
    }

    async fn configure(&self, iface: &NetworkInterfaceSpec) -> Result<ReconcileOutcome, ConvergeError> {
        let path = self.config_path(iface);
        let desired = self.render(iface);
        if read_current(&path)? == desired {
            return Ok(ReconcileOutcome::Unchanged);
        }
        // Connection profiles hold secrets in the general case, hence 0600.
        atomic_write(&path, desired.as_bytes(), 0o600)?;
        Ok(ReconcileOutcome::Applied)
    }

    async fn reload(&self) -> Result<(), ConvergeError> {
        if !self.runner.is_service_active("NetworkManager").await {
            return Ok(());
        }
        self.runner
            .run_checked("nmcli", &["connection", "reload"])
            .await?;
        Ok(())
    }
}
