//! ifupdown backend: interfaces(5) stanzas.

use super::NetworkBackend;
use async_trait::async_trait;
use converge_common::exec::CommandRunner;
use converge_common::fsutil::{atomic_write, MANAGED_HEADER};
use converge_common::spec::{NetworkInterfaceSpec, ReconcileOutcome};
use converge_common::ConvergeError;
use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub struct Ifupdown {
    probe_path: PathBuf,
    interfaces_file: PathBuf,
    interfaces_dir: PathBuf,
    runner: CommandRunner,
}

impl Default for Ifupdown {
    fn default() -> Self {
        Self {
            probe_path: PathBuf::from("/sbin/ifup"),
            interfaces_file: PathBuf::from("/etc/network/interfaces"),
            interfaces_dir: PathBuf::from("/etc/network/interfaces.d"),
            runner: CommandRunner::default(),
        }
    }
}

fn references_interface(content: &str, iface_name: &str) -> bool {
    let needle = format!("iface {iface_name} ");
    content.lines().any(|line| line.trim_start().starts_with(&needle))
}

impl Ifupdown {
    pub fn with_paths(probe_path: PathBuf, interfaces_file: PathBuf, interfaces_dir: PathBuf) -> Self {
        Self {
            probe_path,
            interfaces_file,
            interfaces_dir,
            runner: CommandRunner::default(),
        }
    }

    /// Locate the file already carrying a stanza for this interface: the
    /// main interfaces file first, then interfaces.d, else a synthesized
    /// per-interface file.
    pub fn find_config(&self, iface_name: &str) -> PathBuf {
        if let Ok(content) = std::fs::read_to_string(&self.interfaces_file) {
            if references_interface(&content, iface_name) {
                return self.interfaces_file.clone();
            }
        }
        if let Ok(entries) = std::fs::read_dir(&self.interfaces_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                let Ok(content) = std::fs::read_to_string(&path) else {
                    continue;
                };
                if references_interface(&content, iface_name) {
                    return path;
                }
            }
        }
        self.interfaces_dir.join(iface_name)
    }

    fn render(&self, iface: &NetworkInterfaceSpec) -> String {
        let mut content = String::from(MANAGED_HEADER);
        let _ = writeln!(content, "\nauto {}", iface.name);

        match &iface.ip_address {
            Some(address) => {
                let _ = writeln!(content, "iface {} inet static", iface.name);
                let _ = writeln!(content, "    address {address}");
                if let Some(gateway) = &iface.gateway {
                    let _ = writeln!(content, "    gateway {gateway}");
                }
                if let Some(mtu) = iface.mtu {
                    let _ = writeln!(content, "    mtu {mtu}");
                }
                if let Some(mac) = &iface.mac_address {
                    let _ = writeln!(content, "    hwaddress ether {mac}");
                }
                if !iface.nameservers.is_empty() {
                    let _ = writeln!(content, "    dns-nameservers {}", iface.nameservers.join(" "));
                }
            }
            None => {
                let _ = writeln!(content, "iface {} inet manual", iface.name);
            }
        }

        if let Some(address) = &iface.ipv6_address {
            let _ = writeln!(content, "\niface {} inet6 static", iface.name);
            let _ = writeln!(content, "    address {address}");
            if let Some(gateway) = &iface.ipv6_gateway {
                let _ = writeln!(content, "    gateway {gateway}");
            }
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
impl NetworkBackend for Ifupdown {
    fn name(&self) -> &'static str {
        "ifupdown"
    }

    fn is_installed(&self) -> bool {
        self.probe_path.exists()
    }

    async fn configure(&self, iface: &NetworkInterfaceSpec) -> Result<ReconcileOutcome, ConvergeError> {
        let path = self.find_config(&iface.name);
        let desired = self.render(iface);
        if read_current(&path)? == desired {
            return Ok(ReconcileOutcome::Unchanged);
        }
        atomic_write(&path, desired.as_bytes(), 0o644)?;
        Ok(ReconcileOutcome::Applied)
    }

    async fn reload(&self) -> Result<(), ConvergeError> {
        if !self.runner.is_service_active("networking").await {
            return Ok(());
        }
        self.runner
            .run_checked("systemctl", &["restart", "networking"])
            .await?;
        Ok(())
    }
}
