//! DNS resolver reconciliation (/etc/resolv.conf).

use crate::registry::ResourceHandler;
use async_trait::async_trait;
use converge_common::compare::unordered_eq;
use converge_common::fsutil::{atomic_write, MANAGED_HEADER};
use converge_common::host::HostInfo;
use converge_common::spec::{ReconcileOutcome, ResourceKind, ResourceSpec};
use converge_common::ConvergeError;
use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::PathBuf;

pub struct DnsHandler {
    resolv_conf: PathBuf,
}

impl Default for DnsHandler {
    fn default() -> Self {
        Self {
            resolv_conf: PathBuf::from("/etc/resolv.conf"),
        }
    }
}

impl DnsHandler {
    pub fn with_path(resolv_conf: PathBuf) -> Self {
        Self { resolv_conf }
    }

    /// Nameservers currently configured; a missing resolver file is an
    /// empty current state.
    fn current_nameservers(&self) -> Result<Vec<String>, ConvergeError> {
        let content = match std::fs::read_to_string(&self.resolv_conf) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ConvergeError::Io(e)),
        };
        let mut servers = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            if fields.next() == Some("nameserver") {
                if let (Some(server), None) = (fields.next(), fields.next()) {
                    servers.push(server.to_string());
                }
            }
        }
        Ok(servers)
    }

    fn render(&self, nameservers: &[String]) -> String {
        let mut content = String::from(MANAGED_HEADER);
        for server in nameservers {
            let _ = writeln!(content, "nameserver {server}");
        }
        content
    }
}

#[async_trait]
impl ResourceHandler for DnsHandler {
    fn name(&self) -> &'static str {
        "dns-linux"
    }

    fn matches(&self, host: &HostInfo) -> bool {
        host.kernel_name == "Linux"
    }

    async fn reconcile(&self, spec: &ResourceSpec) -> Result<ReconcileOutcome, ConvergeError> {
        let ResourceSpec::Dns(spec) = spec else {
            return Err(ConvergeError::KindMismatch { expected: ResourceKind::Dns });
        };

        let current = self.current_nameservers()?;
        if unordered_eq(&current, &spec.nameservers) {
            return Ok(ReconcileOutcome::Unchanged);
        }

        let content = self.render(&spec.nameservers);
        atomic_write(&self.resolv_conf, content.as_bytes(), 0o644)?;
        Ok(ReconcileOutcome::Applied)
    }
}
