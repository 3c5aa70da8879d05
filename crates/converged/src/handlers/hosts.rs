//! Hosts file reconciliation (/etc/hosts).
//!
//! The rendered file always carries the localhost preamble, and the
//! preamble participates in the comparison so an already-converged file is
//! recognized as such.

use crate::registry::ResourceHandler;
use async_trait::async_trait;
use converge_common::compare::host_entries_equal;
use converge_common::fsutil::{atomic_write, MANAGED_HEADER};
use converge_common::host::HostInfo;
use converge_common::spec::{HostEntry, ReconcileOutcome, ResourceKind, ResourceSpec};
use converge_common::ConvergeError;
use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::PathBuf;

pub struct HostsHandler {
    hosts_file: PathBuf,
}

impl Default for HostsHandler {
    fn default() -> Self {
        Self {
            hosts_file: PathBuf::from("/etc/hosts"),
        }
    }
}

fn preamble_entries() -> Vec<HostEntry> {
    vec![
        HostEntry {
            ip: "127.0.0.1".to_string(),
            hostnames: vec!["localhost".to_string()],
        },
        HostEntry {
            ip: "::1".to_string(),
            hostnames: vec![
                "localhost".to_string(),
                "ip6-localhost".to_string(),
                "ip6-loopback".to_string(),
            ],
        },
    ]
}

impl HostsHandler {
    pub fn with_path(hosts_file: PathBuf) -> Self {
        Self { hosts_file }
    }

    fn current_entries(&self) -> Result<Vec<HostEntry>, ConvergeError> {
        let content = match std::fs::read_to_string(&self.hosts_file) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ConvergeError::Io(e)),
        };
        let mut entries = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace().map(str::to_string);
            let Some(ip) = fields.next() else { continue };
            let hostnames: Vec<String> = fields.collect();
            if !hostnames.is_empty() {
                entries.push(HostEntry { ip, hostnames });
            }
        }
        Ok(entries)
    }

    fn render(&self, entries: &[HostEntry]) -> String {
        let mut content = String::from(MANAGED_HEADER);
        content.push_str("127.0.0.1 localhost\n");
        content.push_str("::1 localhost ip6-localhost ip6-loopback\n\n");
        for entry in entries {
            let _ = writeln!(content, "{} {}", entry.ip, entry.hostnames.join(" "));
        }
        content
    }
}

#[async_trait]
impl ResourceHandler for HostsHandler {
    fn name(&self) -> &'static str {
        "hosts-linux"
    }

    fn matches(&self, host: &HostInfo) -> bool {
        host.kernel_name == "Linux"
    }

    async fn reconcile(&self, spec: &ResourceSpec) -> Result<ReconcileOutcome, ConvergeError> {
        let ResourceSpec::Hosts(spec) = spec else {
            return Err(ConvergeError::KindMismatch { expected: ResourceKind::Hosts });
        };

        let current = self.current_entries()?;
        let mut desired = preamble_entries();
        desired.extend(spec.entries.iter().cloned());

        if host_entries_equal(&current, &desired) {
            return Ok(ReconcileOutcome::Unchanged);
        }

        let content = self.render(&spec.entries);
        atomic_write(&self.hosts_file, content.as_bytes(), 0o644)?;
        Ok(ReconcileOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_common::spec::HostsSpec;

    fn spec(entries: &[(&str, &[&str])]) -> ResourceSpec {
        ResourceSpec::Hosts(HostsSpec {
            entries: entries
                .iter()
                .map(|(ip, names)| HostEntry {
                    ip: ip.to_string(),
                    hostnames: names.iter().map(|s| s.to_string()).collect(),
                })
                .collect(),
        })
    }

    #[tokio::test]
    async fn converges_and_stays_converged() {
        let dir = tempfile::tempdir().unwrap();
        let handler = HostsHandler::with_path(dir.path().join("hosts"));
        let desired = spec(&[("10.0.0.1", &["node-a", "node-a.local"])]);

        let outcome = handler.reconcile(&desired).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Applied);
        let content = std::fs::read_to_string(dir.path().join("hosts")).unwrap();
        assert!(content.contains("127.0.0.1 localhost\n"));
        assert!(content.contains("10.0.0.1 node-a node-a.local\n"));

        // The file just written, preamble included, must compare equal.
        let outcome = handler.reconcile(&desired).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Unchanged);
    }

    #[tokio::test]
    async fn hostname_order_does_not_force_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts");
        let handler = HostsHandler::with_path(path.clone());
        handler
            .reconcile(&spec(&[("10.0.0.1", &["a", "b"])]))
            .await
            .unwrap();

        let outcome = handler
            .reconcile(&spec(&[("10.0.0.1", &["b", "a"])]))
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Unchanged);
    }

    #[tokio::test]
    async fn removed_hostname_forces_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let handler = HostsHandler::with_path(dir.path().join("hosts"));
        handler
            .reconcile(&spec(&[("10.0.0.1", &["a", "b"])]))
            .await
            .unwrap();

        let outcome = handler.reconcile(&spec(&[("10.0.0.1", &["a"])])).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Applied);
        let content = std::fs::read_to_string(dir.path().join("hosts")).unwrap();
        assert!(content.contains("10.0.0.1 a\n"));
        assert!(!content.contains("10.0.0.1 a b\n"));
    }
}
