//! Time synchronization reconciliation (chrony).

use crate::registry::ResourceHandler;
use async_trait::async_trait;
use converge_common::exec::CommandRunner;
use converge_common::fsutil::{atomic_write, MANAGED_HEADER};
use converge_common::host::HostInfo;
use converge_common::spec::{ReconcileOutcome, ResourceKind, ResourceSpec};
use converge_common::ConvergeError;
use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::PathBuf;

const TIMESYNC_UNIT: &str = "chronyd";

pub struct NtpHandler {
    chrony_conf: PathBuf,
    runner: CommandRunner,
}

impl Default for NtpHandler {
    fn default() -> Self {
        Self {
            chrony_conf: PathBuf::from("/etc/chrony.conf"),
            runner: CommandRunner::default(),
        }
    }
}

impl NtpHandler {
    pub fn with_path(chrony_conf: PathBuf) -> Self {
        Self {
            chrony_conf,
            runner: CommandRunner::default(),
        }
    }

    fn render(&self, servers: &[String]) -> String {
        let mut content = String::from(MANAGED_HEADER);
        for server in servers {
            let _ = writeln!(content, "server {server} iburst");
        }
        content
    }
}

#[async_trait]
impl ResourceHandler for NtpHandler {
    fn name(&self) -> &'static str {
        "ntp-chrony"
    }

    fn matches(&self, host: &HostInfo) -> bool {
        host.kernel_name == "Linux"
    }

    async fn reconcile(&self, spec: &ResourceSpec) -> Result<ReconcileOutcome, ConvergeError> {
        let ResourceSpec::Ntp(spec) = spec else {
            return Err(ConvergeError::KindMismatch { expected: ResourceKind::Ntp });
        };

        if !spec.enabled {
            // Stop the daemon if it runs; never touch an already-stopped one.
            if self.runner.is_service_active(TIMESYNC_UNIT).await {
                self.runner
                    .run_checked("systemctl", &["stop", TIMESYNC_UNIT])
                    .await?;
                return Ok(ReconcileOutcome::Applied);
            }
            return Ok(ReconcileOutcome::Unchanged);
        }

        let desired = self.render(&spec.servers);
        let current = match std::fs::read_to_string(&self.chrony_conf) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(ConvergeError::Io(e)),
        };
        if current == desired {
            return Ok(ReconcileOutcome::Unchanged);
        }

        atomic_write(&self.chrony_conf, desired.as_bytes(), 0o644)?;
        if self.runner.is_service_active(TIMESYNC_UNIT).await {
            self.runner
                .run_checked("chronyc", &["reload", "sources"])
                .await?;
        }
        Ok(ReconcileOutcome::Applied)
    }
}
