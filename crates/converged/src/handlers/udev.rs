//! Udev rule reconciliation (/etc/udev/rules.d).

use crate::registry::ResourceHandler;
use async_trait::async_trait;
use converge_common::exec::CommandRunner;
use converge_common::fsutil::{atomic_write, MANAGED_HEADER};
use converge_common::host::HostInfo;
use converge_common::spec::{ReconcileOutcome, ResourceKind, ResourceSpec, UdevRule};
use converge_common::ConvergeError;
use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::PathBuf;

pub struct UdevHandler {
    rules_file: PathBuf,
    runner: CommandRunner,
}

impl Default for UdevHandler {
    fn default() -> Self {
        Self {
            rules_file: PathBuf::from("/etc/udev/rules.d/99-converged.rules"),
            runner: CommandRunner::default(),
        }
    }
}

impl UdevHandler {
    pub fn with_path(rules_file: PathBuf) -> Self {
        Self {
            rules_file,
            runner: CommandRunner::default(),
        }
    }

    fn render(&self, rules: &[UdevRule]) -> String {
        let mut content = String::from(MANAGED_HEADER);
        for rule in rules {
            if !rule.name.is_empty() {
                let _ = writeln!(content, "# {}", rule.name);
            }
            let _ = write!(content, "SUBSYSTEM==\"{}\", ", rule.subsystem);
            for (key, value) in &rule.attrs {
                let _ = write!(content, "ATTRS{{{key}}}==\"{value}\", ");
            }
            let _ = writeln!(content, "SYMLINK+=\"{}\"", rule.symlink);
        }
        content
    }

    fn current_rules(&self) -> Result<String, ConvergeError> {
        match std::fs::read_to_string(&self.rules_file) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(ConvergeError::Io(e)),
        }
    }
}

#[async_trait]
impl ResourceHandler for UdevHandler {
    fn name(&self) -> &'static str {
        "udev-linux"
    }

    fn matches(&self, host: &HostInfo) -> bool {
        host.kernel_name == "Linux"
    }

    async fn reconcile(&self, spec: &ResourceSpec) -> Result<ReconcileOutcome, ConvergeError> {
        let ResourceSpec::Udev(spec) = spec else {
            return Err(ConvergeError::KindMismatch { expected: ResourceKind::Udev });
        };

        let desired = self.render(&spec.rules);
        if self.current_rules()? == desired {
            return Ok(ReconcileOutcome::Unchanged);
        }

        atomic_write(&self.rules_file, desired.as_bytes(), 0o644)?;

        if self.runner.is_service_active("systemd-udevd").await {
            self.runner
                .run_checked("udevadm", &["control", "--reload-rules"])
                .await?;
            self.runner.run_checked("udevadm", &["trigger"]).await?;
        }
        Ok(ReconcileOutcome::Applied)
    }
}
