//! System timezone reconciliation.

use crate::registry::ResourceHandler;
use async_trait::async_trait;
use converge_common::exec::CommandRunner;
use converge_common::host::HostInfo;
use converge_common::spec::{ReconcileOutcome, ResourceKind, ResourceSpec};
use converge_common::ConvergeError;
use std::path::PathBuf;

pub struct SystemHandler {
    localtime: PathBuf,
    runner: CommandRunner,
}

impl Default for SystemHandler {
    fn default() -> Self {
        Self {
            localtime: PathBuf::from("/etc/localtime"),
            runner: CommandRunner::default(),
        }
    }
}

impl SystemHandler {
    pub fn with_localtime(localtime: PathBuf) -> Self {
        Self {
            localtime,
            runner: CommandRunner::default(),
        }
    }

    /// The configured zone can be read off the localtime symlink, which
    /// points into the zoneinfo database.
    fn zone_already_set(&self, timezone: &str) -> bool {
        match std::fs::read_link(&self.localtime) {
            Ok(target) => target.ends_with(timezone),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl ResourceHandler for SystemHandler {
    fn name(&self) -> &'static str {
        "system-linux"
    }

    fn matches(&self, host: &HostInfo) -> bool {
        host.kernel_name == "Linux"
    }

    async fn reconcile(&self, spec: &ResourceSpec) -> Result<ReconcileOutcome, ConvergeError> {
        let ResourceSpec::System(spec) = spec else {
            return Err(ConvergeError::KindMismatch { expected: ResourceKind::System });
        };

        if spec.timezone.is_empty() || self.zone_already_set(&spec.timezone) {
            return Ok(ReconcileOutcome::Unchanged);
        }

        self.runner
            .run_checked("timedatectl", &["set-timezone", &spec.timezone])
            .await?;
        Ok(ReconcileOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_common::spec::SystemSpec;

    #[tokio::test]
    async fn empty_timezone_is_a_no_op() {
        let handler = SystemHandler::default();
        let outcome = handler
            .reconcile(&ResourceSpec::System(SystemSpec::default()))
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Unchanged);
    }

    #[tokio::test]
    async fn matching_localtime_symlink_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let zoneinfo = dir.path().join("zoneinfo/Europe/Oslo");
        std::fs::create_dir_all(zoneinfo.parent().unwrap()).unwrap();
        std::fs::write(&zoneinfo, "TZif").unwrap();
        let localtime = dir.path().join("localtime");
        std::os::unix::fs::symlink(&zoneinfo, &localtime).unwrap();

        let handler = SystemHandler::with_localtime(localtime);
        let outcome = handler
            .reconcile(&ResourceSpec::System(SystemSpec {
                timezone: "Europe/Oslo".to_string(),
            }))
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Unchanged);
    }
}
