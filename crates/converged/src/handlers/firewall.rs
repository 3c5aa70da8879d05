//! Firewall reconciliation via iptables.
//!
//! Rules are applied by flushing the INPUT chain and rebuilding it:
//! default-deny policy, an always-present allow for established/related
//! traffic, then one rule per spec entry. No files are written and no
//! services reloaded.

use crate::registry::ResourceHandler;
use async_trait::async_trait;
use converge_common::exec::CommandRunner;
use converge_common::host::HostInfo;
use converge_common::spec::{ReconcileOutcome, ResourceKind, ResourceSpec};
use converge_common::ConvergeError;

#[derive(Default)]
pub struct FirewallHandler {
    runner: CommandRunner,
}

#[async_trait]
impl ResourceHandler for FirewallHandler {
    fn name(&self) -> &'static str {
        "firewall-iptables"
    }

    fn matches(&self, host: &HostInfo) -> bool {
        host.kernel_name == "Linux"
    }

    async fn reconcile(&self, spec: &ResourceSpec) -> Result<ReconcileOutcome, ConvergeError> {
        let ResourceSpec::Firewall(spec) = spec else {
            return Err(ConvergeError::KindMismatch { expected: ResourceKind::Firewall });
        };

        self.runner.run_checked("iptables", &["-F"]).await?;
        self.runner
            .run_checked("iptables", &["-P", "INPUT", "DROP"])
            .await?;
        self.runner
            .run_checked(
                "iptables",
                &[
                    "-A", "INPUT", "-m", "state", "--state", "ESTABLISHED,RELATED", "-j", "ACCEPT",
                ],
            )
            .await?;

        for rule in &spec.rules {
            let port = rule.port.to_string();
            let action = rule.action.to_uppercase();
            self.runner
                .run_checked(
                    "iptables",
                    &[
                        "-A", "INPUT", "-p", &rule.protocol, "--dport", &port, "-j", &action,
                    ],
                )
                .await
                .map_err(|e| e.context(format!("rule for port {}", rule.port)))?;
        }

        Ok(ReconcileOutcome::Applied)
    }
}
