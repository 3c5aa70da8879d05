//! Network interface reconciliation.
//!
//! A host may carry more than one network-management stack, each partially
//! configured. Every backend that is actually installed is driven for every
//! matching interface so all stacks stay consistent, rather than assuming a
//! single authority.

pub mod ifupdown;
pub mod netplan;
pub mod networkmanager;

use crate::registry::ResourceHandler;
use async_trait::async_trait;
use converge_common::host::{selector_matches, HostInfo};
use converge_common::spec::{NetworkInterfaceSpec, ReconcileOutcome, ResourceKind, ResourceSpec};
use converge_common::ConvergeError;
use tracing::debug;

/// One mechanism capable of realizing network configuration on this host.
#[async_trait]
pub trait NetworkBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// File-existence probe for the backend's control binary.
    fn is_installed(&self) -> bool;

    /// Converge this backend's config location for one interface.
    async fn configure(&self, iface: &NetworkInterfaceSpec) -> Result<ReconcileOutcome, ConvergeError>;

    /// Re-apply configuration, only if the owning service is already active.
    async fn reload(&self) -> Result<(), ConvergeError>;
}

pub struct NetworkHandler {
    backends: Vec<Box<dyn NetworkBackend>>,
}

impl Default for NetworkHandler {
    fn default() -> Self {
        Self {
            backends: vec![
                Box::new(networkmanager::NetworkManager::default()),
                Box::new(netplan::Netplan::default()),
                Box::new(ifupdown::Ifupdown::default()),
            ],
        }
    }
}

impl NetworkHandler {
    pub fn with_backends(backends: Vec<Box<dyn NetworkBackend>>) -> Self {
        Self { backends }
    }
}

#[async_trait]
impl ResourceHandler for NetworkHandler {
    fn name(&self) -> &'static str {
        "network-linux"
    }

    fn matches(&self, host: &HostInfo) -> bool {
        host.kernel_name == "Linux"
    }

    async fn reconcile(&self, spec: &ResourceSpec) -> Result<ReconcileOutcome, ConvergeError> {
        let ResourceSpec::Network(spec) = spec else {
            return Err(ConvergeError::KindMismatch { expected: ResourceKind::Network });
        };

        let mut outcome = ReconcileOutcome::Unchanged;
        for iface in &spec.interfaces {
            if !selector_matches(&iface.node_selector)? {
                debug!("interface {} does not select this node, skipping", iface.name);
                continue;
            }

            for backend in &self.backends {
                if !backend.is_installed() {
                    continue;
                }
                let result = backend
                    .configure(iface)
                    .await
                    .map_err(|e| e.context(format!("backend {} on interface {}", backend.name(), iface.name)))?;
                if result == ReconcileOutcome::Applied {
                    backend
                        .reload()
                        .await
                        .map_err(|e| e.context(format!("reloading backend {}", backend.name())))?;
                }
                outcome = outcome.merge(result);
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_common::host::NodeSelector;
    use converge_common::spec::NetworkSpec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct RecordingBackend {
        installed: bool,
        configured: Arc<AtomicUsize>,
        reloaded: Arc<AtomicUsize>,
        result: ReconcileOutcome,
    }

    #[async_trait]
    impl NetworkBackend for RecordingBackend {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn is_installed(&self) -> bool {
            self.installed
        }

        async fn configure(&self, _iface: &NetworkInterfaceSpec) -> Result<ReconcileOutcome, ConvergeError> {
            self.configured.fetch_add(1, Ordering::SeqCst);
            Ok(self.result)
        }

        async fn reload(&self) -> Result<(), ConvergeError> {
            self.reloaded.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn iface(name: &str, selector: NodeSelector) -> NetworkInterfaceSpec {
        NetworkInterfaceSpec {
            name: name.to_string(),
            node_selector: selector,
            ..Default::default()
        }
    }

    fn network_spec(interfaces: Vec<NetworkInterfaceSpec>) -> ResourceSpec {
        ResourceSpec::Network(NetworkSpec { interfaces })
    }

    #[tokio::test]
    async fn selector_mismatch_skips_interface_entirely() {
        let configured = Arc::new(AtomicUsize::new(0));
        let handler = NetworkHandler::with_backends(vec![Box::new(RecordingBackend {
            installed: true,
            configured: configured.clone(),
            reloaded: Arc::new(AtomicUsize::new(0)),
            result: ReconcileOutcome::Applied,
        })]);

        let selector = NodeSelector {
            hostname: Some("definitely-not-this-host-a8f31".to_string()),
            mac_address: None,
        };
        let outcome = handler
            .reconcile(&network_spec(vec![iface("eth0", selector)]))
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Unchanged);
        assert_eq!(configured.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_selector_always_applies() {
        let configured = Arc::new(AtomicUsize::new(0));
        let reloaded = Arc::new(AtomicUsize::new(0));
        let handler = NetworkHandler::with_backends(vec![Box::new(RecordingBackend {
            installed: true,
            configured: configured.clone(),
            reloaded: reloaded.clone(),
            result: ReconcileOutcome::Applied,
        })]);

        let outcome = handler
            .reconcile(&network_spec(vec![iface("eth0", NodeSelector::default())]))
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Applied);
        assert_eq!(configured.load(Ordering::SeqCst), 1);
        assert_eq!(reloaded.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn uninstalled_backend_is_excluded() {
        let configured = Arc::new(AtomicUsize::new(0));
        let handler = NetworkHandler::with_backends(vec![Box::new(RecordingBackend {
            installed: false,
            configured: configured.clone(),
            reloaded: Arc::new(AtomicUsize::new(0)),
            result: ReconcileOutcome::Applied,
        })]);

        handler
            .reconcile(&network_spec(vec![iface("eth0", NodeSelector::default())]))
            .await
            .unwrap();
        assert_eq!(configured.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unchanged_configuration_skips_reload() {
        let reloaded = Arc::new(AtomicUsize::new(0));
        let handler = NetworkHandler::with_backends(vec![Box::new(RecordingBackend {
            installed: true,
            configured: Arc::new(AtomicUsize::new(0)),
            reloaded: reloaded.clone(),
            result: ReconcileOutcome::Unchanged,
        })]);

        let outcome = handler
            .reconcile(&network_spec(vec![iface("eth0", NodeSelector::default())]))
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Unchanged);
        assert_eq!(reloaded.load(Ordering::SeqCst), 0);
    }
}
