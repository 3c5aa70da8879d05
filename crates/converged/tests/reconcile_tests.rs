//! Controller-level reconciliation tests: config-source modes, routing,
//! error isolation and startup policy.

use async_trait::async_trait;
use converge_common::host::HostInfo;
use converge_common::spec::{ReconcileOutcome, ResourceKind, ResourceSpec};
use converge_common::ConvergeError;
use converged::controller::Controller;
use converged::registry::{HandlerRegistry, ResourceHandler};
use std::sync::{Arc, Mutex};

fn linux_host() -> HostInfo {
    HostInfo {
        distribution_id: "debian".to_string(),
        distribution_version: "12".to_string(),
        kernel_name: "Linux".to_string(),
        kernel_version: "6.1.0".to_string(),
    }
}

/// Records every spec it is handed; optionally fails.
struct RecordingHandler {
    seen: Arc<Mutex<Vec<ResourceSpec>>>,
    fail: bool,
}

#[async_trait]
impl ResourceHandler for RecordingHandler {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn matches(&self, host: &HostInfo) -> bool {
        host.kernel_name == "Linux"
    }

    async fn reconcile(&self, spec: &ResourceSpec) -> Result<ReconcileOutcome, ConvergeError> {
        self.seen.lock().unwrap().push(spec.clone());
        if self.fail {
            return Err(ConvergeError::Unsupported("induced failure".to_string()));
        }
        Ok(ReconcileOutcome::Applied)
    }
}

fn registry_with(
    kinds: &[ResourceKind],
) -> (HandlerRegistry, Arc<Mutex<Vec<ResourceSpec>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut registry = HandlerRegistry::new();
    for &kind in kinds {
        registry.register(
            kind,
            Arc::new(RecordingHandler {
                seen: seen.clone(),
                fail: false,
            }),
        );
    }
    (registry, seen)
}

#[tokio::test]
async fn directory_mode_routes_files_by_kind() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("dns.yaml"),
        "kind: dns\nspec:\n  nameservers: [\"1.1.1.1\"]\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("system.json"),
        r#"{"kind": "system", "spec": {"timezone": "Europe/Oslo"}}"#,
    )
    .unwrap();
    // Non-config files are ignored.
    std::fs::write(dir.path().join("README.md"), "not a config").unwrap();

    let (registry, seen) = registry_with(&[ResourceKind::Dns, ResourceKind::System]);
    let controller =
        Controller::new(dir.path().to_path_buf(), &linux_host(), &registry, false).unwrap();
    controller.reconcile().await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    let kinds: Vec<_> = seen.iter().map(|s| s.kind()).collect();
    assert!(kinds.contains(&ResourceKind::Dns));
    assert!(kinds.contains(&ResourceKind::System));
}

#[tokio::test]
async fn one_broken_file_does_not_abort_the_pass() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("broken.yaml"), "kind: [not, a, string\n").unwrap();
    std::fs::write(
        dir.path().join("dns.yaml"),
        "kind: dns\nspec:\n  nameservers: [\"1.1.1.1\"]\n",
    )
    .unwrap();
    // A kind with no registered handler is logged and skipped too.
    std::fs::write(
        dir.path().join("udev.yaml"),
        "kind: udev\nspec:\n  rules: []\n",
    )
    .unwrap();

    let (registry, seen) = registry_with(&[ResourceKind::Dns]);
    let controller =
        Controller::new(dir.path().to_path_buf(), &linux_host(), &registry, false).unwrap();
    controller.reconcile().await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].kind(), ResourceKind::Dns);
}

#[tokio::test]
async fn single_document_mode_invokes_each_present_section() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.yaml");
    std::fs::write(
        &config,
        "dns:\n  nameservers: [\"1.1.1.1\"]\nhosts:\n  entries:\n    - ip: 10.0.0.1\n      hostnames: [node-a]\nsystem:\n  timezone: UTC\n",
    )
    .unwrap();

    let (registry, seen) = registry_with(&[
        ResourceKind::Dns,
        ResourceKind::Hosts,
        ResourceKind::System,
    ]);
    let controller = Controller::new(config, &linux_host(), &registry, false).unwrap();
    controller.reconcile().await;

    let seen = seen.lock().unwrap();
    let kinds: Vec<_> = seen.iter().map(|s| s.kind()).collect();
    assert_eq!(kinds.len(), 3);
    assert!(kinds.contains(&ResourceKind::Dns));
    assert!(kinds.contains(&ResourceKind::Hosts));
    assert!(kinds.contains(&ResourceKind::System));
}

#[tokio::test]
async fn failing_handler_does_not_stop_other_handlers() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.yaml");
    std::fs::write(
        &config,
        "dns:\n  nameservers: [\"1.1.1.1\"]\nsystem:\n  timezone: UTC\n",
    )
    .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut registry = HandlerRegistry::new();
    registry.register(
        ResourceKind::Dns,
        Arc::new(RecordingHandler {
            seen: seen.clone(),
            fail: true,
        }),
    );
    registry.register(
        ResourceKind::System,
        Arc::new(RecordingHandler {
            seen: seen.clone(),
            fail: false,
        }),
    );

    let controller = Controller::new(config, &linux_host(), &registry, false).unwrap();
    controller.reconcile().await;

    // Both handlers ran despite the first one failing.
    assert_eq!(seen.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn strict_startup_fails_without_a_required_handler() {
    let dir = tempfile::tempdir().unwrap();
    let registry = HandlerRegistry::new();
    let err = Controller::new(dir.path().to_path_buf(), &linux_host(), &registry, true);
    assert!(err.is_err());
}

#[tokio::test]
async fn lenient_startup_warns_and_continues() {
    let dir = tempfile::tempdir().unwrap();
    let registry = HandlerRegistry::new();
    let controller = Controller::new(dir.path().to_path_buf(), &linux_host(), &registry, false);
    assert!(controller.is_ok());
}

#[tokio::test]
async fn non_matching_handler_is_not_selected() {
    struct WrongKernel;

    #[async_trait]
    impl ResourceHandler for WrongKernel {
        fn name(&self) -> &'static str {
            "wrong-kernel"
        }

        fn matches(&self, host: &HostInfo) -> bool {
            host.kernel_name == "FreeBSD"
        }

        async fn reconcile(&self, _spec: &ResourceSpec) -> Result<ReconcileOutcome, ConvergeError> {
            unreachable!("must never be selected on Linux")
        }
    }

    let mut registry = HandlerRegistry::new();
    registry.register(ResourceKind::Dns, Arc::new(WrongKernel));
    let dir = tempfile::tempdir().unwrap();

    // Strict mode: the non-matching candidate counts as no handler.
    assert!(Controller::new(dir.path().to_path_buf(), &linux_host(), &registry, true).is_err());
}
