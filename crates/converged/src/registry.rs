//! Handler registry and capability matching.
//!
//! The registry is an explicit value built at process start; resource
//! modules register into it through `handlers::register_all` rather than
//! through import-time side effects. Selection is a pure function over the
//! probed host and the registry snapshot.

use async_trait::async_trait;
use converge_common::host::HostInfo;
use converge_common::spec::{ReconcileOutcome, ResourceKind, ResourceSpec};
use converge_common::ConvergeError;
use std::collections::HashMap;
use std::sync::Arc;

/// Capability interface implemented once per resource kind.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Short implementation name for log lines.
    fn name(&self) -> &'static str;

    /// Whether this implementation is applicable to the probed host.
    fn matches(&self, host: &HostInfo) -> bool;

    /// Converge the live system toward `spec`.
    async fn reconcile(&self, spec: &ResourceSpec) -> Result<ReconcileOutcome, ConvergeError>;
}

/// Ordered candidate lists per resource kind. Registration order is
/// priority order: the first matching candidate wins.
#[derive(Default)]
pub struct HandlerRegistry {
    candidates: HashMap<ResourceKind, Vec<Arc<dyn ResourceHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a candidate handler for `kind`.
    pub fn register(&mut self, kind: ResourceKind, handler: Arc<dyn ResourceHandler>) {
        self.candidates.entry(kind).or_default().push(handler);
    }

    /// The first registered candidate for `kind` whose capability match
    /// succeeds on this host, if any.
    pub fn select(&self, host: &HostInfo, kind: ResourceKind) -> Option<Arc<dyn ResourceHandler>> {
        self.candidates
            .get(&kind)?
            .iter()
            .find(|handler| handler.matches(host))
            .cloned()
    }

    /// Resolve the active handler for every required kind. Kinds with no
    /// matching candidate are absent from the result.
    pub fn select_active(
        &self,
        host: &HostInfo,
        kinds: &[ResourceKind],
    ) -> HashMap<ResourceKind, Arc<dyn ResourceHandler>> {
        let mut active = HashMap::new();
        for &kind in kinds {
            if let Some(handler) = self.select(host, kind) {
                active.insert(kind, handler);
            }
        }
        active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeHandler {
        name: &'static str,
        kernel: &'static str,
    }

    #[async_trait]
    impl ResourceHandler for FakeHandler {
        fn name(&self) -> &'static str {
            self.name
        }

        fn matches(&self, host: &HostInfo) -> bool {
            host.kernel_name == self.kernel
        }

        async fn reconcile(&self, _spec: &ResourceSpec) -> Result<ReconcileOutcome, ConvergeError> {
            Ok(ReconcileOutcome::Unchanged)
        }
    }

    fn linux_host() -> HostInfo {
        HostInfo {
            distribution_id: "debian".to_string(),
            distribution_version: "12".to_string(),
            kernel_name: "Linux".to_string(),
            kernel_version: "6.1.0".to_string(),
        }
    }

    #[test]
    fn first_matching_candidate_wins() {
        let mut registry = HandlerRegistry::new();
        registry.register(
            ResourceKind::Dns,
            Arc::new(FakeHandler { name: "first", kernel: "Linux" }),
        );
        registry.register(
            ResourceKind::Dns,
            Arc::new(FakeHandler { name: "second", kernel: "Linux" }),
        );

        let selected = registry.select(&linux_host(), ResourceKind::Dns).unwrap();
        assert_eq!(selected.name(), "first");
    }

    #[test]
    fn non_matching_candidates_are_skipped() {
        let mut registry = HandlerRegistry::new();
        registry.register(
            ResourceKind::Dns,
            Arc::new(FakeHandler { name: "bsd-only", kernel: "FreeBSD" }),
        );
        registry.register(
            ResourceKind::Dns,
            Arc::new(FakeHandler { name: "linux", kernel: "Linux" }),
        );

        let selected = registry.select(&linux_host(), ResourceKind::Dns).unwrap();
        assert_eq!(selected.name(), "linux");
    }

    #[test]
    fn no_match_yields_none() {
        let mut registry = HandlerRegistry::new();
        registry.register(
            ResourceKind::Dns,
            Arc::new(FakeHandler { name: "bsd-only", kernel: "FreeBSD" }),
        );
        assert!(registry.select(&linux_host(), ResourceKind::Dns).is_none());
        assert!(registry.select(&linux_host(), ResourceKind::Hosts).is_none());
    }

    #[test]
    fn select_active_resolves_per_kind() {
        let mut registry = HandlerRegistry::new();
        registry.register(
            ResourceKind::Dns,
            Arc::new(FakeHandler { name: "dns", kernel: "Linux" }),
        );
        registry.register(
            ResourceKind::Hosts,
            Arc::new(FakeHandler { name: "hosts", kernel: "FreeBSD" }),
        );

        let active = registry.select_active(
            &linux_host(),
            &[ResourceKind::Dns, ResourceKind::Hosts, ResourceKind::Ntp],
        );
        assert_eq!(active.len(), 1);
        assert!(active.contains_key(&ResourceKind::Dns));
    }
}
