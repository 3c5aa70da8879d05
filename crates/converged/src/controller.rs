//! Watch-and-reconcile control loop.
//!
//! One task owns the loop and processes filesystem events sequentially; the
//! notify watcher delivers events to it over a channel. Reconciliation
//! passes never overlap: the loop does not look at the next event until the
//! in-flight pass returns, so every pass observes a consistent snapshot and
//! no two passes race to write the same file.

use crate::registry::{HandlerRegistry, ResourceHandler};
use converge_common::host::HostInfo;
use converge_common::spec::{self, ResourceKind, ResourceSpec};
use converge_common::ConvergeError;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

pub struct Controller {
    config_path: PathBuf,
    active: HashMap<ResourceKind, Arc<dyn ResourceHandler>>,
}

impl Controller {
    /// Select the active handler for every required resource kind. A kind
    /// with no compatible handler is a warning by default and a startup
    /// error in strict mode.
    pub fn new(
        config_path: PathBuf,
        host: &HostInfo,
        registry: &HandlerRegistry,
        strict: bool,
    ) -> Result<Self, ConvergeError> {
        let mut active = HashMap::new();
        for kind in ResourceKind::ALL {
            match registry.select(host, kind) {
                Some(handler) => {
                    debug!("resource kind {kind}: handler {}", handler.name());
                    active.insert(kind, handler);
                }
                None if strict => {
                    return Err(ConvergeError::Unsupported(format!(
                        "no compatible handler for resource kind {kind} on {} {}",
                        host.distribution_id, host.distribution_version
                    )));
                }
                None => {
                    warn!(
                        "no compatible handler for resource kind {kind} on {} {}",
                        host.distribution_id, host.distribution_version
                    );
                }
            }
        }
        Ok(Self { config_path, active })
    }

    /// Run the loop: initial pass, then one pass per write-class event on
    /// the configuration source, indefinitely. Only watch setup can fail;
    /// reconciliation failures are logged and the loop keeps going.
    pub async fn run(&self) -> Result<(), ConvergeError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            let _ = tx.send(res);
        })
        .map_err(|e| ConvergeError::Watch(e.to_string()))?;
        watcher
            .watch(&self.config_path, RecursiveMode::Recursive)
            .map_err(|e| ConvergeError::Watch(e.to_string()))?;
        info!("watching {}", self.config_path.display());

        // Converge once before waiting for events.
        self.reconcile().await;

        while let Some(event) = rx.recv().await {
            match event {
                Ok(event) if is_write_event(&event) => {
                    debug!("configuration change: {:?}", event.paths);
                    self.reconcile().await;
                }
                Ok(_) => {}
                Err(e) => warn!("watch error: {e}"),
            }
        }
        Ok(())
    }

    /// One reconciliation pass over the configuration source.
    pub async fn reconcile(&self) {
        match tokio::fs::metadata(&self.config_path).await {
            Ok(meta) if meta.is_dir() => self.reconcile_directory().await,
            Ok(_) => self.reconcile_document().await,
            Err(e) => warn!(
                "cannot read configuration source {}: {e}",
                self.config_path.display()
            ),
        }
    }

    /// Single-document mode: decode the whole tree once and invoke every
    /// active handler with its section.
    async fn reconcile_document(&self) {
        let origin = self.config_path.clone();
        let content = match tokio::fs::read_to_string(&origin).await {
            Ok(content) => content,
            Err(e) => {
                warn!("cannot read {}: {e}", origin.display());
                return;
            }
        };
        let document = match spec::parse_desired_state(&origin, &content) {
            Ok(document) => document,
            Err(e) => {
                warn!("cannot decode {}: {e}", origin.display());
                return;
            }
        };
        for resource in document.into_specs() {
            self.dispatch(resource, &origin).await;
        }
    }

    /// Directory mode: every matching file is read independently, decoded
    /// per its kind field and routed to the active handler. One bad file
    /// does not abort the others.
    async fn reconcile_directory(&self) {
        for entry in WalkDir::new(&self.config_path)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("cannot walk configuration directory: {e}");
                    None
                }
            })
        {
            if !entry.file_type().is_file() || !has_config_extension(entry.path()) {
                continue;
            }
            let path = entry.path();
            let content = match tokio::fs::read_to_string(path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!("cannot read {}: {e}", path.display());
                    continue;
                }
            };
            let resource = match spec::parse_resource_document(path, &content)
                .and_then(|document| document.into_spec())
            {
                Ok(resource) => resource,
                Err(e) => {
                    warn!("cannot decode {}: {e}", path.display());
                    continue;
                }
            };
            self.dispatch(resource, path).await;
        }
    }

    async fn dispatch(&self, resource: ResourceSpec, origin: &Path) {
        let kind = resource.kind();
        let Some(handler) = self.active.get(&kind) else {
            warn!("no active handler for kind {kind} ({})", origin.display());
            return;
        };
        match handler.reconcile(&resource).await {
            Ok(outcome) => info!(
                "reconciled {kind} ({}): {}",
                origin.display(),
                outcome.as_str()
            ),
            Err(e) => error!(
                "reconciliation failed for {kind} ({}): {e}",
                origin.display()
            ),
        }
    }
}

fn is_write_event(event: &Event) -> bool {
    matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
}

fn has_config_extension(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml" | "json")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_extension_filter() {
        assert!(has_config_extension(Path::new("/etc/converged/dns.yaml")));
        assert!(has_config_extension(Path::new("network.yml")));
        assert!(has_config_extension(Path::new("serial.json")));
        assert!(!has_config_extension(Path::new("README.md")));
        assert!(!has_config_extension(Path::new("backup.yaml.bak")));
    }

    #[test]
    fn write_events_trigger_reconciliation() {
        use notify::event::{CreateKind, ModifyKind, RemoveKind};

        let modify = Event::new(EventKind::Modify(ModifyKind::Any));
        let create = Event::new(EventKind::Create(CreateKind::File));
        let remove = Event::new(EventKind::Remove(RemoveKind::File));
        assert!(is_write_event(&modify));
        assert!(is_write_event(&create));
        assert!(!is_write_event(&remove));
    }
}
