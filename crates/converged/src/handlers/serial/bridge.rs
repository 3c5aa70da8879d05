//! Transparent TCP-to-serial bridge.
//!
//! One bridge instance per device, tracked in a registry shared between
//! reconciliation passes and the bridges' background tasks. Connections are
//! served one at a time so the serial device is never held by more than one
//! peer; stopping a bridge drains the in-flight connection before the
//! device is released.

use converge_common::spec::{BridgeProtocol, ReconcileOutcome, TransparentSpec};
use converge_common::ConvergeError;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

struct BridgeServer {
    config: TransparentSpec,
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

#[derive(Clone, Default)]
pub struct BridgeRegistry {
    servers: Arc<RwLock<HashMap<String, BridgeServer>>>,
}

impl BridgeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a bridge for `device`, idempotently: an already-running bridge
    /// with the same config is left alone; a changed config restarts it.
    pub async fn ensure_running(
        &self,
        device: &str,
        config: &TransparentSpec,
    ) -> Result<ReconcileOutcome, ConvergeError> {
        if config.protocol == BridgeProtocol::Udp {
            return Err(ConvergeError::Unsupported(
                "udp transparent bridge is not implemented".to_string(),
            ));
        }

        {
            let servers = self.servers.read().await;
            if let Some(server) = servers.get(device) {
                if server.config == *config {
                    return Ok(ReconcileOutcome::Unchanged);
                }
            }
        }

        // Config changed or no bridge yet: tear down before rebinding so
        // the device is never owned twice.
        self.stop(device).await?;

        let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(serve(listener, device.to_string(), shutdown_rx));

        let mut servers = self.servers.write().await;
        servers.insert(
            device.to_string(),
            BridgeServer {
                config: config.clone(),
                local_addr,
                shutdown,
                task,
            },
        );
        info!("transparent bridge for {device} listening on {local_addr}");
        Ok(ReconcileOutcome::Applied)
    }

    /// Stop the bridge for `device` if one runs: signal shutdown, drain the
    /// serving task, release the device.
    pub async fn stop(&self, device: &str) -> Result<ReconcileOutcome, ConvergeError> {
        let server = self.servers.write().await.remove(device);
        let Some(server) = server else {
            return Ok(ReconcileOutcome::Unchanged);
        };
        let _ = server.shutdown.send(true);
        let _ = server.task.await;
        info!("transparent bridge for {device} stopped");
        Ok(ReconcileOutcome::Applied)
    }

    pub async fn is_running(&self, device: &str) -> bool {
        self.servers.read().await.contains_key(device)
    }

    /// Bound address of the bridge for `device`, if running.
    pub async fn local_addr(&self, device: &str) -> Option<SocketAddr> {
        self.servers.read().await.get(device).map(|s| s.local_addr)
    }
}

async fn serve(listener: TcpListener, device: String, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    info!("bridge {device}: connection from {peer}");
                    if let Err(e) = bridge_connection(stream, &device, &mut shutdown).await {
                        warn!("bridge {device}: connection error: {e}");
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                Err(e) => warn!("bridge {device}: accept error: {e}"),
            },
        }
    }
}

async fn bridge_connection(
    mut stream: TcpStream,
    device: &str,
    shutdown: &mut watch::Receiver<bool>,
) -> std::io::Result<()> {
    let mut port = tokio::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(device)
        .await?;
    tokio::select! {
        result = tokio::io::copy_bidirectional(&mut stream, &mut port) => {
            result.map(|_| ())
        }
        _ = shutdown.changed() => {
            let _ = stream.shutdown().await;
            Ok(())
        }
    }
}
