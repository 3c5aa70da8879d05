//! Serial port reconciliation.
//!
//! Per port: line discipline via stty, the hardware mode-switch seam,
//! RS485 line-driver configuration, and the transparent TCP bridge.

pub mod bridge;
pub mod mode_switch;
pub mod rs485;

use crate::registry::ResourceHandler;
use async_trait::async_trait;
use bridge::BridgeRegistry;
use converge_common::exec::CommandRunner;
use converge_common::host::HostInfo;
use converge_common::spec::{
    Parity, ReconcileOutcome, ResourceKind, ResourceSpec, SerialMode, SerialPortSpec,
};
use converge_common::ConvergeError;
use mode_switch::ModeSwitcher;
use std::sync::Arc;

pub struct SerialHandler {
    mode_switch: Arc<dyn ModeSwitcher>,
    bridges: BridgeRegistry,
    runner: CommandRunner,
}

impl SerialHandler {
    pub fn new(mode_switch: Arc<dyn ModeSwitcher>) -> Self {
        Self {
            mode_switch,
            bridges: BridgeRegistry::new(),
            runner: CommandRunner::default(),
        }
    }

    /// Baud rate, character size, parity and stop bits via stty.
    async fn configure_line(&self, port: &SerialPortSpec) -> Result<(), ConvergeError> {
        let baud = port.baud_rate.to_string();
        let char_size = format!("cs{}", port.data_bits);
        let mut args = vec!["-F", port.device.as_str(), baud.as_str(), char_size.as_str()];
        match port.parity {
            Parity::None => args.push("-parenb"),
            Parity::Even => args.extend(["parenb", "-parodd"]),
            Parity::Odd => args.extend(["parenb", "parodd"]),
        }
        args.push(if port.stop_bits == 2 { "cstopb" } else { "-cstopb" });

        self.runner.run_checked("stty", &args).await?;
        Ok(())
    }

    async fn configure_mode(&self, port: &SerialPortSpec) -> Result<(), ConvergeError> {
        let Some(mode) = port.mode else {
            return Ok(());
        };
        self.mode_switch.switch(&port.device, mode).await?;
        if mode == SerialMode::Rs485 {
            rs485::configure(&self.runner, port).await?;
        }
        Ok(())
    }

    async fn configure_bridge(&self, port: &SerialPortSpec) -> Result<ReconcileOutcome, ConvergeError> {
        match &port.transparent {
            Some(transparent) if transparent.enabled => {
                self.bridges.ensure_running(&port.device, transparent).await
            }
            _ => self.bridges.stop(&port.device).await,
        }
    }
}

#[async_trait]
impl ResourceHandler for SerialHandler {
    fn name(&self) -> &'static str {
        "serial-linux"
    }

    fn matches(&self, host: &HostInfo) -> bool {
        host.kernel_name == "Linux" && self.mode_switch.matches(host)
    }

    async fn reconcile(&self, spec: &ResourceSpec) -> Result<ReconcileOutcome, ConvergeError> {
        let ResourceSpec::Serial(spec) = spec else {
            return Err(ConvergeError::KindMismatch { expected: ResourceKind::Serial });
        };

        let mut outcome = ReconcileOutcome::Unchanged;
        for port in &spec.ports {
            self.configure_line(port)
                .await
                .map_err(|e| e.context(format!("serial port {}", port.device)))?;
            self.configure_mode(port)
                .await
                .map_err(|e| e.context(format!("serial port {}", port.device)))?;
            self.configure_bridge(port)
                .await
                .map_err(|e| e.context(format!("serial port {}", port.device)))?;
            // stty runs unconditionally, so the port counts as applied.
            outcome = ReconcileOutcome::Applied;
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linux_host() -> HostInfo {
        HostInfo {
            distribution_id: "debian".to_string(),
            distribution_version: "12".to_string(),
            kernel_name: "Linux".to_string(),
            kernel_version: "6.1.0".to_string(),
        }
    }

    #[test]
    fn matches_follows_mode_switcher() {
        for switcher in mode_switch::all() {
            let handler = SerialHandler::new(switcher);
            assert!(handler.matches(&linux_host()));
        }
        let handler = SerialHandler::new(mode_switch::all().remove(0));
        let other = HostInfo {
            kernel_name: "FreeBSD".to_string(),
            ..linux_host()
        };
        assert!(!handler.matches(&other));
    }
}
