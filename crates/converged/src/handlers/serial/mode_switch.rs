//! Hardware mode-switch seam.
//!
//! Carrier boards differ in how the RS232/RS485 transceiver is selected;
//! most strap it in hardware, so the current variants have nothing to do at
//! runtime. Each variant is registered as its own serial-handler candidate
//! and selected by capability match.

use async_trait::async_trait;
use converge_common::host::HostInfo;
use converge_common::spec::SerialMode;
use converge_common::ConvergeError;
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait ModeSwitcher: Send + Sync {
    fn name(&self) -> &'static str;

    fn matches(&self, host: &HostInfo) -> bool;

    async fn switch(&self, device: &str, mode: SerialMode) -> Result<(), ConvergeError>;
}

/// Every known mode-switch variant, in registration priority order.
pub fn all() -> Vec<Arc<dyn ModeSwitcher>> {
    vec![
        Arc::new(OrionAModeSwitch),
        Arc::new(OrionBModeSwitch),
        Arc::new(CometBModeSwitch),
    ]
}

pub struct OrionAModeSwitch;

#[async_trait]
impl ModeSwitcher for OrionAModeSwitch {
    fn name(&self) -> &'static str {
        "orion-a"
    }

    fn matches(&self, host: &HostInfo) -> bool {
        host.kernel_name == "Linux"
    }

    async fn switch(&self, device: &str, mode: SerialMode) -> Result<(), ConvergeError> {
        // Transceiver selection is strapped in hardware on this board.
        debug!("orion-a: mode {:?} requested for {device}, nothing to signal", mode);
        Ok(())
    }
}

pub struct OrionBModeSwitch;

#[async_trait]
impl ModeSwitcher for OrionBModeSwitch {
    fn name(&self) -> &'static str {
        "orion-b"
    }

    fn matches(&self, host: &HostInfo) -> bool {
        host.kernel_name == "Linux"
    }

    async fn switch(&self, device: &str, mode: SerialMode) -> Result<(), ConvergeError> {
        debug!("orion-b: mode {:?} requested for {device}, nothing to signal", mode);
        Ok(())
    }
}

pub struct CometBModeSwitch;

#[async_trait]
impl ModeSwitcher for CometBModeSwitch {
    fn name(&self) -> &'static str {
        "comet-b"
    }

    fn matches(&self, host: &HostInfo) -> bool {
        host.kernel_name == "Linux"
    }

    async fn switch(&self, device: &str, mode: SerialMode) -> Result<(), ConvergeError> {
        debug!("comet-b: mode {:?} requested for {device}, nothing to signal", mode);
        Ok(())
    }
}
