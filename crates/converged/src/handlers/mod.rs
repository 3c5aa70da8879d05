//! Resource handlers.
//!
//! One module per resource kind. Every handler follows the same
//! convergence protocol: read current state (a missing file is an empty
//! state), render the desired canonical form, compare, write atomically
//! only on difference, then reload the dependent service only if it is
//! already running.

pub mod dns;
pub mod firewall;
pub mod hosts;
pub mod network;
pub mod ntp;
pub mod serial;
pub mod system;
pub mod udev;

use crate::registry::HandlerRegistry;
use converge_common::spec::ResourceKind;
use std::sync::Arc;

/// Register every built-in handler. Registration order is priority order
/// within a kind.
pub fn register_all(registry: &mut HandlerRegistry) {
    registry.register(ResourceKind::Network, Arc::new(network::NetworkHandler::default()));
    registry.register(ResourceKind::Dns, Arc::new(dns::DnsHandler::default()));
    registry.register(ResourceKind::Hosts, Arc::new(hosts::HostsHandler::default()));
    registry.register(ResourceKind::Firewall, Arc::new(firewall::FirewallHandler::default()));
    registry.register(ResourceKind::Ntp, Arc::new(ntp::NtpHandler::default()));
    registry.register(ResourceKind::Udev, Arc::new(udev::UdevHandler::default()));
    registry.register(ResourceKind::System, Arc::new(system::SystemHandler::default()));
    for switcher in serial::mode_switch::all() {
        registry.register(ResourceKind::Serial, Arc::new(serial::SerialHandler::new(switcher)));
    }
}
