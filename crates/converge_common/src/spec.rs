//! Typed desired-state model.
//!
//! The configuration source decodes into these types once per pass; handlers
//! receive the strongly-typed variant for their kind instead of re-decoding
//! an untyped document. Field names on the wire are camelCase.

use crate::error::ConvergeError;
use crate::host::NodeSelector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// The closed set of manageable resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Network,
    Dns,
    Hosts,
    Firewall,
    Ntp,
    Udev,
    Serial,
    System,
}

impl ResourceKind {
    /// Every kind the controller requires a handler for.
    pub const ALL: [ResourceKind; 8] = [
        ResourceKind::Network,
        ResourceKind::Dns,
        ResourceKind::Hosts,
        ResourceKind::Firewall,
        ResourceKind::Ntp,
        ResourceKind::Udev,
        ResourceKind::Serial,
        ResourceKind::System,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Dns => "dns",
            Self::Hosts => "hosts",
            Self::Firewall => "firewall",
            Self::Ntp => "ntp",
            Self::Udev => "udev",
            Self::Serial => "serial",
            Self::System => "system",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = ConvergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "network" => Ok(Self::Network),
            "dns" => Ok(Self::Dns),
            "hosts" => Ok(Self::Hosts),
            "firewall" => Ok(Self::Firewall),
            "ntp" => Ok(Self::Ntp),
            "udev" => Ok(Self::Udev),
            "serial" => Ok(Self::Serial),
            "system" => Ok(Self::System),
            other => Err(ConvergeError::Unsupported(format!(
                "unknown resource kind `{other}`"
            ))),
        }
    }
}

/// One strongly-typed spec per resource kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceSpec {
    Network(NetworkSpec),
    Dns(DnsSpec),
    Hosts(HostsSpec),
    Firewall(FirewallSpec),
    Ntp(NtpSpec),
    Udev(UdevSpec),
    Serial(SerialSpec),
    System(SystemSpec),
}

impl ResourceSpec {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Network(_) => ResourceKind::Network,
            Self::Dns(_) => ResourceKind::Dns,
            Self::Hosts(_) => ResourceKind::Hosts,
            Self::Firewall(_) => ResourceKind::Firewall,
            Self::Ntp(_) => ResourceKind::Ntp,
            Self::Udev(_) => ResourceKind::Udev,
            Self::Serial(_) => ResourceKind::Serial,
            Self::System(_) => ResourceKind::System,
        }
    }

    /// Decode an untyped spec tree (directory mode) into the typed variant
    /// for `kind`.
    pub fn decode(kind: ResourceKind, value: serde_yaml::Value) -> Result<Self, ConvergeError> {
        Ok(match kind {
            ResourceKind::Network => Self::Network(serde_yaml::from_value(value)?),
            ResourceKind::Dns => Self::Dns(serde_yaml::from_value(value)?),
            ResourceKind::Hosts => Self::Hosts(serde_yaml::from_value(value)?),
            ResourceKind::Firewall => Self::Firewall(serde_yaml::from_value(value)?),
            ResourceKind::Ntp => Self::Ntp(serde_yaml::from_value(value)?),
            ResourceKind::Udev => Self::Udev(serde_yaml::from_value(value)?),
            ResourceKind::Serial => Self::Serial(serde_yaml::from_value(value)?),
            ResourceKind::System => Self::System(serde_yaml::from_value(value)?),
        })
    }
}

/// Single-file configuration source: one nested tree with optional
/// per-kind sections.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DesiredStateDocument {
    pub network: Option<NetworkSpec>,
    pub dns: Option<DnsSpec>,
    pub hosts: Option<HostsSpec>,
    pub firewall: Option<FirewallSpec>,
    pub ntp: Option<NtpSpec>,
    pub udev: Option<UdevSpec>,
    pub serial: Option<SerialSpec>,
    pub system: Option<SystemSpec>,
}

impl DesiredStateDocument {
    /// The sections present in the document, in reconciliation order.
    pub fn into_specs(self) -> Vec<ResourceSpec> {
        let mut specs = Vec::new();
        if let Some(s) = self.network {
            specs.push(ResourceSpec::Network(s));
        }
        if let Some(s) = self.dns {
            specs.push(ResourceSpec::Dns(s));
        }
        if let Some(s) = self.hosts {
            specs.push(ResourceSpec::Hosts(s));
        }
        if let Some(s) = self.firewall {
            specs.push(ResourceSpec::Firewall(s));
        }
        if let Some(s) = self.ntp {
            specs.push(ResourceSpec::Ntp(s));
        }
        if let Some(s) = self.udev {
            specs.push(ResourceSpec::Udev(s));
        }
        if let Some(s) = self.serial {
            specs.push(ResourceSpec::Serial(s));
        }
        if let Some(s) = self.system {
            specs.push(ResourceSpec::System(s));
        }
        specs
    }
}

/// Directory-mode configuration source: one resource kind per document,
/// discriminated by the top-level `kind` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDocument {
    pub kind: ResourceKind,
    #[serde(default)]
    pub spec: serde_yaml::Value,
}

impl ResourceDocument {
    pub fn into_spec(self) -> Result<ResourceSpec, ConvergeError> {
        ResourceSpec::decode(self.kind, self.spec)
    }
}

/// Parse a desired-state document, choosing the decoder by file extension.
pub fn parse_desired_state(path: &Path, content: &str) -> Result<DesiredStateDocument, ConvergeError> {
    if has_json_extension(path) {
        Ok(serde_json::from_str(content)?)
    } else {
        Ok(serde_yaml::from_str(content)?)
    }
}

/// Parse a directory-mode resource document, choosing the decoder by file
/// extension.
pub fn parse_resource_document(path: &Path, content: &str) -> Result<ResourceDocument, ConvergeError> {
    if has_json_extension(path) {
        Ok(serde_json::from_str(content)?)
    } else {
        Ok(serde_yaml::from_str(content)?)
    }
}

fn has_json_extension(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("json")
}

// ---------------------------------------------------------------------------
// Network

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkSpec {
    pub interfaces: Vec<NetworkInterfaceSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkInterfaceSpec {
    pub node_selector: NodeSelector,
    pub name: String,
    /// IPv4 address in CIDR notation.
    pub ip_address: Option<String>,
    /// IPv6 address in CIDR notation.
    pub ipv6_address: Option<String>,
    pub gateway: Option<String>,
    pub ipv6_gateway: Option<String>,
    pub mtu: Option<u32>,
    pub mac_address: Option<String>,
    pub nameservers: Vec<String>,
}

// ---------------------------------------------------------------------------
// DNS / hosts

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DnsSpec {
    pub nameservers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostsSpec {
    pub entries: Vec<HostEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostEntry {
    pub ip: String,
    pub hostnames: Vec<String>,
}

// ---------------------------------------------------------------------------
// Firewall

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FirewallSpec {
    pub rules: Vec<FirewallRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallRule {
    pub protocol: String,
    pub port: u16,
    pub action: String,
}

// ---------------------------------------------------------------------------
// NTP / system

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NtpSpec {
    pub enabled: bool,
    pub servers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemSpec {
    pub timezone: String,
}

// ---------------------------------------------------------------------------
// Udev

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UdevSpec {
    pub rules: Vec<UdevRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UdevRule {
    pub name: String,
    pub subsystem: String,
    /// Ordered so rendering is deterministic.
    pub attrs: BTreeMap<String, String>,
    pub symlink: String,
}

// ---------------------------------------------------------------------------
// Serial

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SerialSpec {
    pub ports: Vec<SerialPortSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerialPortSpec {
    pub device: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default)]
    pub mode: Option<SerialMode>,
    #[serde(default)]
    pub rs485: Option<Rs485Spec>,
    #[serde(default)]
    pub transparent: Option<TransparentSpec>,
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialMode {
    Rs232,
    Rs485,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Rs485Spec {
    pub enabled: bool,
    pub rts_on_send: bool,
    pub rts_after_send: bool,
    pub rx_during_tx: bool,
    /// RTS delay before sending, in microseconds.
    pub delay_rts_before_send_us: u32,
    /// RTS delay after sending, in microseconds.
    pub delay_rts_after_send_us: u32,
}

impl Rs485Spec {
    /// Configuration applied when mode is rs485 but no explicit sub-config
    /// was given: driver enabled, RTS asserted while sending.
    pub fn driver_default() -> Self {
        Self {
            enabled: true,
            rts_on_send: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransparentSpec {
    pub enabled: bool,
    pub protocol: BridgeProtocol,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeProtocol {
    #[default]
    Tcp,
    Udp,
}

/// Per-resource result of one reconciliation. Never persisted, only logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Current state already matched, nothing was written or reloaded.
    Unchanged,
    /// State was rewritten and any dependent service reloaded.
    Applied,
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::Applied => "applied",
        }
    }

    /// Combine results from several sub-steps: any applied step makes the
    /// whole resource applied.
    pub fn merge(self, other: ReconcileOutcome) -> ReconcileOutcome {
        if self == Self::Applied || other == Self::Applied {
            Self::Applied
        } else {
            Self::Unchanged
        }
    }
}
