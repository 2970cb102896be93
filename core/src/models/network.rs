//! Network interface, routing and neighbor-table models.

use serde::{Deserialize, Serialize};

/// One address bound to an interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceAddress {
    pub address: String,
    pub prefix: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broadcast: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// A network interface with its addresses split by family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterface {
    pub name: String,
    pub index: u32,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_type: Option<String>,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub ipv4: Vec<InterfaceAddress>,
    #[serde(default)]
    pub ipv6: Vec<InterfaceAddress>,
}

/// One route from a routing table.
///
/// The id is derived from (destination, device, table) and is not
/// guaranteed unique if two routes share all three.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    pub destination: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    pub table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefsrc: Option<String>,
    pub route_type: String,
    #[serde(default)]
    pub flags: Vec<String>,
}

/// Specification for adding or deleting a route.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteSpec {
    /// Destination network, e.g. "10.0.0.0/8" or "default".
    pub destination: String,
    #[serde(default)]
    pub gateway: Option<String>,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub metric: Option<u32>,
    /// Omitted from the command when equal to the implicit "main".
    #[serde(default)]
    pub table: Option<String>,
    /// Explicit route type (blackhole, unreachable, ...), inserted
    /// right after the add/del verb.
    #[serde(default)]
    pub route_type: Option<String>,
}

/// One policy routing rule (`ip rule`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Stringified priority.
    pub id: String,
    pub priority: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dst: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fwmark: Option<String>,
    pub action: String,
}

/// Specification for adding or deleting a policy routing rule. Only
/// present fields emit their flag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyRuleSpec {
    #[serde(default)]
    pub priority: Option<u32>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub fwmark: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
}

/// One neighbor (ARP) table entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborEntry {
    pub ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default)]
    pub state: Vec<String>,
}

/// Per-direction link counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkCounters {
    #[serde(default)]
    pub bytes: u64,
    #[serde(default)]
    pub packets: u64,
    #[serde(default)]
    pub errors: u64,
    #[serde(default)]
    pub dropped: u64,
}

/// Interface statistics; populated from the tool's 64-bit counters when
/// present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStats {
    pub rx: LinkCounters,
    pub tx: LinkCounters,
}
