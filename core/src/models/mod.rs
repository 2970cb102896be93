//! Common data model shared by all connectors.
//!
//! Every entity here is constructed fresh per call from live tool
//! output; nothing is persisted or cached by this crate.

mod connector;
mod firewall;
mod network;
mod ports;

pub use connector::{ConnectorInfo, ConnectorKind, ConnectorStatus};
pub use firewall::{
    FirewallKind, FirewallRule, FirewallRuleSpec, FirewalldRuleKind, FirewalldRuleSpec,
    IptablesRuleSpec, MutationOutcome, NftablesRuleSpec, UfwRuleSpec,
};
pub use network::{
    InterfaceAddress, LinkCounters, LinkStats, NeighborEntry, NetworkInterface, PolicyRule,
    PolicyRuleSpec, Route, RouteSpec,
};
pub use ports::{ListeningPort, ScanReport, ScanResult, ScanState, ScannedPort};
