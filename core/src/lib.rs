//! fwbridge-core: connectors over the host's firewall, routing and
//! port-discovery tools.
//!
//! Every connector shells out to the system tool it fronts (ufw,
//! iptables, nft, firewall-cmd, ip, ss, nmap), parses its output into
//! the shared data model and exposes a typed capability surface. State
//! lives in the tools; this crate reads it fresh on every call.
//!
//! [`ConnectorManager`] is the entry point: it probes which tools are
//! installed, hands out connectors bound to a shared
//! [`CommandRunner`], and hosts the compound operations.

pub mod connectors;
pub mod error;
pub mod exec;
pub mod manager;
pub mod models;
pub mod topology;

pub use connectors::FirewallConnector;
pub use error::{Error, Result};
pub use exec::{CommandOutput, CommandRunner, SystemRunner};
pub use manager::{BlockPortOutcome, BlockRuleResult, ConnectorManager, FIREWALL_PREFERENCE};
pub use models::{
    ConnectorInfo, ConnectorKind, ConnectorStatus, FirewallKind, FirewallRule, FirewallRuleSpec,
    ListeningPort, MutationOutcome, ScanResult, ScanState,
};
pub use topology::{build_topology, TopologyGraph};
