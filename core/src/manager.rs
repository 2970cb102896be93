//! Connector registry and orchestration.
//!
//! [`ConnectorManager`] hands out connectors that share one runner,
//! probes availability across all of them, and hosts the compound
//! operations that span more than one backend command.

use serde::{Deserialize, Serialize};

use crate::connectors::{
    FirewallConnector, IptablesConnector, NetworkConnector, PortScannerConnector, UfwConnector,
};
use crate::exec::{CommandRunner, SystemRunner};
use crate::models::{
    ConnectorInfo, FirewallKind, IptablesRuleSpec, MutationOutcome, UfwRuleSpec,
};
use crate::topology::{build_topology, TopologyGraph};

/// Backend preference for operations that pick a firewall themselves.
/// Higher-level frontends first, raw iptables last.
pub const FIREWALL_PREFERENCE: [FirewallKind; 4] = [
    FirewallKind::Ufw,
    FirewallKind::Firewalld,
    FirewallKind::Nftables,
    FirewallKind::Iptables,
];

/// Per-target result of a compound block operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRuleResult {
    /// The chain (or frontend) the rule was aimed at.
    pub chain: String,
    pub outcome: MutationOutcome,
}

/// Result of [`ConnectorManager::block_port`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPortOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<FirewallKind>,
    pub success: bool,
    pub results: Vec<BlockRuleResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Registry of all connectors, sharing one command runner.
pub struct ConnectorManager<R> {
    runner: R,
}

impl ConnectorManager<SystemRunner> {
    pub fn new() -> Self {
        Self::with_runner(SystemRunner::new())
    }
}

impl Default for ConnectorManager<SystemRunner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: CommandRunner + Clone> ConnectorManager<R> {
    pub fn with_runner(runner: R) -> Self {
        Self { runner }
    }

    pub fn firewall(&self, kind: FirewallKind) -> FirewallConnector<R> {
        FirewallConnector::new(kind, self.runner.clone())
    }

    pub fn network(&self) -> NetworkConnector<R> {
        NetworkConnector::new(self.runner.clone())
    }

    pub fn scanner(&self) -> PortScannerConnector<R> {
        PortScannerConnector::new(self.runner.clone())
    }

    /// Probe every connector. Probes never fail; a broken tool shows up
    /// as an error status in its entry.
    pub async fn check_all_availability(&self) -> Vec<ConnectorInfo> {
        let mut infos = Vec::with_capacity(6);
        for kind in FIREWALL_PREFERENCE {
            infos.push(self.firewall(kind).check_availability().await);
        }
        infos.push(self.network().check_availability().await);
        infos.push(self.scanner().check_availability().await);
        infos
    }

    /// The firewall backends whose tools are installed and responding,
    /// in preference order.
    pub async fn available_firewalls(&self) -> Vec<FirewallKind> {
        let mut kinds = Vec::new();
        for kind in FIREWALL_PREFERENCE {
            if self.firewall(kind).check_availability().await.is_available() {
                kinds.push(kind);
            }
        }
        kinds
    }

    /// The most preferred available firewall backend.
    pub async fn preferred_firewall(&self) -> Option<FirewallKind> {
        for kind in FIREWALL_PREFERENCE {
            if self.firewall(kind).check_availability().await.is_available() {
                return Some(kind);
            }
        }
        None
    }

    /// Block inbound traffic to a port.
    ///
    /// With iptables present, inserts a DROP at position 1 of both the
    /// INPUT chain and the DOCKER-USER chain, since published container
    /// ports bypass INPUT. The operation succeeds when either insert
    /// lands; both results are itemized. Without iptables it falls back
    /// to a single ufw deny rule.
    pub async fn block_port(
        &self,
        port: u16,
        protocol: &str,
        interface: Option<&str>,
    ) -> BlockPortOutcome {
        let protocol = if protocol.is_empty() { "tcp" } else { protocol };
        let interface = interface.filter(|i| !i.is_empty() && *i != "all");

        let iptables = IptablesConnector::new(self.runner.clone());
        if iptables.check_availability().await.is_available() {
            tracing::info!(port, protocol, "blocking port via iptables");

            let mut results = Vec::new();
            for chain in ["INPUT", "DOCKER-USER"] {
                let spec = IptablesRuleSpec {
                    table: "filter".to_string(),
                    chain: chain.to_string(),
                    target: "DROP".to_string(),
                    protocol: Some(protocol.to_string()),
                    dport: Some(port.to_string()),
                    in_interface: interface.map(str::to_string),
                    position: Some(1),
                    ..IptablesRuleSpec::default()
                };
                results.push(BlockRuleResult {
                    chain: chain.to_string(),
                    outcome: iptables.add_rule(&spec).await,
                });
            }

            // DOCKER-USER is absent on hosts without Docker; one landed
            // insert is enough.
            let success = results.iter().any(|r| r.outcome.success);
            return BlockPortOutcome {
                backend: Some(FirewallKind::Iptables),
                success,
                results,
                message: None,
            };
        }

        let ufw = UfwConnector::new(self.runner.clone());
        if ufw.check_availability().await.is_available() {
            tracing::info!(port, protocol, "blocking port via ufw");
            let spec = UfwRuleSpec {
                action: "deny".to_string(),
                interface: interface.map(str::to_string),
                port: Some(port.to_string()),
                protocol: Some(protocol.to_string()),
                comment: Some(format!("block port {port}")),
                ..UfwRuleSpec::default()
            };
            let outcome = ufw.add_rule(&spec).await;
            let success = outcome.success;
            return BlockPortOutcome {
                backend: Some(FirewallKind::Ufw),
                success,
                results: vec![BlockRuleResult {
                    chain: "ufw".to_string(),
                    outcome,
                }],
                message: None,
            };
        }

        BlockPortOutcome {
            backend: None,
            success: false,
            results: Vec::new(),
            message: Some("no firewall backend available".to_string()),
        }
    }

    /// Build the topology graph from the live network view.
    pub async fn topology(&self) -> TopologyGraph {
        let network = self.network();
        let interfaces = network.interfaces().await;
        let routes = network.all_routes().await;
        build_topology(&interfaces, &routes)
    }
}
