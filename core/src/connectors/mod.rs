//! Tool connectors.
//!
//! One module per backend tool, plus [`FirewallConnector`], the closed
//! dispatch over the four firewall backends. The set of backends is
//! fixed; callers match on [`FirewallKind`] rather than a trait object
//! so every capability stays statically visible.

pub mod firewalld;
pub mod iptables;
pub mod network;
pub mod nftables;
pub mod scanner;
pub mod ufw;

pub use firewalld::{ActiveZone, FirewalldConnector, FirewalldStatus, ZoneInfo};
pub use iptables::{builtin_chains, ChainSummary, IptablesConnector, IptablesStatus, TABLES};
pub use network::{NetworkConnector, NetworkStatus};
pub use nftables::{NftChain, NftTable, NftablesConnector, NftablesStatus};
pub use scanner::{PortScannerConnector, ScannerStatus, COMMON_PORTS};
pub use ufw::{UfwConnector, UfwStatus};

use crate::exec::CommandRunner;
use crate::models::{
    ConnectorInfo, FirewallKind, FirewallRule, FirewallRuleSpec, MutationOutcome,
};

/// Uniform handle over the four firewall backends.
pub enum FirewallConnector<R> {
    Ufw(UfwConnector<R>),
    Iptables(IptablesConnector<R>),
    Nftables(NftablesConnector<R>),
    Firewalld(FirewalldConnector<R>),
}

impl<R: CommandRunner> FirewallConnector<R> {
    pub fn new(kind: FirewallKind, runner: R) -> Self {
        match kind {
            FirewallKind::Ufw => FirewallConnector::Ufw(UfwConnector::new(runner)),
            FirewallKind::Iptables => FirewallConnector::Iptables(IptablesConnector::new(runner)),
            FirewallKind::Nftables => FirewallConnector::Nftables(NftablesConnector::new(runner)),
            FirewallKind::Firewalld => {
                FirewallConnector::Firewalld(FirewalldConnector::new(runner))
            }
        }
    }

    pub fn kind(&self) -> FirewallKind {
        match self {
            FirewallConnector::Ufw(_) => FirewallKind::Ufw,
            FirewallConnector::Iptables(_) => FirewallKind::Iptables,
            FirewallConnector::Nftables(_) => FirewallKind::Nftables,
            FirewallConnector::Firewalld(_) => FirewallKind::Firewalld,
        }
    }

    pub async fn check_availability(&self) -> ConnectorInfo {
        match self {
            FirewallConnector::Ufw(c) => c.check_availability().await,
            FirewallConnector::Iptables(c) => c.check_availability().await,
            FirewallConnector::Nftables(c) => c.check_availability().await,
            FirewallConnector::Firewalld(c) => c.check_availability().await,
        }
    }

    /// Backend status as JSON; the shape is backend-specific.
    pub async fn status(&self) -> serde_json::Value {
        match self {
            FirewallConnector::Ufw(c) => to_json(&c.status().await),
            FirewallConnector::Iptables(c) => to_json(&c.status().await),
            FirewallConnector::Nftables(c) => to_json(&c.status().await),
            FirewallConnector::Firewalld(c) => to_json(&c.status().await),
        }
    }

    /// The backend's full rule listing. For iptables this aggregates
    /// every table.
    pub async fn rules(&self) -> Vec<FirewallRule> {
        match self {
            FirewallConnector::Ufw(c) => c.rules().await,
            FirewallConnector::Iptables(c) => {
                let mut rules = Vec::new();
                for table in TABLES {
                    rules.extend(c.rules(table).await);
                }
                rules
            }
            FirewallConnector::Nftables(c) => c.rules().await,
            FirewallConnector::Firewalld(c) => c.rules().await,
        }
    }

    /// Add a rule. A spec variant for a different backend yields a
    /// failed outcome without invoking any tool.
    pub async fn add_rule(&self, spec: &FirewallRuleSpec) -> MutationOutcome {
        match (self, spec) {
            (FirewallConnector::Ufw(c), FirewallRuleSpec::Ufw(spec)) => c.add_rule(spec).await,
            (FirewallConnector::Iptables(c), FirewallRuleSpec::Iptables(spec)) => {
                c.add_rule(spec).await
            }
            (FirewallConnector::Nftables(c), FirewallRuleSpec::Nftables(spec)) => {
                c.add_rule(spec).await
            }
            (FirewallConnector::Firewalld(c), FirewallRuleSpec::Firewalld(spec)) => {
                c.add_rule(spec).await
            }
            _ => MutationOutcome::failed(format!(
                "rule spec does not match backend {}",
                self.kind()
            )),
        }
    }

    /// Delete a rule by its backend-specific id.
    pub async fn delete_rule(&self, rule_id: &str) -> bool {
        match self {
            FirewallConnector::Ufw(c) => c.delete_rule(rule_id).await,
            FirewallConnector::Iptables(c) => c.delete_rule(rule_id).await,
            FirewallConnector::Nftables(c) => c.delete_rule(rule_id).await,
            FirewallConnector::Firewalld(c) => c.delete_rule(rule_id).await,
        }
    }

    pub async fn enable(&self) -> bool {
        match self {
            FirewallConnector::Ufw(c) => c.enable().await,
            FirewallConnector::Iptables(c) => c.enable().await,
            FirewallConnector::Nftables(c) => c.enable().await,
            FirewallConnector::Firewalld(c) => c.enable().await,
        }
    }

    pub async fn disable(&self) -> bool {
        match self {
            FirewallConnector::Ufw(c) => c.disable().await,
            FirewallConnector::Iptables(c) => c.disable().await,
            FirewallConnector::Nftables(c) => c.disable().await,
            FirewallConnector::Firewalld(c) => c.disable().await,
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::MockRunner;
    use crate::models::UfwRuleSpec;

    #[tokio::test]
    async fn test_mismatched_spec_never_runs_a_command() {
        let runner = MockRunner::new(&["iptables"]);
        let connector = FirewallConnector::new(FirewallKind::Iptables, runner.clone());

        let spec = FirewallRuleSpec::Ufw(UfwRuleSpec {
            action: "deny".to_string(),
            port: Some("22".to_string()),
            ..UfwRuleSpec::default()
        });
        let outcome = connector.add_rule(&spec).await;

        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("iptables"));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_kind_roundtrip() {
        for kind in [
            FirewallKind::Ufw,
            FirewallKind::Iptables,
            FirewallKind::Nftables,
            FirewallKind::Firewalld,
        ] {
            let connector = FirewallConnector::new(kind, MockRunner::new(&[]));
            assert_eq!(connector.kind(), kind);
        }
    }
}
