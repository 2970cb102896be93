//! nftables connector.
//!
//! Reads the ruleset through the tool's JSON listing. Each rule gets a
//! sequential display id (volatile, read-only) plus the native rule
//! handle from the listing; deletion is keyed on the handle via a
//! `"family:table:chain:handle"` id, never on the display number.

use regex::Regex;
use serde_json::Value;

use crate::exec::CommandRunner;
use crate::models::{
    ConnectorInfo, ConnectorKind, FirewallKind, FirewallRule, MutationOutcome, NftablesRuleSpec,
};

const BINARY: &str = "nft";

/// nftables status: the tables present in the ruleset.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NftablesStatus {
    pub tables: Vec<NftTable>,
    pub table_count: usize,
}

/// One nftables table.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NftTable {
    pub family: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<u64>,
}

/// One nftables chain.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NftChain {
    pub family: String,
    pub table: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
}

/// Connector for nftables.
pub struct NftablesConnector<R> {
    runner: R,
}

impl<R: CommandRunner> NftablesConnector<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    async fn run(&self, args: &[&str]) -> Option<crate::exec::CommandOutput> {
        let path = self.runner.lookup(BINARY)?;
        Some(self.runner.run(&path.to_string_lossy(), args, true).await)
    }

    pub async fn check_availability(&self) -> ConnectorInfo {
        let Some(output) = self.run(&["--version"]).await else {
            return ConnectorInfo::unavailable(
                "nftables",
                ConnectorKind::Firewall,
                "nft not found in PATH",
            );
        };

        if output.success() {
            let re = Regex::new(r"nftables v(\d+\.\d+(?:\.\d+)?)").unwrap();
            let version = re
                .captures(&output.stdout)
                .map(|c| c[1].to_string())
                .unwrap_or_else(|| "unknown".to_string());
            ConnectorInfo::available("nftables", ConnectorKind::Firewall, Some(version))
        } else {
            ConnectorInfo::error("nftables", ConnectorKind::Firewall, output.error_message())
        }
    }

    pub async fn status(&self) -> NftablesStatus {
        let Some(output) = self.run(&["-j", "list", "ruleset"]).await else {
            return NftablesStatus::default();
        };
        if !output.success() {
            return NftablesStatus::default();
        }

        let tables = collect_tagged(&output.stdout, "table")
            .into_iter()
            .filter_map(|table| {
                Some(NftTable {
                    family: table.get("family")?.as_str()?.to_string(),
                    name: table.get("name")?.as_str()?.to_string(),
                    handle: table.get("handle").and_then(Value::as_u64),
                })
            })
            .collect::<Vec<_>>();
        let table_count = tables.len();

        NftablesStatus {
            tables,
            table_count,
        }
    }

    /// List all rules in the ruleset.
    ///
    /// Display ids are sequential and volatile; the stable deletion key
    /// is the `handle` carried on each rule.
    pub async fn rules(&self) -> Vec<FirewallRule> {
        let Some(output) = self.run(&["-j", "list", "ruleset"]).await else {
            return Vec::new();
        };
        if !output.success() {
            return Vec::new();
        }
        parse_rules(&output.stdout)
    }

    /// List all tables.
    pub async fn tables(&self) -> Vec<NftTable> {
        let Some(output) = self.run(&["-j", "list", "tables"]).await else {
            return Vec::new();
        };
        if !output.success() {
            return Vec::new();
        }
        collect_tagged(&output.stdout, "table")
            .into_iter()
            .filter_map(|table| {
                Some(NftTable {
                    family: table.get("family")?.as_str()?.to_string(),
                    name: table.get("name")?.as_str()?.to_string(),
                    handle: table.get("handle").and_then(Value::as_u64),
                })
            })
            .collect()
    }

    /// List the chains of one table.
    pub async fn chains(&self, family: &str, table: &str) -> Vec<NftChain> {
        let Some(output) = self.run(&["-j", "list", "chains", family, table]).await else {
            return Vec::new();
        };
        if !output.success() {
            return Vec::new();
        }
        collect_tagged(&output.stdout, "chain")
            .into_iter()
            .filter_map(|chain| {
                Some(NftChain {
                    family: chain.get("family")?.as_str()?.to_string(),
                    table: chain.get("table")?.as_str()?.to_string(),
                    name: chain.get("name")?.as_str()?.to_string(),
                    handle: chain.get("handle").and_then(Value::as_u64),
                    hook: chain
                        .get("hook")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    policy: chain
                        .get("policy")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                })
            })
            .collect()
    }

    pub async fn add_rule(&self, spec: &NftablesRuleSpec) -> MutationOutcome {
        if spec.table.is_empty() || spec.chain.is_empty() || spec.rule.is_empty() {
            return MutationOutcome::failed("Missing required fields: table, chain, rule");
        }

        let family = if spec.family.is_empty() {
            "inet"
        } else {
            spec.family.as_str()
        };
        let command = match spec.position {
            Some(handle) => format!(
                "insert rule {family} {} {} position {handle} {}",
                spec.table, spec.chain, spec.rule
            ),
            None => format!(
                "add rule {family} {} {} {}",
                spec.table, spec.chain, spec.rule
            ),
        };

        match self.run(&[&command]).await {
            Some(output) if output.success() => MutationOutcome::ok("Rule added successfully"),
            Some(output) => MutationOutcome::failed(output.error_message()),
            None => MutationOutcome::failed("nft not found in PATH"),
        }
    }

    /// Delete a rule by `"family:table:chain:handle"` id.
    ///
    /// A bare sequential display id is rejected without invoking the
    /// tool: the display number is not a deletion key.
    pub async fn delete_rule(&self, rule_id: &str) -> bool {
        let parts: Vec<&str> = rule_id.split(':').collect();
        if parts.len() != 4 {
            return false;
        }
        let [family, table, chain, handle] = [parts[0], parts[1], parts[2], parts[3]];
        if family.is_empty()
            || table.is_empty()
            || chain.is_empty()
            || handle.parse::<u64>().is_err()
        {
            return false;
        }

        match self
            .run(&["delete", "rule", family, table, chain, "handle", handle])
            .await
        {
            Some(output) => output.success(),
            None => false,
        }
    }

    /// Start the nftables service.
    pub async fn enable(&self) -> bool {
        let Some(systemctl) = self.runner.lookup("systemctl") else {
            return false;
        };
        self.runner
            .run(
                &systemctl.to_string_lossy(),
                &["start", "nftables"],
                true,
            )
            .await
            .success()
    }

    /// Flush the entire ruleset. Destructive.
    pub async fn disable(&self) -> bool {
        match self.run(&["flush", "ruleset"]).await {
            Some(output) => output.success(),
            None => false,
        }
    }

    /// Create a table.
    pub async fn add_table(&self, family: &str, name: &str) -> MutationOutcome {
        match self.run(&["add", "table", family, name]).await {
            Some(output) if output.success() => {
                MutationOutcome::ok(format!("Table {name} created"))
            }
            Some(output) => MutationOutcome::failed(output.error_message()),
            None => MutationOutcome::failed("nft not found in PATH"),
        }
    }

    /// Create a chain. With type/hook/priority it becomes a base chain,
    /// otherwise a regular chain.
    pub async fn add_chain(
        &self,
        family: &str,
        table: &str,
        chain: &str,
        chain_type: Option<&str>,
        hook: Option<&str>,
        priority: Option<i32>,
        policy: Option<&str>,
    ) -> MutationOutcome {
        let command = match (chain_type, hook, priority) {
            (Some(chain_type), Some(hook), Some(priority)) => {
                let mut cmd = format!(
                    "add chain {family} {table} {chain} {{ type {chain_type} hook {hook} priority {priority};"
                );
                if let Some(policy) = policy {
                    cmd.push_str(&format!(" policy {policy};"));
                }
                cmd.push_str(" }");
                cmd
            }
            _ => format!("add chain {family} {table} {chain}"),
        };

        match self.run(&[&command]).await {
            Some(output) if output.success() => {
                MutationOutcome::ok(format!("Chain {chain} created"))
            }
            Some(output) => MutationOutcome::failed(output.error_message()),
            None => MutationOutcome::failed("nft not found in PATH"),
        }
    }
}

/// Collect the objects tagged with `key` from a `{"nftables": [...]}`
/// listing. Unparseable output degrades to empty.
fn collect_tagged(stdout: &str, key: &str) -> Vec<Value> {
    let Ok(ruleset) = serde_json::from_str::<Value>(stdout) else {
        return Vec::new();
    };
    ruleset
        .get("nftables")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get(key))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

fn parse_rules(stdout: &str) -> Vec<FirewallRule> {
    collect_tagged(stdout, "rule")
        .into_iter()
        .enumerate()
        .map(|(seq, rule)| {
            let mut out = FirewallRule::new(
                seq.to_string(),
                FirewallKind::Nftables,
                verdict(&rule).unwrap_or_else(|| "unknown".to_string()),
                rule.to_string(),
            );
            out.table = rule
                .get("table")
                .and_then(Value::as_str)
                .map(str::to_string);
            out.chain = rule
                .get("chain")
                .and_then(Value::as_str)
                .map(str::to_string);
            out.handle = rule.get("handle").and_then(Value::as_u64);
            out
        })
        .collect()
}

/// Extract the verdict from a rule's expression array, when one of the
/// standard statements is present.
fn verdict(rule: &Value) -> Option<String> {
    const VERDICTS: [&str; 5] = ["accept", "drop", "reject", "jump", "return"];

    let exprs = rule.get("expr")?.as_array()?;
    exprs.iter().find_map(|expr| {
        let obj = expr.as_object()?;
        VERDICTS
            .iter()
            .find(|v| obj.contains_key(**v))
            .map(|v| v.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::MockRunner;

    const RULESET: &str = r#"{"nftables": [
        {"metainfo": {"version": "1.0.2", "json_schema_version": 1}},
        {"table": {"family": "inet", "name": "filter", "handle": 1}},
        {"chain": {"family": "inet", "table": "filter", "name": "input", "handle": 1, "type": "filter", "hook": "input", "prio": 0, "policy": "accept"}},
        {"rule": {"family": "inet", "table": "filter", "chain": "input", "handle": 4, "expr": [{"match": {"op": "==", "left": {"payload": {"protocol": "tcp", "field": "dport"}}, "right": 22}}, {"accept": null}]}},
        {"rule": {"family": "inet", "table": "filter", "chain": "input", "handle": 7, "expr": [{"match": {"op": "==", "left": {"payload": {"protocol": "tcp", "field": "dport"}}, "right": 8080}}, {"drop": null}]}}
    ]}"#;

    #[test]
    fn test_parse_rules_sequential_ids_and_handles() {
        let rules = parse_rules(RULESET);
        assert_eq!(rules.len(), 2);

        assert_eq!(rules[0].id, "0");
        assert_eq!(rules[0].handle, Some(4));
        assert_eq!(rules[0].action, "accept");
        assert_eq!(rules[0].table.as_deref(), Some("filter"));
        assert_eq!(rules[0].chain.as_deref(), Some("input"));

        assert_eq!(rules[1].id, "1");
        assert_eq!(rules[1].handle, Some(7));
        assert_eq!(rules[1].action, "drop");
    }

    #[test]
    fn test_parse_rules_bad_json() {
        assert!(parse_rules("not json").is_empty());
        assert!(parse_rules("{}").is_empty());
    }

    #[tokio::test]
    async fn test_status_counts_tables() {
        let runner =
            MockRunner::new(&["nft"]).with_stdout("nft -j list ruleset", RULESET);
        let connector = NftablesConnector::new(runner);
        let status = connector.status().await;
        assert_eq!(status.table_count, 1);
        assert_eq!(status.tables[0].name, "filter");
        assert_eq!(status.tables[0].family, "inet");
    }

    #[tokio::test]
    async fn test_add_rule_command_string() {
        let runner = MockRunner::new(&["nft"])
            .with_stdout("nft add rule inet filter input tcp dport 22 accept", "");
        let connector = NftablesConnector::new(runner.clone());

        let spec = NftablesRuleSpec {
            family: String::new(),
            table: "filter".to_string(),
            chain: "input".to_string(),
            rule: "tcp dport 22 accept".to_string(),
            position: None,
        };
        let outcome = connector.add_rule(&spec).await;
        assert!(outcome.success);

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, "add rule inet filter input tcp dport 22 accept");
    }

    #[tokio::test]
    async fn test_add_rule_insert_at_position() {
        let runner = MockRunner::new(&["nft"]).with_stdout(
            "nft insert rule ip nat prerouting position 12 tcp dport 80 accept",
            "",
        );
        let connector = NftablesConnector::new(runner);

        let spec = NftablesRuleSpec {
            family: "ip".to_string(),
            table: "nat".to_string(),
            chain: "prerouting".to_string(),
            rule: "tcp dport 80 accept".to_string(),
            position: Some(12),
        };
        assert!(connector.add_rule(&spec).await.success);
    }

    #[tokio::test]
    async fn test_add_rule_missing_fields() {
        let runner = MockRunner::new(&["nft"]);
        let connector = NftablesConnector::new(runner.clone());
        let spec = NftablesRuleSpec {
            family: "inet".to_string(),
            table: String::new(),
            chain: "input".to_string(),
            rule: "accept".to_string(),
            position: None,
        };
        assert!(!connector.add_rule(&spec).await.success);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_requires_handle_id() {
        let runner = MockRunner::new(&["nft"])
            .with_stdout("nft delete rule inet filter input handle 7", "");
        let connector = NftablesConnector::new(runner.clone());

        assert!(connector.delete_rule("inet:filter:input:7").await);
        // Display ids are not deletion keys.
        assert!(!connector.delete_rule("1").await);
        assert!(!connector.delete_rule("inet:filter:input:x").await);
        assert_eq!(runner.calls().len(), 1);
    }
}
