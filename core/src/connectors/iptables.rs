//! iptables connector.
//!
//! Works against the fixed table set {filter, nat, mangle, raw,
//! security}. Rules are read from the numbered listing and identified
//! as `"table:chain:num"`. iptables has no global toggle: `enable` is a
//! no-op and `disable` flushes every table, which is destructive and
//! irreversible without a prior `iptables-save`.

use std::collections::BTreeMap;

use regex::Regex;

use crate::exec::CommandRunner;
use crate::models::{
    ConnectorInfo, ConnectorKind, FirewallKind, FirewallRule, IptablesRuleSpec, MutationOutcome,
};

const BINARY: &str = "iptables";

/// The fixed iptables table set.
pub const TABLES: [&str; 5] = ["filter", "nat", "mangle", "raw", "security"];

/// Built-in chains per table.
pub fn builtin_chains(table: &str) -> &'static [&'static str] {
    match table {
        "filter" => &["INPUT", "FORWARD", "OUTPUT"],
        "nat" => &["PREROUTING", "INPUT", "OUTPUT", "POSTROUTING"],
        "mangle" => &["PREROUTING", "INPUT", "FORWARD", "OUTPUT", "POSTROUTING"],
        "raw" => &["PREROUTING", "OUTPUT"],
        "security" => &["INPUT", "FORWARD", "OUTPUT"],
        _ => &[],
    }
}

/// Chain summary from the listing.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChainSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
    pub rule_count: usize,
}

/// Per-table status: chains and their rule counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct IptablesStatus {
    pub tables: BTreeMap<String, BTreeMap<String, ChainSummary>>,
}

/// Connector for iptables.
pub struct IptablesConnector<R> {
    runner: R,
}

impl<R: CommandRunner> IptablesConnector<R> {
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
                BINARY,
                ConnectorKind::Firewall,
                "iptables not found in PATH",
            );
        };

        if output.success() {
            let re = Regex::new(r"v(\d+\.\d+\.\d+)").unwrap();
            let version = re
                .captures(&output.stdout)
                .map(|c| c[1].to_string())
                .unwrap_or_else(|| "unknown".to_string());
            ConnectorInfo::available(BINARY, ConnectorKind::Firewall, Some(version))
        } else {
            ConnectorInfo::error(BINARY, ConnectorKind::Firewall, output.error_message())
        }
    }

    pub async fn status(&self) -> IptablesStatus {
        let mut status = IptablesStatus::default();

        for table in TABLES {
            let Some(output) = self.run(&["-t", table, "-L", "-n", "--line-numbers"]).await
            else {
                continue;
            };
            if !output.success() {
                continue;
            }
            let chains = parse_chains(&output.stdout);
            let summary = chains
                .into_iter()
                .map(|(name, chain)| {
                    (
                        name,
                        ChainSummary {
                            policy: chain.policy,
                            rule_count: chain.rules.len(),
                        },
                    )
                })
                .collect();
            status.tables.insert(table.to_string(), summary);
        }

        status
    }

    /// List the rules of one table across all of its chains.
    pub async fn rules(&self, table: &str) -> Vec<FirewallRule> {
        let Some(output) = self.run(&["-t", table, "-L", "-n", "--line-numbers"]).await else {
            return Vec::new();
        };
        if !output.success() {
            return Vec::new();
        }

        let mut rules = Vec::new();
        for (chain_name, chain) in parse_chains(&output.stdout) {
            for parsed in chain.rules {
                let mut rule = FirewallRule::new(
                    format!("{table}:{chain_name}:{}", parsed.num),
                    FirewallKind::Iptables,
                    parsed.target,
                    parsed.raw,
                );
                rule.table = Some(table.to_string());
                rule.chain = Some(chain_name.clone());
                rule.protocol = (parsed.protocol != "all").then_some(parsed.protocol);
                rule.source = Some(parsed.source);
                rule.destination = Some(parsed.destination);
                rule.port = parsed.dport;
                rules.push(rule);
            }
        }

        rules
    }

    pub async fn add_rule(&self, spec: &IptablesRuleSpec) -> MutationOutcome {
        let args = build_add_args(spec);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();

        match self.run(&arg_refs).await {
            Some(output) if output.success() => MutationOutcome::ok("Rule added successfully"),
            Some(output) => MutationOutcome::failed(output.error_message()),
            None => MutationOutcome::failed("iptables not found in PATH"),
        }
    }

    /// Delete a rule by `"table:chain:num"` id. Malformed ids fail
    /// before any command is invoked.
    pub async fn delete_rule(&self, rule_id: &str) -> bool {
        let Some((table, chain, num)) = split_rule_id(rule_id) else {
            return false;
        };
        match self.run(&["-t", table, "-D", chain, num]).await {
            Some(output) => output.success(),
            None => false,
        }
    }

    /// iptables has no global toggle; enabling is a no-op.
    pub async fn enable(&self) -> bool {
        true
    }

    /// Flush every table. Destructive: all rules are gone and cannot be
    /// restored without a prior `iptables-save`.
    pub async fn disable(&self) -> bool {
        let mut success = true;
        for table in TABLES {
            match self.run(&["-t", table, "-F"]).await {
                Some(output) if output.success() => {}
                _ => success = false,
            }
        }
        success
    }

    /// Set the default policy of a built-in chain.
    pub async fn set_policy(&self, table: &str, chain: &str, policy: &str) -> bool {
        let policy = policy.to_uppercase();
        match self.run(&["-t", table, "-P", chain, &policy]).await {
            Some(output) => output.success(),
            None => false,
        }
    }
}

struct ParsedRule {
    num: String,
    target: String,
    protocol: String,
    source: String,
    destination: String,
    dport: Option<String>,
    raw: String,
}

struct ParsedChain {
    policy: Option<String>,
    rules: Vec<ParsedRule>,
}

/// Split a `"table:chain:num"` id into its three parts.
fn split_rule_id(rule_id: &str) -> Option<(&str, &str, &str)> {
    let mut parts = rule_id.split(':');
    let table = parts.next().filter(|p| !p.is_empty())?;
    let chain = parts.next().filter(|p| !p.is_empty())?;
    let num = parts.next().filter(|p| p.parse::<u32>().is_ok())?;
    if parts.next().is_some() {
        return None;
    }
    Some((table, chain, num))
}

/// Parse `iptables -t <table> -L -n --line-numbers` output into chains.
///
/// A `Chain X (...)` header opens a chain section; built-in chains
/// print `(policy ACCEPT)` while user chains print reference counts.
/// Rule lines tokenize positionally into
/// num/target/protocol/opt/source/destination/extra.
fn parse_chains(output: &str) -> Vec<(String, ParsedChain)> {
    let header_re = Regex::new(r"^Chain (\S+) \(([^)]*)\)").unwrap();
    let dport_re = Regex::new(r"dpt:(\S+)").unwrap();

    let mut chains: Vec<(String, ParsedChain)> = Vec::new();

    for line in output.lines() {
        if let Some(caps) = header_re.captures(line) {
            let policy = caps[2]
                .strip_prefix("policy ")
                .map(|p| p.split_whitespace().next().unwrap_or(p).to_string());
            chains.push((
                caps[1].to_string(),
                ParsedChain {
                    policy,
                    rules: Vec::new(),
                },
            ));
            continue;
        }

        // Column header lines and blanks.
        let trimmed = line.trim();
        if trimmed.is_empty() || line.starts_with("num") || line.starts_with("target") {
            continue;
        }

        let Some((_, chain)) = chains.last_mut() else {
            continue;
        };

        let parts: Vec<&str> = trimmed.split_whitespace().collect();
        if parts.len() < 4 || parts[0].parse::<u32>().is_err() {
            continue;
        }

        let extra = if parts.len() > 6 {
            parts[6..].join(" ")
        } else {
            String::new()
        };
        chain.rules.push(ParsedRule {
            num: parts[0].to_string(),
            target: parts[1].to_string(),
            protocol: parts[2].to_string(),
            source: parts.get(4).unwrap_or(&"0.0.0.0/0").to_string(),
            destination: parts.get(5).unwrap_or(&"0.0.0.0/0").to_string(),
            dport: dport_re.captures(&extra).map(|c| c[1].to_string()),
            raw: trimmed.to_string(),
        });
    }

    chains
}

/// Build the iptables argument sequence for a rule spec.
///
/// Order is fixed: `-t`, insert/append, `-p` (unless "all"), `-s`/`-d`
/// (unless the all-addresses default), `-i`/`-o`, `--dport`/`--sport`,
/// `-j`.
fn build_add_args(spec: &IptablesRuleSpec) -> Vec<String> {
    let table = if spec.table.is_empty() {
        "filter"
    } else {
        spec.table.as_str()
    };
    let chain = if spec.chain.is_empty() {
        "INPUT"
    } else {
        spec.chain.as_str()
    };

    let mut args: Vec<String> = vec!["-t".into(), table.into()];

    match spec.position {
        Some(position) => {
            args.extend(["-I".into(), chain.into(), position.to_string()]);
        }
        None => args.extend(["-A".into(), chain.into()]),
    }

    if let Some(proto) = spec.protocol.as_deref().filter(|p| *p != "all") {
        args.extend(["-p".into(), proto.to_string()]);
    }
    if let Some(source) = spec.source.as_deref().filter(|s| *s != "0.0.0.0/0") {
        args.extend(["-s".into(), source.to_string()]);
    }
    if let Some(dest) = spec.destination.as_deref().filter(|d| *d != "0.0.0.0/0") {
        args.extend(["-d".into(), dest.to_string()]);
    }
    if let Some(iface) = &spec.in_interface {
        args.extend(["-i".into(), iface.clone()]);
    }
    if let Some(iface) = &spec.out_interface {
        args.extend(["-o".into(), iface.clone()]);
    }
    if let Some(dport) = &spec.dport {
        args.extend(["--dport".into(), dport.clone()]);
    }
    if let Some(sport) = &spec.sport {
        args.extend(["--sport".into(), sport.clone()]);
    }

    let target = if spec.target.is_empty() {
        "ACCEPT"
    } else {
        spec.target.as_str()
    };
    args.extend(["-j".into(), target.to_string()]);

    args
}
