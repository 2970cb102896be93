//! Network connector built on iproute2.
//!
//! Reads go through `ip -j` and deserialize the tool's JSON output
//! into typed structs; mutations assemble plain `ip route`/`ip rule`
//! argument vectors and run elevated. Parse problems degrade to empty
//! collections, never to errors.

use serde::Deserialize;

use crate::exec::{CommandOutput, CommandRunner};
use crate::models::{
    ConnectorInfo, ConnectorKind, InterfaceAddress, LinkCounters, LinkStats, MutationOutcome,
    NeighborEntry, NetworkInterface, PolicyRule, PolicyRuleSpec, Route, RouteSpec,
};

const BINARY: &str = "ip";

/// Summary counts over the connector's views.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NetworkStatus {
    pub interface_count: usize,
    pub interfaces_up: usize,
    pub route_count: usize,
    pub policy_rule_count: usize,
}

/// Connector for interface, route, policy rule and neighbor state.
pub struct NetworkConnector<R> {
    runner: R,
}

// ip -j addr show
#[derive(Deserialize)]
struct IpAddrEntry {
    ifname: String,
    ifindex: u32,
    #[serde(default)]
    operstate: Option<String>,
    #[serde(default)]
    mtu: Option<u32>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    link_type: Option<String>,
    #[serde(default)]
    flags: Vec<String>,
    #[serde(default)]
    addr_info: Vec<IpAddrInfo>,
}

#[derive(Deserialize)]
struct IpAddrInfo {
    family: String,
    local: String,
    prefixlen: u8,
    #[serde(default)]
    broadcast: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

// ip -j route show
#[derive(Deserialize)]
struct IpRouteEntry {
    #[serde(default)]
    dst: Option<String>,
    #[serde(default)]
    gateway: Option<String>,
    #[serde(default)]
    dev: Option<String>,
    #[serde(default)]
    table: Option<String>,
    #[serde(default)]
    protocol: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    metric: Option<u32>,
    #[serde(default)]
    prefsrc: Option<String>,
    #[serde(rename = "type", default)]
    route_type: Option<String>,
    #[serde(default)]
    flags: Vec<String>,
}

// ip -j rule show
#[derive(Deserialize)]
struct IpRuleEntry {
    #[serde(default)]
    priority: Option<u32>,
    #[serde(default)]
    src: Option<String>,
    #[serde(default)]
    dst: Option<String>,
    #[serde(default)]
    table: Option<String>,
    #[serde(default)]
    fwmark: Option<String>,
    #[serde(default)]
    action: Option<String>,
}

// ip -j neigh show
#[derive(Deserialize)]
struct IpNeighEntry {
    dst: String,
    #[serde(default)]
    lladdr: Option<String>,
    #[serde(default)]
    dev: Option<String>,
    #[serde(default)]
    state: Vec<String>,
}

// ip -j -s link show <dev>
#[derive(Deserialize)]
struct IpLinkEntry {
    #[serde(default)]
    stats64: Option<IpLinkStats>,
    #[serde(default)]
    stats: Option<IpLinkStats>,
}

#[derive(Deserialize)]
struct IpLinkStats {
    rx: IpLinkCounters,
    tx: IpLinkCounters,
}

#[derive(Deserialize)]
struct IpLinkCounters {
    #[serde(default)]
    bytes: u64,
    #[serde(default)]
    packets: u64,
    #[serde(default)]
    errors: u64,
    #[serde(default)]
    dropped: u64,
}

impl<R: CommandRunner> NetworkConnector<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    async fn run(&self, args: &[&str], elevate: bool) -> Option<CommandOutput> {
        let path = self.runner.lookup(BINARY)?;
        Some(self.runner.run(&path.to_string_lossy(), args, elevate).await)
    }

    /// Deserialize a JSON read, degrading to `None` on tool failure or
    /// malformed output.
    async fn read_json<T: serde::de::DeserializeOwned>(&self, args: &[&str]) -> Option<T> {
        let output = self.run(args, false).await?;
        if !output.success() {
            return None;
        }
        match serde_json::from_str(&output.stdout) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::debug!(args = args.join(" "), error = %e, "unparseable ip output");
                None
            }
        }
    }

    pub async fn check_availability(&self) -> ConnectorInfo {
        let Some(output) = self.run(&["-V"], false).await else {
            return ConnectorInfo::unavailable(
                "network",
                ConnectorKind::Network,
                "ip not found in PATH",
            );
        };

        if output.success() {
            let re = regex::Regex::new(r"iproute2-(\S+)").unwrap();
            let version = re
                .captures(&output.stdout)
                .map(|caps| caps[1].to_string());
            ConnectorInfo::available("network", ConnectorKind::Network, version)
        } else {
            ConnectorInfo::error("network", ConnectorKind::Network, output.error_message())
        }
    }

    /// List interfaces with their addresses split by family.
    pub async fn interfaces(&self) -> Vec<NetworkInterface> {
        let entries: Vec<IpAddrEntry> = self
            .read_json(&["-j", "addr", "show"])
            .await
            .unwrap_or_default();

        entries
            .into_iter()
            .map(|entry| {
                let mut ipv4 = Vec::new();
                let mut ipv6 = Vec::new();
                for addr in entry.addr_info {
                    let target = match addr.family.as_str() {
                        "inet" => &mut ipv4,
                        "inet6" => &mut ipv6,
                        _ => continue,
                    };
                    target.push(InterfaceAddress {
                        address: addr.local,
                        prefix: addr.prefixlen,
                        broadcast: addr.broadcast,
                        scope: addr.scope,
                    });
                }
                NetworkInterface {
                    name: entry.ifname,
                    index: entry.ifindex,
                    state: entry.operstate.unwrap_or_else(|| "UNKNOWN".to_string()),
                    mtu: entry.mtu,
                    mac: entry.address,
                    link_type: entry.link_type,
                    flags: entry.flags,
                    ipv4,
                    ipv6,
                }
            })
            .collect()
    }

    /// Routes from one table. The id is `"<dest>@<dev>"`.
    pub async fn routes(&self, table: &str) -> Vec<Route> {
        let entries: Vec<IpRouteEntry> = self
            .read_json(&["-j", "route", "show", "table", table])
            .await
            .unwrap_or_default();

        entries
            .into_iter()
            .map(|entry| {
                let mut route = to_route(entry, table);
                route.id = format!(
                    "{}@{}",
                    route.destination,
                    route.device.as_deref().unwrap_or("")
                );
                route
            })
            .collect()
    }

    /// Routes from every table. The id carries the table as a third
    /// segment, `"<dest>@<dev>@<table>"`, to disambiguate.
    pub async fn all_routes(&self) -> Vec<Route> {
        let entries: Vec<IpRouteEntry> = self
            .read_json(&["-j", "route", "show", "table", "all"])
            .await
            .unwrap_or_default();

        entries
            .into_iter()
            .map(|entry| {
                let mut route = to_route(entry, "main");
                route.id = format!(
                    "{}@{}@{}",
                    route.destination,
                    route.device.as_deref().unwrap_or(""),
                    route.table
                );
                route
            })
            .collect()
    }

    pub async fn add_route(&self, spec: &RouteSpec) -> MutationOutcome {
        if spec.destination.is_empty() {
            return MutationOutcome::failed("destination is required");
        }

        let mut args: Vec<String> = vec!["route".into(), "add".into()];
        if let Some(route_type) = &spec.route_type {
            args.insert(2, route_type.clone());
        }
        args.push(spec.destination.clone());
        if let Some(gateway) = &spec.gateway {
            args.extend(["via".into(), gateway.clone()]);
        }
        if let Some(device) = &spec.device {
            args.extend(["dev".into(), device.clone()]);
        }
        if let Some(metric) = spec.metric {
            args.extend(["metric".into(), metric.to_string()]);
        }
        if let Some(table) = &spec.table {
            if table != "main" {
                args.extend(["table".into(), table.clone()]);
            }
        }

        self.mutate(&args).await
    }

    pub async fn delete_route(&self, spec: &RouteSpec) -> MutationOutcome {
        if spec.destination.is_empty() {
            return MutationOutcome::failed("destination is required");
        }

        let mut args: Vec<String> = vec!["route".into(), "del".into(), spec.destination.clone()];
        if let Some(gateway) = &spec.gateway {
            args.extend(["via".into(), gateway.clone()]);
        }
        if let Some(device) = &spec.device {
            args.extend(["dev".into(), device.clone()]);
        }
        if let Some(table) = &spec.table {
            if table != "main" {
                args.extend(["table".into(), table.clone()]);
            }
        }

        self.mutate(&args).await
    }

    /// List policy routing rules, id = stringified priority.
    pub async fn policy_rules(&self) -> Vec<PolicyRule> {
        let entries: Vec<IpRuleEntry> = self
            .read_json(&["-j", "rule", "show"])
            .await
            .unwrap_or_default();

        entries
            .into_iter()
            .map(|entry| {
                let priority = entry.priority.unwrap_or(0);
                PolicyRule {
                    id: priority.to_string(),
                    priority,
                    src: entry.src,
                    dst: entry.dst,
                    table: entry.table,
                    fwmark: entry.fwmark,
                    action: entry.action.unwrap_or_else(|| "lookup".to_string()),
                }
            })
            .collect()
    }

    pub async fn add_policy_rule(&self, spec: &PolicyRuleSpec) -> MutationOutcome {
        let mut args: Vec<String> = vec!["rule".into(), "add".into()];
        push_rule_args(&mut args, spec, true);
        self.mutate(&args).await
    }

    pub async fn delete_policy_rule(&self, spec: &PolicyRuleSpec) -> MutationOutcome {
        let mut args: Vec<String> = vec!["rule".into(), "del".into()];
        push_rule_args(&mut args, spec, false);
        self.mutate(&args).await
    }

    /// Neighbor (ARP/NDP) table.
    pub async fn neighbors(&self) -> Vec<NeighborEntry> {
        let entries: Vec<IpNeighEntry> = self
            .read_json(&["-j", "neigh", "show"])
            .await
            .unwrap_or_default();

        entries
            .into_iter()
            .map(|entry| NeighborEntry {
                ip: entry.dst,
                mac: entry.lladdr,
                device: entry.dev,
                state: entry.state,
            })
            .collect()
    }

    /// Counters for one interface; `None` when the interface does not
    /// exist or the listing is unparseable.
    pub async fn link_stats(&self, interface: &str) -> Option<LinkStats> {
        let entries: Vec<IpLinkEntry> = self
            .read_json(&["-j", "-s", "link", "show", interface])
            .await?;
        let entry = entries.into_iter().next()?;
        let stats = entry.stats64.or(entry.stats)?;
        Some(LinkStats {
            rx: to_counters(stats.rx),
            tx: to_counters(stats.tx),
        })
    }

    pub async fn status(&self) -> NetworkStatus {
        let interfaces = self.interfaces().await;
        let routes = self.routes("main").await;
        let policy_rules = self.policy_rules().await;

        NetworkStatus {
            interface_count: interfaces.len(),
            interfaces_up: interfaces.iter().filter(|i| i.state == "UP").count(),
            route_count: routes.len(),
            policy_rule_count: policy_rules.len(),
        }
    }

    async fn mutate(&self, args: &[String]) -> MutationOutcome {
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        match self.run(&arg_refs, true).await {
            Some(output) if output.success() => MutationOutcome::ok("ok"),
            Some(output) => MutationOutcome::failed(output.error_message()),
            None => MutationOutcome::failed("ip not found in PATH"),
        }
    }
}

fn to_route(entry: IpRouteEntry, default_table: &str) -> Route {
    Route {
        id: String::new(),
        destination: entry.dst.unwrap_or_else(|| "default".to_string()),
        gateway: entry.gateway,
        device: entry.dev,
        table: entry
            .table
            .unwrap_or_else(|| default_table.to_string()),
        protocol: entry.protocol,
        scope: entry.scope,
        metric: entry.metric,
        prefsrc: entry.prefsrc,
        route_type: entry.route_type.unwrap_or_else(|| "unicast".to_string()),
        flags: entry.flags,
    }
}

fn to_counters(c: IpLinkCounters) -> LinkCounters {
    LinkCounters {
        bytes: c.bytes,
        packets: c.packets,
        errors: c.errors,
        dropped: c.dropped,
    }
}

/// Emit rule flags for the fields that are present. Deletion matches
/// on priority/from/to/table but never fwmark, which `ip rule del`
/// treats as an exact-match trap.
fn push_rule_args(args: &mut Vec<String>, spec: &PolicyRuleSpec, include_fwmark: bool) {
    if let Some(priority) = spec.priority {
        args.extend(["priority".into(), priority.to_string()]);
    }
    if let Some(from) = &spec.from {
        args.extend(["from".into(), from.clone()]);
    }
    if let Some(to) = &spec.to {
        args.extend(["to".into(), to.clone()]);
    }
    if include_fwmark {
        if let Some(fwmark) = &spec.fwmark {
            args.extend(["fwmark".into(), fwmark.clone()]);
        }
    }
    if let Some(table) = &spec.table {
        args.extend(["table".into(), table.clone()]);
    }
}
