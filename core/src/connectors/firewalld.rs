//! firewalld connector.
//!
//! Enumerates zones and synthesizes rules from each zone's verbose
//! listing. Rule ids are `"zone:type:value"` with type in
//! {port, service, rich}. Permanent mutations only take effect after
//! the reload the connector issues behind the mutating command.

use crate::exec::CommandRunner;
use crate::models::{
    ConnectorInfo, ConnectorKind, FirewallKind, FirewallRule, FirewalldRuleKind,
    FirewalldRuleSpec, MutationOutcome,
};

const BINARY: &str = "firewall-cmd";

/// Daemon status summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FirewalldStatus {
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_zone: Option<String>,
    pub active_zones: Vec<ActiveZone>,
}

/// One active zone with its bindings.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ActiveZone {
    pub name: String,
    pub interfaces: Vec<String>,
    pub sources: Vec<String>,
}

/// Detailed zone information from the verbose listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ZoneInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub services: Vec<String>,
    pub ports: Vec<String>,
    pub rich_rules: Vec<String>,
    pub interfaces: Vec<String>,
    pub sources: Vec<String>,
}

/// Connector for firewalld.
pub struct FirewalldConnector<R> {
    runner: R,
}

impl<R: CommandRunner> FirewalldConnector<R> {
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
                "firewalld",
                ConnectorKind::Firewall,
                "firewall-cmd not found in PATH",
            );
        };

        if output.success() {
            let version = output.stdout.trim().to_string();
            ConnectorInfo::available("firewalld", ConnectorKind::Firewall, Some(version))
        } else {
            ConnectorInfo::error("firewalld", ConnectorKind::Firewall, output.error_message())
        }
    }

    pub async fn status(&self) -> FirewalldStatus {
        let mut status = FirewalldStatus::default();

        let Some(state) = self.run(&["--state"]).await else {
            return status;
        };
        status.running = state.stdout.trim() == "running";
        if !status.running {
            return status;
        }

        if let Some(output) = self.run(&["--get-default-zone"]).await {
            let zone = output.stdout.trim();
            if !zone.is_empty() {
                status.default_zone = Some(zone.to_string());
            }
        }
        if let Some(output) = self.run(&["--get-active-zones"]).await {
            status.active_zones = parse_active_zones(&output.stdout);
        }

        status
    }

    /// List all zone names.
    pub async fn zones(&self) -> Vec<String> {
        let Some(output) = self.run(&["--get-zones"]).await else {
            return Vec::new();
        };
        if !output.success() {
            return Vec::new();
        }
        output
            .stdout
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    /// Fetch one zone's verbose listing.
    pub async fn zone_info(&self, zone: &str) -> ZoneInfo {
        let mut info = ZoneInfo {
            name: zone.to_string(),
            ..ZoneInfo::default()
        };
        let Some(output) = self.run(&["--zone", zone, "--list-all"]).await else {
            return info;
        };
        parse_zone_listing(&output.stdout, &mut info);
        info
    }

    /// Synthesize rules from every zone's services, ports and rich
    /// rules.
    pub async fn rules(&self) -> Vec<FirewallRule> {
        let mut rules = Vec::new();

        for zone in self.zones().await {
            let info = self.zone_info(&zone).await;

            for port in &info.ports {
                let (port_num, protocol) = match port.split_once('/') {
                    Some((p, proto)) => (p.to_string(), proto.to_string()),
                    None => (port.clone(), "tcp".to_string()),
                };
                let mut rule = FirewallRule::new(
                    format!("{zone}:port:{port}"),
                    FirewallKind::Firewalld,
                    "allow".to_string(),
                    port.clone(),
                );
                rule.zone = Some(zone.clone());
                rule.port = Some(port_num);
                rule.protocol = Some(protocol);
                rules.push(rule);
            }

            for service in &info.services {
                let mut rule = FirewallRule::new(
                    format!("{zone}:service:{service}"),
                    FirewallKind::Firewalld,
                    "allow".to_string(),
                    service.clone(),
                );
                rule.zone = Some(zone.clone());
                rule.app = Some(service.clone());
                rules.push(rule);
            }

            for rich in &info.rich_rules {
                let mut rule = FirewallRule::new(
                    format!("{zone}:rich:{rich}"),
                    FirewallKind::Firewalld,
                    "custom".to_string(),
                    rich.clone(),
                );
                rule.zone = Some(zone.clone());
                rules.push(rule);
            }
        }

        rules
    }

    pub async fn add_rule(&self, spec: &FirewalldRuleSpec) -> MutationOutcome {
        let mut args: Vec<String> = Vec::new();
        if spec.permanent {
            args.push("--permanent".into());
        }
        if let Some(zone) = &spec.zone {
            args.extend(["--zone".into(), zone.clone()]);
        }

        match spec.kind {
            FirewalldRuleKind::Port => {
                let Some(port) = &spec.port else {
                    return MutationOutcome::failed("port is required for port rules");
                };
                let protocol = if spec.protocol.is_empty() {
                    "tcp"
                } else {
                    spec.protocol.as_str()
                };
                args.extend(["--add-port".into(), format!("{port}/{protocol}")]);
            }
            FirewalldRuleKind::Service => {
                let Some(service) = &spec.service else {
                    return MutationOutcome::failed("service is required for service rules");
                };
                args.extend(["--add-service".into(), service.clone()]);
            }
            FirewalldRuleKind::Rich => {
                let Some(rich) = &spec.rich_rule else {
                    return MutationOutcome::failed("rich_rule is required for rich rules");
                };
                args.extend(["--add-rich-rule".into(), rich.clone()]);
            }
        }

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        match self.run(&arg_refs).await {
            Some(output) if output.success() => {
                // Permanent changes only apply after a reload.
                if spec.permanent {
                    self.reload().await;
                }
                MutationOutcome::ok("Rule added successfully")
            }
            Some(output) => MutationOutcome::failed(output.error_message()),
            None => MutationOutcome::failed("firewall-cmd not found in PATH"),
        }
    }

    /// Delete a rule by `"zone:type:value"` id. The value chunk may
    /// itself contain colons (rich rules).
    pub async fn delete_rule(&self, rule_id: &str) -> bool {
        let parts: Vec<&str> = rule_id.splitn(3, ':').collect();
        if parts.len() != 3 {
            return false;
        }
        let [zone, kind, value] = [parts[0], parts[1], parts[2]];

        let remove_flag = match kind {
            "port" => "--remove-port",
            "service" => "--remove-service",
            "rich" => "--remove-rich-rule",
            _ => return false,
        };

        let mut args = vec!["--permanent"];
        if !zone.is_empty() {
            args.extend(["--zone", zone]);
        }
        args.extend([remove_flag, value]);

        match self.run(&args).await {
            Some(output) if output.success() => {
                self.reload().await;
                true
            }
            _ => false,
        }
    }

    /// Start the firewalld service.
    pub async fn enable(&self) -> bool {
        self.systemctl("start").await
    }

    /// Stop the firewalld service.
    pub async fn disable(&self) -> bool {
        self.systemctl("stop").await
    }

    pub async fn reload(&self) -> bool {
        matches!(self.run(&["--reload"]).await, Some(o) if o.success())
    }

    /// List all known service names.
    pub async fn services(&self) -> Vec<String> {
        let Some(output) = self.run(&["--get-services"]).await else {
            return Vec::new();
        };
        if !output.success() {
            return Vec::new();
        }
        output
            .stdout
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    pub async fn set_default_zone(&self, zone: &str) -> bool {
        matches!(self.run(&["--set-default-zone", zone]).await, Some(o) if o.success())
    }

    async fn systemctl(&self, verb: &str) -> bool {
        let Some(systemctl) = self.runner.lookup("systemctl") else {
            return false;
        };
        self.runner
            .run(&systemctl.to_string_lossy(), &[verb, "firewalld"], true)
            .await
            .success()
    }
}

/// Parse `--get-active-zones` output: zone names flush left, indented
/// `interfaces:`/`sources:` lines attach to the preceding zone.
fn parse_active_zones(output: &str) -> Vec<ActiveZone> {
    let mut zones: Vec<ActiveZone> = Vec::new();

    for line in output.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if !line.starts_with(' ') {
            zones.push(ActiveZone {
                name: line.trim().to_string(),
                ..ActiveZone::default()
            });
        } else if let Some(zone) = zones.last_mut() {
            if let Some(rest) = line.trim().strip_prefix("interfaces:") {
                zone.interfaces = rest.split_whitespace().map(str::to_string).collect();
            } else if let Some(rest) = line.trim().strip_prefix("sources:") {
                zone.sources = rest.split_whitespace().map(str::to_string).collect();
            }
        }
    }

    zones
}

/// Extract the known sections of a `--list-all` listing by line-prefix
/// matching.
fn parse_zone_listing(output: &str, info: &mut ZoneInfo) {
    for line in output.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("services:") {
            info.services = rest.split_whitespace().map(str::to_string).collect();
        } else if let Some(rest) = trimmed.strip_prefix("ports:") {
            info.ports = rest.split_whitespace().map(str::to_string).collect();
        } else if let Some(rest) = trimmed.strip_prefix("rich rules:") {
            let rest = rest.trim();
            if !rest.is_empty() {
                info.rich_rules.push(rest.to_string());
            }
        } else if let Some(rest) = trimmed.strip_prefix("target:") {
            info.target = Some(rest.trim().to_string());
        } else if let Some(rest) = trimmed.strip_prefix("interfaces:") {
            info.interfaces = rest.split_whitespace().map(str::to_string).collect();
        } else if let Some(rest) = trimmed.strip_prefix("sources:") {
            info.sources = rest.split_whitespace().map(str::to_string).collect();
        } else if trimmed.starts_with("rule ") {
            // Rich rules print one per line under the section header.
            info.rich_rules.push(trimmed.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::MockRunner;

    const PUBLIC_ZONE: &str = "\
public (active)
  target: default
  icmp-block-inversion: no
  interfaces: eth0
  sources:
  services: dhcpv6-client ssh
  ports: 8080/tcp 53/udp
  protocols:
  forward-ports:
  rich rules:
\trule family=\"ipv4\" source address=\"10.0.0.5\" drop
";

    #[test]
    fn test_parse_zone_listing() {
        let mut info = ZoneInfo {
            name: "public".to_string(),
            ..ZoneInfo::default()
        };
        parse_zone_listing(PUBLIC_ZONE, &mut info);

        assert_eq!(info.services, vec!["dhcpv6-client", "ssh"]);
        assert_eq!(info.ports, vec!["8080/tcp", "53/udp"]);
        assert_eq!(info.interfaces, vec!["eth0"]);
        assert_eq!(info.target.as_deref(), Some("default"));
        assert_eq!(
            info.rich_rules,
            vec![r#"rule family="ipv4" source address="10.0.0.5" drop"#]
        );
    }

    #[test]
    fn test_parse_active_zones() {
        let output = "\
public
  interfaces: eth0 eth1
internal
  sources: 192.168.0.0/24
";
        let zones = parse_active_zones(output);
        assert_eq!(zones.len(), 2);
        assert_eq!(zones[0].name, "public");
        assert_eq!(zones[0].interfaces, vec!["eth0", "eth1"]);
        assert_eq!(zones[1].name, "internal");
        assert_eq!(zones[1].sources, vec!["192.168.0.0/24"]);
    }

    #[tokio::test]
    async fn test_rules_synthesize_zone_type_value_ids() {
        let runner = MockRunner::new(&["firewall-cmd"])
            .with_stdout("firewall-cmd --get-zones", "public\n")
            .with_stdout("firewall-cmd --zone public --list-all", PUBLIC_ZONE);
        let connector = FirewalldConnector::new(runner);

        let rules = connector.rules().await;
        let ids: Vec<&str> = rules.iter().map(|r| r.id.as_str()).collect();
        assert!(ids.contains(&"public:port:8080/tcp"));
        assert!(ids.contains(&"public:port:53/udp"));
        assert!(ids.contains(&"public:service:ssh"));
        assert!(ids
            .iter()
            .any(|id| id.starts_with("public:rich:rule family=")));

        let port_rule = rules.iter().find(|r| r.id == "public:port:8080/tcp").unwrap();
        assert_eq!(port_rule.port.as_deref(), Some("8080"));
        assert_eq!(port_rule.protocol.as_deref(), Some("tcp"));
        assert_eq!(port_rule.zone.as_deref(), Some("public"));
    }

    #[tokio::test]
    async fn test_add_port_rule_with_reload() {
        let runner = MockRunner::new(&["firewall-cmd"])
            .with_stdout(
                "firewall-cmd --permanent --zone public --add-port 8080/tcp",
                "success\n",
            )
            .with_stdout("firewall-cmd --reload", "success\n");
        let connector = FirewalldConnector::new(runner.clone());

        let spec = FirewalldRuleSpec {
            zone: Some("public".to_string()),
            kind: FirewalldRuleKind::Port,
            port: Some("8080".to_string()),
            protocol: String::new(),
            service: None,
            rich_rule: None,
            permanent: true,
        };
        assert!(connector.add_rule(&spec).await.success);

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].1, "--reload");
    }

    #[tokio::test]
    async fn test_delete_rule_reverses_add() {
        let runner = MockRunner::new(&["firewall-cmd"])
            .with_stdout(
                "firewall-cmd --permanent --zone public --remove-port 8080/tcp",
                "success\n",
            )
            .with_stdout("firewall-cmd --reload", "success\n");
        let connector = FirewalldConnector::new(runner.clone());

        assert!(connector.delete_rule("public:port:8080/tcp").await);
        assert_eq!(runner.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_rule_malformed_ids() {
        let runner = MockRunner::new(&["firewall-cmd"]);
        let connector = FirewalldConnector::new(runner.clone());

        assert!(!connector.delete_rule("public:port").await);
        assert!(!connector.delete_rule("public:bogus:80/tcp").await);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rich_rule_value_keeps_colons() {
        let runner = MockRunner::new(&["firewall-cmd"]).with_stdout(
            "firewall-cmd --permanent --zone public --remove-rich-rule rule family=\"ipv4\" source address=\"10.0.0.5:0\" drop",
            "success\n",
        )
        .with_stdout("firewall-cmd --reload", "success\n");
        let connector = FirewalldConnector::new(runner);

        let deleted = connector
            .delete_rule("public:rich:rule family=\"ipv4\" source address=\"10.0.0.5:0\" drop")
            .await;
        assert!(deleted);
    }
}
