//! UFW (Uncomplicated Firewall) connector.
//!
//! Parses the numbered status listing and builds the `ufw` argument
//! grammar for mutations. Rule ids are positional numbers and volatile:
//! deleting rule N renumbers everything after it, so ids must never be
//! cached across mutations.

use regex::Regex;

use crate::exec::CommandRunner;
use crate::models::{
    ConnectorInfo, ConnectorKind, FirewallKind, FirewallRule, MutationOutcome, UfwRuleSpec,
};

const BINARY: &str = "ufw";

/// Parsed `ufw status verbose` summary.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct UfwStatus {
    pub enabled: bool,
    pub default_incoming: String,
    pub default_outgoing: String,
    pub logging: String,
}

impl Default for UfwStatus {
    fn default() -> Self {
        Self {
            enabled: false,
            default_incoming: "deny".to_string(),
            default_outgoing: "allow".to_string(),
            logging: "off".to_string(),
        }
    }
}

/// Connector for UFW.
pub struct UfwConnector<R> {
    runner: R,
}

impl<R: CommandRunner> UfwConnector<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    async fn run(&self, args: &[&str]) -> Option<crate::exec::CommandOutput> {
        let path = self.runner.lookup(BINARY)?;
        Some(self.runner.run(&path.to_string_lossy(), args, true).await)
    }

    pub async fn check_availability(&self) -> ConnectorInfo {
        let Some(output) = self.run(&["version"]).await else {
            return ConnectorInfo::unavailable(
                BINARY,
                ConnectorKind::Firewall,
                "ufw not found in PATH",
            );
        };

        if output.success() {
            let re = Regex::new(r"ufw (\d+\.\d+(?:\.\d+)?)").unwrap();
            let version = re
                .captures(&output.stdout)
                .map(|c| c[1].to_string())
                .unwrap_or_else(|| "unknown".to_string());
            ConnectorInfo::available(BINARY, ConnectorKind::Firewall, Some(version))
        } else {
            ConnectorInfo::error(BINARY, ConnectorKind::Firewall, output.error_message())
        }
    }

    pub async fn status(&self) -> UfwStatus {
        let Some(output) = self.run(&["status", "verbose"]).await else {
            return UfwStatus::default();
        };
        if !output.success() {
            return UfwStatus::default();
        }
        parse_status(&output.stdout)
    }

    /// List rules from the numbered status output.
    pub async fn rules(&self) -> Vec<FirewallRule> {
        let Some(output) = self.run(&["status", "numbered"]).await else {
            return Vec::new();
        };
        if !output.success() {
            return Vec::new();
        }
        parse_rules(&output.stdout)
    }

    pub async fn add_rule(&self, spec: &UfwRuleSpec) -> MutationOutcome {
        let args = build_add_args(spec);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();

        match self.run(&arg_refs).await {
            Some(output) if output.success() => MutationOutcome::ok(output.stdout.trim()),
            Some(output) => MutationOutcome::failed(output.error_message()),
            None => MutationOutcome::failed("ufw not found in PATH"),
        }
    }

    /// Delete a rule by its positional number.
    pub async fn delete_rule(&self, rule_id: &str) -> bool {
        // Positional ids only; anything else is malformed.
        if rule_id.parse::<u32>().is_err() {
            return false;
        }
        match self.run(&["--force", "delete", rule_id]).await {
            Some(output) => output.success(),
            None => false,
        }
    }

    pub async fn enable(&self) -> bool {
        matches!(self.run(&["--force", "enable"]).await, Some(o) if o.success())
    }

    pub async fn disable(&self) -> bool {
        matches!(self.run(&["disable"]).await, Some(o) if o.success())
    }

    /// Reset UFW to its installation defaults.
    pub async fn reset(&self) -> bool {
        matches!(self.run(&["--force", "reset"]).await, Some(o) if o.success())
    }

    pub async fn reload(&self) -> bool {
        matches!(self.run(&["reload"]).await, Some(o) if o.success())
    }

    /// List available application profiles.
    pub async fn app_list(&self) -> Vec<String> {
        let Some(output) = self.run(&["app", "list"]).await else {
            return Vec::new();
        };
        if !output.success() {
            return Vec::new();
        }
        output
            .stdout
            .lines()
            .filter(|line| !line.starts_with("Available applications:"))
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Fetch the `key: value` details of one application profile.
    pub async fn app_info(&self, app: &str) -> Vec<(String, String)> {
        let Some(output) = self.run(&["app", "info", app]).await else {
            return Vec::new();
        };
        if !output.success() {
            return Vec::new();
        }
        output
            .stdout
            .lines()
            .filter_map(|line| {
                let (key, value) = line.split_once(':')?;
                Some((key.trim().to_lowercase(), value.trim().to_string()))
            })
            .collect()
    }
}

fn parse_status(output: &str) -> UfwStatus {
    let mut status = UfwStatus::default();

    for line in output.lines() {
        if let Some(rest) = line.strip_prefix("Status:") {
            status.enabled = rest.to_lowercase().contains("active");
        } else if line.starts_with("Default:") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            for (i, part) in parts.iter().enumerate() {
                if part.to_lowercase().contains("incoming") && i > 0 {
                    status.default_incoming = parts[i - 1].to_lowercase();
                } else if part.to_lowercase().contains("outgoing") && i > 0 {
                    status.default_outgoing = parts[i - 1].to_lowercase();
                }
            }
        } else if let Some(rest) = line.strip_prefix("Logging:") {
            status.logging = rest.trim().to_lowercase();
        }
    }

    status
}

fn parse_rules(output: &str) -> Vec<FirewallRule> {
    // Rule line: [ 1] 22/tcp                     ALLOW IN    Anywhere
    let rule_re =
        Regex::new(r"\[\s*(\d+)\]\s+(.+?)\s+(ALLOW|DENY|REJECT|LIMIT)\s+(IN|OUT|FWD)?\s*(.*)")
            .unwrap();
    let port_re = Regex::new(r"^(\d+(?::\d+)?)(?:/(\w+))?").unwrap();

    let mut rules = Vec::new();
    let mut in_rules = false;

    for line in output.lines() {
        if line.starts_with("--") {
            in_rules = true;
            continue;
        }
        if !in_rules || line.trim().is_empty() {
            continue;
        }

        let Some(caps) = rule_re.captures(line) else {
            continue;
        };

        let to_spec = caps[2].trim().to_string();
        let direction = caps
            .get(4)
            .map_or("in", |m| m.as_str())
            .to_lowercase();
        let from_spec = caps
            .get(5)
            .map(|m| m.as_str().trim())
            .filter(|s| !s.is_empty())
            .unwrap_or("Anywhere")
            .to_string();

        let mut rule = FirewallRule::new(
            caps[1].to_string(),
            FirewallKind::Ufw,
            caps[3].to_lowercase(),
            line.trim().to_string(),
        );
        rule.direction = Some(direction);
        rule.source = Some(from_spec);
        rule.destination = Some(to_spec.clone());

        if let Some(port_caps) = port_re.captures(&to_spec) {
            rule.port = Some(port_caps[1].to_string());
            rule.protocol = Some(
                port_caps
                    .get(2)
                    .map_or("any", |m| m.as_str())
                    .to_string(),
            );
        } else if to_spec != "Anywhere" && !to_spec.is_empty() {
            rule.app = Some(to_spec);
        }

        rules.push(rule);
    }

    rules
}

/// Build the ufw argument sequence for a rule spec.
///
/// Grammar: action, `[direction [on interface]]`, `from <addr>` unless
/// "any", then exactly one of app / port / destination target, then an
/// optional comment.
fn build_add_args(spec: &UfwRuleSpec) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();

    let action = if spec.action.is_empty() {
        "allow"
    } else {
        spec.action.as_str()
    };
    args.push(action.to_lowercase());

    let direction = spec.direction.as_deref().unwrap_or("in").to_lowercase();
    let interface = spec
        .interface
        .as_deref()
        .filter(|i| !i.is_empty() && *i != "all");

    if direction == "out" {
        match interface {
            Some(iface) => {
                args.extend(["out".into(), "on".into(), iface.to_string()]);
            }
            None => args.push("out".into()),
        }
    } else if let Some(iface) = interface {
        args.extend(["in".into(), "on".into(), iface.to_string()]);
    }

    if let Some(from_ip) = spec.from_ip.as_deref().filter(|a| *a != "any") {
        args.extend(["from".into(), from_ip.to_string()]);
    }

    if let Some(app) = &spec.app {
        args.extend(["to".into(), "any".into(), "app".into(), app.clone()]);
    } else if let Some(port) = &spec.port {
        args.extend(["to".into(), "any".into(), "port".into(), port.clone()]);
        if let Some(proto) = spec.protocol.as_deref().filter(|p| !p.is_empty() && *p != "any") {
            args.extend(["proto".into(), proto.to_lowercase()]);
        }
    } else if let Some(to_ip) = spec.to_ip.as_deref().filter(|a| *a != "any") {
        args.extend(["to".into(), to_ip.to_string()]);
    }

    if let Some(comment) = &spec.comment {
        args.extend(["comment".into(), comment.clone()]);
    }

    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::MockRunner;

    const NUMBERED: &str = "\
Status: active

     To                         Action      From
     --                         ------      ----
[ 1] 22/tcp                     ALLOW IN    Anywhere
[ 2] 80                         ALLOW IN    10.0.0.0/8
[ 3] OpenSSH                    ALLOW IN    Anywhere
[ 4] 443/tcp (v6)               DENY IN     Anywhere (v6)
";

    #[test]
    fn test_parse_numbered_rules() {
        let rules = parse_rules(NUMBERED);
        assert_eq!(rules.len(), 4);

        assert_eq!(rules[0].id, "1");
        assert_eq!(rules[0].action, "allow");
        assert_eq!(rules[0].direction.as_deref(), Some("in"));
        assert_eq!(rules[0].port.as_deref(), Some("22"));
        assert_eq!(rules[0].protocol.as_deref(), Some("tcp"));
        assert_eq!(rules[0].source.as_deref(), Some("Anywhere"));

        // Bare port defaults the protocol to "any".
        assert_eq!(rules[1].port.as_deref(), Some("80"));
        assert_eq!(rules[1].protocol.as_deref(), Some("any"));
        assert_eq!(rules[1].source.as_deref(), Some("10.0.0.0/8"));

        // Non-numeric to-spec is an application profile.
        assert_eq!(rules[2].app.as_deref(), Some("OpenSSH"));
        assert_eq!(rules[2].port, None);

        assert_eq!(rules[3].action, "deny");
    }

    #[test]
    fn test_parse_rules_empty_output() {
        assert!(parse_rules("").is_empty());
        assert!(parse_rules("Status: inactive\n").is_empty());
    }

    #[test]
    fn test_parse_status_verbose() {
        let output = "\
Status: active
Logging: on (low)
Default: deny (incoming), allow (outgoing), disabled (routed)
New profiles: skip
";
        let status = parse_status(output);
        assert!(status.enabled);
        assert_eq!(status.default_incoming, "deny");
        assert_eq!(status.default_outgoing, "allow");
        assert_eq!(status.logging, "on (low)");
    }

    #[test]
    fn test_add_args_port_rule() {
        let spec = UfwRuleSpec {
            action: "deny".to_string(),
            direction: Some("in".to_string()),
            interface: Some("eth0".to_string()),
            from_ip: Some("10.0.0.0/8".to_string()),
            port: Some("8080".to_string()),
            protocol: Some("tcp".to_string()),
            comment: Some("blocked".to_string()),
            ..UfwRuleSpec::default()
        };
        assert_eq!(
            build_add_args(&spec),
            vec![
                "deny", "in", "on", "eth0", "from", "10.0.0.0/8", "to", "any", "port", "8080",
                "proto", "tcp", "comment", "blocked",
            ]
        );
    }

    #[test]
    fn test_add_args_omissions() {
        // Inbound with no interface emits no direction token; "any"
        // source and protocol are omitted.
        let spec = UfwRuleSpec {
            action: String::new(),
            from_ip: Some("any".to_string()),
            port: Some("80".to_string()),
            protocol: Some("any".to_string()),
            ..UfwRuleSpec::default()
        };
        assert_eq!(
            build_add_args(&spec),
            vec!["allow", "to", "any", "port", "80"]
        );
    }

    #[test]
    fn test_add_args_app_and_out() {
        let spec = UfwRuleSpec {
            action: "allow".to_string(),
            direction: Some("out".to_string()),
            app: Some("OpenSSH".to_string()),
            ..UfwRuleSpec::default()
        };
        assert_eq!(
            build_add_args(&spec),
            vec!["allow", "out", "to", "any", "app", "OpenSSH"]
        );
    }

    #[test]
    fn test_add_args_to_address() {
        let spec = UfwRuleSpec {
            action: "reject".to_string(),
            to_ip: Some("192.168.1.5".to_string()),
            ..UfwRuleSpec::default()
        };
        assert_eq!(build_add_args(&spec), vec!["reject", "to", "192.168.1.5"]);
    }

    #[tokio::test]
    async fn test_availability_unavailable_without_binary() {
        let connector = UfwConnector::new(MockRunner::new(&[]));
        let info = connector.check_availability().await;
        assert_eq!(info.status, crate::models::ConnectorStatus::Unavailable);
    }

    #[tokio::test]
    async fn test_availability_with_version() {
        let runner = MockRunner::new(&["ufw"]).with_stdout("ufw version", "ufw 0.36.1\n");
        let connector = UfwConnector::new(runner);
        let info = connector.check_availability().await;
        assert!(info.is_available());
        assert_eq!(info.version.as_deref(), Some("0.36.1"));
    }

    #[tokio::test]
    async fn test_availability_probe_failure() {
        let runner =
            MockRunner::new(&["ufw"]).with_failure("ufw version", "permission denied");
        let connector = UfwConnector::new(runner);
        let info = connector.check_availability().await;
        assert_eq!(info.status, crate::models::ConnectorStatus::Error);
        assert_eq!(info.message.as_deref(), Some("permission denied"));
    }

    #[tokio::test]
    async fn test_add_then_list_round_trip() {
        let listing = "\
     To                         Action      From
     --                         ------      ----
[ 1] 8080/tcp                   DENY IN     10.0.0.0/8
";
        let runner = MockRunner::new(&["ufw"])
            .with_stdout(
                "ufw deny from 10.0.0.0/8 to any port 8080 proto tcp",
                "Rule added\n",
            )
            .with_stdout("ufw status numbered", listing);
        let connector = UfwConnector::new(runner);

        let spec = UfwRuleSpec {
            action: "deny".to_string(),
            from_ip: Some("10.0.0.0/8".to_string()),
            port: Some("8080".to_string()),
            protocol: Some("tcp".to_string()),
            ..UfwRuleSpec::default()
        };
        assert!(connector.add_rule(&spec).await.success);

        let rules = connector.rules().await;
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].action, "deny");
        assert_eq!(rules[0].port.as_deref(), Some("8080"));
        assert_eq!(rules[0].protocol.as_deref(), Some("tcp"));
        assert_eq!(rules[0].source.as_deref(), Some("10.0.0.0/8"));
    }

    #[tokio::test]
    async fn test_delete_rejects_non_numeric_id() {
        let runner = MockRunner::new(&["ufw"]);
        let connector = UfwConnector::new(runner.clone());
        assert!(!connector.delete_rule("1:2").await);
        assert!(runner.calls().is_empty());
    }
}
