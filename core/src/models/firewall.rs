//! Firewall rule model and per-backend mutation specs.

use serde::{Deserialize, Serialize};

/// The four supported firewall backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirewallKind {
    Ufw,
    Iptables,
    Nftables,
    Firewalld,
}

impl FirewallKind {
    pub fn name(self) -> &'static str {
        match self {
            FirewallKind::Ufw => "ufw",
            FirewallKind::Iptables => "iptables",
            FirewallKind::Nftables => "nftables",
            FirewallKind::Firewalld => "firewalld",
        }
    }
}

impl std::fmt::Display for FirewallKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for FirewallKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ufw" => Ok(FirewallKind::Ufw),
            "iptables" => Ok(FirewallKind::Iptables),
            "nftables" | "nft" => Ok(FirewallKind::Nftables),
            "firewalld" => Ok(FirewallKind::Firewalld),
            other => Err(format!("unknown firewall backend: {other}")),
        }
    }
}

/// One firewall rule, normalized from a backend's live listing.
///
/// Id formats are backend-specific and only unique within one backend's
/// current listing:
/// - ufw: positional number (volatile; deleting a rule renumbers the
///   rest; never cache across mutations)
/// - iptables: `"table:chain:num"`
/// - nftables: sequential display number (volatile, read-only; deletion
///   uses the native `handle` instead)
/// - firewalld: `"zone:type:value"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRule {
    pub id: String,
    pub backend: FirewallKind,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    /// ufw application profile name, when the rule targets an app
    /// instead of a port.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    /// nftables native rule handle. This is the stable deletion key;
    /// the display id is not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<u64>,
    /// The rule as the tool printed it (or its JSON for nftables).
    pub raw: String,
}

impl FirewallRule {
    /// A rule with only id, backend, action and raw text set.
    pub fn new(id: String, backend: FirewallKind, action: String, raw: String) -> Self {
        Self {
            id,
            backend,
            action,
            direction: None,
            protocol: None,
            port: None,
            app: None,
            source: None,
            destination: None,
            interface: None,
            table: None,
            chain: None,
            zone: None,
            handle: None,
            raw,
        }
    }
}

/// Typed result of a mutating backend command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MutationOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
        }
    }
}

/// ufw rule specification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UfwRuleSpec {
    /// allow, deny, reject or limit. Defaults to "allow" when empty.
    #[serde(default)]
    pub action: String,
    /// "in" (default) or "out".
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub interface: Option<String>,
    #[serde(default)]
    pub from_ip: Option<String>,
    #[serde(default)]
    pub to_ip: Option<String>,
    /// Port number or range, e.g. "22" or "80:443".
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
    /// Application profile name, used instead of a port.
    #[serde(default)]
    pub app: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// iptables rule specification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IptablesRuleSpec {
    /// Defaults to "filter" when empty.
    #[serde(default)]
    pub table: String,
    /// Defaults to "INPUT" when empty.
    #[serde(default)]
    pub chain: String,
    /// Jump target; defaults to "ACCEPT" when empty.
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub dport: Option<String>,
    #[serde(default)]
    pub sport: Option<String>,
    #[serde(default)]
    pub in_interface: Option<String>,
    #[serde(default)]
    pub out_interface: Option<String>,
    /// When set, insert at this position instead of appending.
    #[serde(default)]
    pub position: Option<u32>,
}

/// nftables rule specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NftablesRuleSpec {
    /// ip, ip6, inet, arp, bridge or netdev. Defaults to "inet" when
    /// empty.
    #[serde(default)]
    pub family: String,
    pub table: String,
    pub chain: String,
    /// Rule expression text, e.g. "tcp dport 22 accept".
    pub rule: String,
    /// Handle to insert at, via `insert rule ... position <handle>`.
    #[serde(default)]
    pub position: Option<u64>,
}

/// firewalld rule kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirewalldRuleKind {
    Port,
    Service,
    Rich,
}

impl FirewalldRuleKind {
    pub fn name(self) -> &'static str {
        match self {
            FirewalldRuleKind::Port => "port",
            FirewalldRuleKind::Service => "service",
            FirewalldRuleKind::Rich => "rich",
        }
    }
}

/// firewalld rule specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirewalldRuleSpec {
    /// Target zone; the daemon's default zone when absent.
    #[serde(default)]
    pub zone: Option<String>,
    pub kind: FirewalldRuleKind,
    #[serde(default)]
    pub port: Option<String>,
    /// Defaults to "tcp" for port rules when empty.
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub rich_rule: Option<String>,
    /// Permanent rules survive reloads; applying them requires the
    /// reload step the connector issues after the mutation.
    #[serde(default = "default_permanent")]
    pub permanent: bool,
}

fn default_permanent() -> bool {
    true
}

/// Union of the per-backend rule specs, for the uniform capability
/// surface. Handing a variant to the wrong backend yields a failed
/// [`MutationOutcome`], never a panic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "backend")]
pub enum FirewallRuleSpec {
    Ufw(UfwRuleSpec),
    Iptables(IptablesRuleSpec),
    Nftables(NftablesRuleSpec),
    Firewalld(FirewalldRuleSpec),
}
