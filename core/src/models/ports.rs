//! Listening-port and scan result models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One listening socket with interface attribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListeningPort {
    pub ip: String,
    pub port: u16,
    pub protocol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Owning interface name, or the sentinels "all" (wildcard bind)
    /// and "unknown" (address not found on any interface).
    pub interface: String,
    /// True exactly for wildcard binds.
    pub is_public: bool,
}

/// Outcome of a single TCP connect probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanState {
    Open,
    Closed,
    Filtered,
    Error,
}

impl std::fmt::Display for ScanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScanState::Open => "open",
            ScanState::Closed => "closed",
            ScanState::Filtered => "filtered",
            ScanState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Result of probing one port on one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub host: String,
    pub port: u16,
    pub protocol: String,
    pub state: ScanState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ScanResult {
    pub fn new(host: &str, port: u16, state: ScanState) -> Self {
        Self {
            host: host.to_string(),
            port,
            protocol: "tcp".to_string(),
            state,
            service: None,
            version: None,
            timestamp: Utc::now(),
        }
    }
}

/// One port line from a deep-scanner report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannedPort {
    pub port: u16,
    pub protocol: String,
    pub state: String,
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Parsed deep-scanner (nmap) report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// "up" when the scanner reported the host alive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub ports: Vec<ScannedPort>,
    /// The unparsed report text.
    pub raw: String,
}
