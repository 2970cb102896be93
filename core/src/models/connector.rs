//! Connector availability reporting.

use serde::{Deserialize, Serialize};

/// Capability category a connector belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorKind {
    Firewall,
    Network,
    Scanner,
}

/// Probe result for one connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorStatus {
    /// Tool present and responding.
    Available,
    /// Tool binary not found on the system.
    Unavailable,
    /// Binary found but the probe command failed (permissions, daemon
    /// down, unparseable output).
    Error,
}

/// Information about a connector, built fresh on every probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorInfo {
    pub name: String,
    pub kind: ConnectorKind,
    pub status: ConnectorStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ConnectorInfo {
    pub fn available(name: &str, kind: ConnectorKind, version: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            kind,
            status: ConnectorStatus::Available,
            version,
            message: None,
        }
    }

    pub fn unavailable(name: &str, kind: ConnectorKind, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            kind,
            status: ConnectorStatus::Unavailable,
            version: None,
            message: Some(message.into()),
        }
    }

    pub fn error(name: &str, kind: ConnectorKind, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            kind,
            status: ConnectorStatus::Error,
            version: None,
            message: Some(message.into()),
        }
    }

    pub fn is_available(&self) -> bool {
        self.status == ConnectorStatus::Available
    }
}
