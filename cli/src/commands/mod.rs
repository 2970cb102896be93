//! Command implementations.

pub mod connectors;
pub mod firewall;
pub mod network;
pub mod ports;
