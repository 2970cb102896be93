//! Network commands - interfaces, routes, policy rules, neighbors,
//! counters and the topology graph.

use anyhow::{bail, Result};
use fwbridge_core::ConnectorManager;

pub async fn interfaces(json: bool) -> Result<()> {
    let manager = ConnectorManager::new();
    let interfaces = manager.network().interfaces().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&interfaces)?);
        return Ok(());
    }

    if interfaces.is_empty() {
        println!("No interfaces found.");
        return Ok(());
    }

    println!(
        "{:<12} {:<8} {:<6} {:<18} ADDRESSES",
        "NAME", "STATE", "MTU", "MAC"
    );
    println!("{}", "-".repeat(80));

    for iface in &interfaces {
        let addrs: Vec<String> = iface
            .ipv4
            .iter()
            .chain(&iface.ipv6)
            .map(|a| format!("{}/{}", a.address, a.prefix))
            .collect();
        println!(
            "{:<12} {:<8} {:<6} {:<18} {}",
            iface.name,
            iface.state,
            iface.mtu.map_or("-".to_string(), |m| m.to_string()),
            iface.mac.as_deref().unwrap_or("-"),
            addrs.join(", ")
        );
    }

    Ok(())
}

/// List routes; `None` means every table.
pub async fn routes(table: Option<&str>, json: bool) -> Result<()> {
    let manager = ConnectorManager::new();
    let network = manager.network();
    let routes = match table {
        Some(table) => network.routes(table).await,
        None => network.all_routes().await,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&routes)?);
        return Ok(());
    }

    if routes.is_empty() {
        println!("No routes found.");
        return Ok(());
    }

    println!(
        "{:<22} {:<16} {:<10} {:<8} {:<8} TYPE",
        "DESTINATION", "GATEWAY", "DEVICE", "TABLE", "METRIC"
    );
    println!("{}", "-".repeat(80));

    for route in &routes {
        println!(
            "{:<22} {:<16} {:<10} {:<8} {:<8} {}",
            route.destination,
            route.gateway.as_deref().unwrap_or("-"),
            route.device.as_deref().unwrap_or("-"),
            route.table,
            route.metric.map_or("-".to_string(), |m| m.to_string()),
            route.route_type
        );
    }

    println!("\nTotal: {} routes", routes.len());
    Ok(())
}

pub async fn policy_rules(json: bool) -> Result<()> {
    let manager = ConnectorManager::new();
    let rules = manager.network().policy_rules().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&rules)?);
        return Ok(());
    }

    println!(
        "{:<10} {:<18} {:<18} {:<10} {:<8} ACTION",
        "PRIORITY", "FROM", "TO", "TABLE", "FWMARK"
    );
    println!("{}", "-".repeat(80));

    for rule in &rules {
        println!(
            "{:<10} {:<18} {:<18} {:<10} {:<8} {}",
            rule.priority,
            rule.src.as_deref().unwrap_or("all"),
            rule.dst.as_deref().unwrap_or("all"),
            rule.table.as_deref().unwrap_or("-"),
            rule.fwmark.as_deref().unwrap_or("-"),
            rule.action
        );
    }

    Ok(())
}

pub async fn arp(json: bool) -> Result<()> {
    let manager = ConnectorManager::new();
    let neighbors = manager.network().neighbors().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&neighbors)?);
        return Ok(());
    }

    println!("{:<40} {:<18} {:<10} STATE", "ADDRESS", "MAC", "DEVICE");
    println!("{}", "-".repeat(90));

    for entry in &neighbors {
        println!(
            "{:<40} {:<18} {:<10} {}",
            entry.ip,
            entry.mac.as_deref().unwrap_or("-"),
            entry.device.as_deref().unwrap_or("-"),
            entry.state.join(",")
        );
    }

    Ok(())
}

pub async fn stats(interface: &str, json: bool) -> Result<()> {
    let manager = ConnectorManager::new();
    let Some(stats) = manager.network().link_stats(interface).await else {
        bail!("no statistics for interface {interface}");
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("{interface}:");
    println!(
        "  rx: {} bytes, {} packets, {} errors, {} dropped",
        stats.rx.bytes, stats.rx.packets, stats.rx.errors, stats.rx.dropped
    );
    println!(
        "  tx: {} bytes, {} packets, {} errors, {} dropped",
        stats.tx.bytes, stats.tx.packets, stats.tx.errors, stats.tx.dropped
    );

    Ok(())
}

pub async fn graph(json: bool) -> Result<()> {
    let manager = ConnectorManager::new();
    let graph = manager.topology().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&graph)?);
        return Ok(());
    }

    println!("Nodes:");
    for node in &graph.nodes {
        println!("  {} ({})", node.id, node.label);
    }
    println!("Edges:");
    for edge in &graph.edges {
        match &edge.label {
            Some(label) => println!("  {} -> {} [{}]", edge.source, edge.target, label),
            None => println!("  {} -> {}", edge.source, edge.target),
        }
    }

    Ok(())
}
