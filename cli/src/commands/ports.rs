//! Port commands - listening sockets, scans and public IP.

use anyhow::{bail, Result};
use fwbridge_core::{ConnectorManager, ScanState};

pub async fn listening(json: bool) -> Result<()> {
    let manager = ConnectorManager::new();
    let ports = manager.scanner().listening_ports().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }

    if ports.is_empty() {
        println!("No listening ports found.");
        return Ok(());
    }

    println!(
        "{:<6} {:<6} {:<40} {:<10} {:<8} PROCESS",
        "PORT", "PROTO", "ADDRESS", "IFACE", "PUBLIC"
    );
    println!("{}", "-".repeat(90));

    for port in &ports {
        let process = match (&port.process, port.pid) {
            (Some(name), Some(pid)) => format!("{name} ({pid})"),
            (Some(name), None) => name.clone(),
            _ => "-".to_string(),
        };
        println!(
            "{:<6} {:<6} {:<40} {:<10} {:<8} {}",
            port.port,
            port.protocol,
            port.ip,
            port.interface,
            if port.is_public { "yes" } else { "no" },
            process
        );
    }

    println!("\nTotal: {} ports", ports.len());
    Ok(())
}

pub async fn scan(host: &str, ports: &[u16], nmap: bool, json: bool) -> Result<()> {
    let manager = ConnectorManager::new();
    let scanner = manager.scanner();

    if nmap {
        let report = scanner.scan_with_nmap(host, None, &[]).await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print!("{}", report.raw);
        }
        return Ok(());
    }

    let results = scanner.scan_ports(host, ports, None).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    let open: Vec<_> = results
        .iter()
        .filter(|r| r.state == ScanState::Open)
        .collect();
    for result in &open {
        println!("{}/{} open", result.port, result.protocol);
    }
    println!(
        "\n{} open, {} probed on {host}",
        open.len(),
        results.len()
    );
    Ok(())
}

pub async fn public_ip(json: bool) -> Result<()> {
    let manager = ConnectorManager::new();
    let Some(ip) = manager.scanner().public_ip().await else {
        bail!("could not determine public IP address");
    };

    if json {
        println!("{}", serde_json::json!({ "ip": ip }));
    } else {
        println!("{ip}");
    }
    Ok(())
}
