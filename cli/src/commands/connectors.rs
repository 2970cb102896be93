//! Connectors command - probe every backend tool.

use anyhow::Result;
use fwbridge_core::{ConnectorManager, ConnectorStatus};

pub async fn run(json: bool) -> Result<()> {
    let manager = ConnectorManager::new();
    let infos = manager.check_all_availability().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }

    println!("{:<14} {:<10} {:<12} DETAILS", "CONNECTOR", "KIND", "STATUS");
    println!("{}", "-".repeat(70));

    for info in &infos {
        let status = match info.status {
            ConnectorStatus::Available => "available",
            ConnectorStatus::Unavailable => "unavailable",
            ConnectorStatus::Error => "error",
        };
        let details = info
            .version
            .as_deref()
            .or(info.message.as_deref())
            .unwrap_or("-");
        let kind = serde_json::to_value(info.kind)?;
        println!(
            "{:<14} {:<10} {:<12} {}",
            info.name,
            kind.as_str().unwrap_or("-"),
            status,
            details
        );
    }

    Ok(())
}
