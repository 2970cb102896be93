//! Firewall commands - list rules, block ports, delete rules.

use anyhow::{bail, Result};
use fwbridge_core::{ConnectorManager, FirewallKind};

pub async fn rules(backend: Option<FirewallKind>, json: bool) -> Result<()> {
    let manager = ConnectorManager::new();

    let backend = match backend {
        Some(backend) => backend,
        None => match manager.preferred_firewall().await {
            Some(backend) => backend,
            None => bail!("no firewall backend available"),
        },
    };

    let rules = manager.firewall(backend).rules().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&rules)?);
        return Ok(());
    }

    if rules.is_empty() {
        println!("No rules found for {backend}.");
        return Ok(());
    }

    println!(
        "{:<24} {:<8} {:<6} {:<10} RULE",
        "ID", "ACTION", "PROTO", "PORT"
    );
    println!("{}", "-".repeat(90));

    for rule in &rules {
        println!(
            "{:<24} {:<8} {:<6} {:<10} {}",
            truncate(&rule.id, 24),
            rule.action,
            rule.protocol.as_deref().unwrap_or("-"),
            rule.port.as_deref().unwrap_or("-"),
            truncate(&rule.raw, 50)
        );
    }

    println!("\nTotal: {} rules ({backend})", rules.len());
    Ok(())
}

pub async fn block(port: u16, protocol: &str, interface: Option<&str>, json: bool) -> Result<()> {
    let manager = ConnectorManager::new();
    let outcome = manager.block_port(port, protocol, interface).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    for result in &outcome.results {
        let status = if result.outcome.success {
            "ok".to_string()
        } else {
            result
                .outcome
                .error
                .clone()
                .unwrap_or_else(|| "failed".to_string())
        };
        println!("{:<14} {status}", result.chain);
    }

    if outcome.success {
        match outcome.backend {
            Some(backend) => println!("Blocked {port}/{protocol} via {backend}"),
            None => println!("Blocked {port}/{protocol}"),
        }
        Ok(())
    } else {
        bail!(
            "{}",
            outcome
                .message
                .unwrap_or_else(|| format!("failed to block {port}/{protocol}"))
        )
    }
}

pub async fn delete_rule(backend: FirewallKind, id: &str) -> Result<()> {
    let manager = ConnectorManager::new();

    if manager.firewall(backend).delete_rule(id).await {
        println!("Deleted rule {id} ({backend})");
        Ok(())
    } else {
        bail!("failed to delete rule {id} ({backend})")
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}

#[cfg(test)]
mod tests {
    use super::truncate;

    #[test]
    fn test_truncate_short_and_long() {
        assert_eq!(truncate("filter:INPUT:1", 24), "filter:INPUT:1");
        assert_eq!(truncate("abcdefgh", 5), "abcd…");
        assert_eq!(truncate("abcde", 5), "abcde");
    }

    #[test]
    fn test_truncate_cuts_on_char_boundary() {
        // Rule text can carry multibyte comments; the cut must not
        // land inside a code point.
        let raw = "tcp dport 8080 drop comment \"café réservé\"";
        let cut = truncate(raw, 32);
        assert_eq!(cut.chars().count(), 32);
        assert!(cut.ends_with('…'));
        assert_eq!(truncate("ééééé", 3), "éé…");
    }
}
