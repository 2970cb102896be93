//! fwbridge CLI - Inspect and control firewall and routing state
//!
//! A command-line frontend over the fwbridge connectors: firewall
//! rules, routes, policy rules, neighbors and port scans.

mod commands;

use clap::{Parser, Subcommand};
use fwbridge_core::FirewallKind;

#[derive(Parser)]
#[command(name = "fwbridge")]
#[command(author, version, about = "Inspect and control firewall and routing state")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which backend tools are available
    Connectors,

    /// List firewall rules
    Rules {
        /// Backend to query (ufw, iptables, nftables, firewalld);
        /// defaults to the preferred available backend
        #[arg(short, long)]
        backend: Option<FirewallKind>,
    },

    /// Block inbound traffic to a port
    Block {
        /// Port number to block
        port: u16,

        /// Protocol
        #[arg(short, long, default_value = "tcp")]
        protocol: String,

        /// Restrict to one interface
        #[arg(short, long)]
        interface: Option<String>,
    },

    /// Delete a firewall rule by its backend-specific id
    DeleteRule {
        /// Backend owning the rule
        backend: FirewallKind,

        /// Rule id, e.g. "3" (ufw), "filter:INPUT:3" (iptables),
        /// "inet:filter:input:7" (nftables), "public:port:80/tcp"
        /// (firewalld)
        id: String,
    },

    /// List network interfaces
    #[command(alias = "ifaces")]
    Interfaces,

    /// List routes
    Routes {
        /// Routing table to show
        #[arg(short, long, default_value = "main")]
        table: String,

        /// Show every routing table
        #[arg(long, conflicts_with = "table")]
        all: bool,
    },

    /// List policy routing rules
    PolicyRules,

    /// Show the neighbor (ARP) table
    Arp,

    /// Show interface traffic counters
    Stats {
        /// Interface name
        interface: String,
    },

    /// List listening ports
    #[command(alias = "ls")]
    Listening,

    /// Probe TCP ports on a host
    Scan {
        /// Host to scan
        host: String,

        /// Ports to probe; common ports when omitted
        #[arg(short, long, value_delimiter = ',')]
        ports: Vec<u16>,

        /// Use nmap for service detection instead of connect probes
        #[arg(long)]
        nmap: bool,
    },

    /// Show this host's public IP address
    PublicIp,

    /// Emit the network topology graph
    Graph,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Connectors => commands::connectors::run(cli.json).await?,
        Commands::Rules { backend } => commands::firewall::rules(backend, cli.json).await?,
        Commands::Block {
            port,
            protocol,
            interface,
        } => commands::firewall::block(port, &protocol, interface.as_deref(), cli.json).await?,
        Commands::DeleteRule { backend, id } => {
            commands::firewall::delete_rule(backend, &id).await?
        }
        Commands::Interfaces => commands::network::interfaces(cli.json).await?,
        Commands::Routes { table, all } => {
            let table = if all { None } else { Some(table) };
            commands::network::routes(table.as_deref(), cli.json).await?
        }
        Commands::PolicyRules => commands::network::policy_rules(cli.json).await?,
        Commands::Arp => commands::network::arp(cli.json).await?,
        Commands::Stats { interface } => commands::network::stats(&interface, cli.json).await?,
        Commands::Listening => commands::ports::listening(cli.json).await?,
        Commands::Scan { host, ports, nmap } => {
            commands::ports::scan(&host, &ports, nmap, cli.json).await?
        }
        Commands::PublicIp => commands::ports::public_ip(cli.json).await?,
        Commands::Graph => commands::network::graph(cli.json).await?,
    }

    Ok(())
}
