//! Port discovery and scanning connector.
//!
//! Listening sockets come from `ss -tulnp` (elevated, for process
//! attribution) with a `netstat -tuln` fallback. Remote probes are
//! plain TCP connect attempts driven by tokio, batched to bound the
//! number of in-flight sockets. Deep scans shell out to nmap when it
//! is installed.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::exec::CommandRunner;
use crate::models::{
    ConnectorInfo, ConnectorKind, ListeningPort, ScanReport, ScanResult, ScanState, ScannedPort,
};

/// Ports probed when the caller gives no explicit list.
pub const COMMON_PORTS: [u16; 23] = [
    21, 22, 23, 25, 53, 80, 110, 111, 135, 139, 143, 443, 445, 993, 995, 1723, 3306, 3389, 5432,
    5900, 8080, 8443, 8888,
];

/// Concurrent connect probes per batch.
const SCAN_BATCH_SIZE: usize = 50;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
const PUBLIC_IP_TIMEOUT: Duration = Duration::from_secs(5);
const PUBLIC_IP_URL: &str = "https://api.ipify.org?format=json";

/// Which discovery tools are installed.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ScannerStatus {
    pub ss_available: bool,
    pub netstat_available: bool,
    pub nmap_available: bool,
}

/// Connector for local listening ports and remote port probes.
pub struct PortScannerConnector<R> {
    runner: R,
}

#[derive(serde::Deserialize)]
struct IpifyResponse {
    ip: String,
}

impl<R: CommandRunner> PortScannerConnector<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    pub async fn check_availability(&self) -> ConnectorInfo {
        let tools: Vec<&str> = ["nmap", "ss", "netstat"]
            .into_iter()
            .filter(|tool| self.runner.lookup(tool).is_some())
            .collect();

        if tools.is_empty() {
            ConnectorInfo::unavailable(
                "port_scanner",
                ConnectorKind::Scanner,
                "none of nmap, ss, netstat found in PATH",
            )
        } else {
            let mut info =
                ConnectorInfo::available("port_scanner", ConnectorKind::Scanner, None);
            info.message = Some(format!("Available tools: {}", tools.join(", ")));
            info
        }
    }

    pub async fn status(&self) -> ScannerStatus {
        ScannerStatus {
            ss_available: self.runner.lookup("ss").is_some(),
            netstat_available: self.runner.lookup("netstat").is_some(),
            nmap_available: self.runner.lookup("nmap").is_some(),
        }
    }

    /// Enumerate listening sockets with interface attribution.
    pub async fn listening_ports(&self) -> Vec<ListeningPort> {
        if let Some(ss) = self.runner.lookup("ss") {
            // Elevated so process names resolve for all owners.
            let output = self
                .runner
                .run(&ss.to_string_lossy(), &["-tulnp"], true)
                .await;
            if output.success() {
                let interfaces = self.interface_map().await;
                return parse_ss(&output.stdout, &interfaces);
            }
        }

        if let Some(netstat) = self.runner.lookup("netstat") {
            let output = self
                .runner
                .run(&netstat.to_string_lossy(), &["-tuln"], false)
                .await;
            if output.success() {
                let interfaces = self.interface_map().await;
                return parse_netstat(&output.stdout, &interfaces);
            }
        }

        Vec::new()
    }

    /// Probe a single TCP port with a connect attempt.
    pub async fn scan_port(
        &self,
        host: &str,
        port: u16,
        timeout: Option<Duration>,
    ) -> ScanResult {
        probe(host.to_string(), port, timeout.unwrap_or(CONNECT_TIMEOUT)).await
    }

    /// Probe many ports in bounded batches. Falls back to
    /// [`COMMON_PORTS`] when `ports` is empty.
    pub async fn scan_ports(
        &self,
        host: &str,
        ports: &[u16],
        timeout: Option<Duration>,
    ) -> Vec<ScanResult> {
        let ports: Vec<u16> = if ports.is_empty() {
            COMMON_PORTS.to_vec()
        } else {
            ports.to_vec()
        };
        let timeout = timeout.unwrap_or(CONNECT_TIMEOUT);

        let host_owned = host.to_string();
        run_batched(host, &ports, move |port| {
            probe(host_owned.clone(), port, timeout)
        })
        .await
    }

    /// Run a deep nmap scan over a port range and parse its report.
    pub async fn scan_with_nmap(
        &self,
        host: &str,
        ports: Option<&str>,
        options: &[&str],
    ) -> Result<ScanReport> {
        let Some(nmap) = self.runner.lookup("nmap") else {
            return Err(Error::Unavailable("nmap not found in PATH".to_string()));
        };

        let mut args: Vec<&str> = if options.is_empty() {
            vec!["-sT", "-sV", "--open"]
        } else {
            options.to_vec()
        };
        args.push("-p");
        args.push(ports.unwrap_or("1-1000"));
        args.push(host);

        let output = self.runner.run(&nmap.to_string_lossy(), &args, true).await;
        if !output.success() {
            return Err(Error::CommandFailed(output.error_message()));
        }
        Ok(parse_nmap(&output.stdout))
    }

    /// Resolve this host's public IP address, or `None` when it cannot
    /// be determined.
    pub async fn public_ip(&self) -> Option<String> {
        if let Ok(client) = reqwest::Client::builder()
            .timeout(PUBLIC_IP_TIMEOUT)
            .build()
        {
            if let Ok(response) = client.get(PUBLIC_IP_URL).send().await {
                if let Ok(body) = response.json::<IpifyResponse>().await {
                    return Some(body.ip);
                }
            }
        }

        // No HTTP stack reachable; try curl the way an operator would.
        if let Some(curl) = self.runner.lookup("curl") {
            let output = self
                .runner
                .run(
                    &curl.to_string_lossy(),
                    &["-s", "https://api.ipify.org"],
                    false,
                )
                .await;
            if output.success() {
                let ip = output.stdout.trim();
                if !ip.is_empty() {
                    return Some(ip.to_string());
                }
            }
        }

        None
    }

    /// Probe this host's public address from the outside-in view.
    pub async fn scan_public_ports(&self, ports: &[u16]) -> Result<Vec<ScanResult>> {
        let ip = self.public_ip().await.ok_or_else(|| {
            Error::Unavailable("could not determine public IP address".to_string())
        })?;
        Ok(self.scan_ports(&ip, ports, None).await)
    }

    /// Map local addresses to owning interface names, parsed from the
    /// plain `ip addr show` listing.
    async fn interface_map(&self) -> HashMap<String, String> {
        let Some(ip) = self.runner.lookup("ip") else {
            return HashMap::new();
        };
        let output = self
            .runner
            .run(&ip.to_string_lossy(), &["addr", "show"], false)
            .await;
        if !output.success() {
            return HashMap::new();
        }
        parse_interface_map(&output.stdout)
    }
}

async fn probe(host: String, port: u16, connect_timeout: Duration) -> ScanResult {
    let target = format!("{host}:{port}");
    let addr: SocketAddr = match tokio::net::lookup_host(&target).await {
        Ok(mut addrs) => match addrs.next() {
            Some(addr) => addr,
            None => return ScanResult::new(&host, port, ScanState::Error),
        },
        Err(_) => return ScanResult::new(&host, port, ScanState::Error),
    };

    match timeout(connect_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => ScanResult::new(&host, port, ScanState::Open),
        Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => {
            ScanResult::new(&host, port, ScanState::Closed)
        }
        Ok(Err(_)) => ScanResult::new(&host, port, ScanState::Error),
        Err(_) => ScanResult::new(&host, port, ScanState::Filtered),
    }
}

/// Spawn one probe per port, at most [`SCAN_BATCH_SIZE`] in flight:
/// every task of a batch is joined before the next batch spawns.
/// Results keep the input order; a panicked task degrades to an
/// error result for its port.
async fn run_batched<F, Fut>(host: &str, ports: &[u16], make_probe: F) -> Vec<ScanResult>
where
    F: Fn(u16) -> Fut,
    Fut: Future<Output = ScanResult> + Send + 'static,
{
    let mut results = Vec::with_capacity(ports.len());
    for batch in ports.chunks(SCAN_BATCH_SIZE) {
        let handles: Vec<_> = batch
            .iter()
            .map(|&port| tokio::spawn(make_probe(port)))
            .collect();
        for (handle, &port) in handles.into_iter().zip(batch) {
            match handle.await {
                Ok(result) => results.push(result),
                Err(_) => results.push(ScanResult::new(host, port, ScanState::Error)),
            }
        }
    }
    results
}

fn parse_ss(output: &str, interfaces: &HashMap<String, String>) -> Vec<ListeningPort> {
    let process_re = regex::Regex::new(r#"\(\("([^"]+)",pid=(\d+)"#).unwrap();
    let mut ports = Vec::new();

    for line in output.lines().skip(1) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 5 {
            continue;
        }

        let protocol = if parts[0].contains("tcp") {
            "tcp"
        } else if parts[0].contains("udp") {
            "udp"
        } else {
            continue;
        };

        let Some((ip, port)) = split_local_address(parts[4]) else {
            continue;
        };

        let (process, pid) = parts
            .get(6)
            .and_then(|field| process_re.captures(field))
            .map(|caps| (Some(caps[1].to_string()), caps[2].parse().ok()))
            .unwrap_or((None, None));

        ports.push(attribute(ip, port, protocol, process, pid, interfaces));
    }

    ports
}

fn parse_netstat(output: &str, interfaces: &HashMap<String, String>) -> Vec<ListeningPort> {
    let mut ports = Vec::new();

    for line in output.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 {
            continue;
        }

        let protocol = if parts[0].starts_with("tcp") {
            "tcp"
        } else if parts[0].starts_with("udp") {
            "udp"
        } else {
            continue;
        };

        let Some((ip, port)) = split_local_address(parts[3]) else {
            continue;
        };

        ports.push(attribute(ip, port, protocol, None, None, interfaces));
    }

    ports
}

/// Split `"addr:port"`, handling bracketed IPv6 and the `*` wildcard.
fn split_local_address(local: &str) -> Option<(String, u16)> {
    let (addr, port) = local.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    // Strip brackets and any %zone suffix.
    let addr = addr
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split('%')
        .next()
        .unwrap_or("")
        .to_string();
    let addr = if addr == "*" { "0.0.0.0".to_string() } else { addr };
    Some((addr, port))
}

fn attribute(
    ip: String,
    port: u16,
    protocol: &str,
    process: Option<String>,
    pid: Option<u32>,
    interfaces: &HashMap<String, String>,
) -> ListeningPort {
    let wildcard = matches!(ip.as_str(), "0.0.0.0" | "::" | "");
    let interface = if wildcard {
        "all".to_string()
    } else {
        interfaces
            .get(&ip)
            .cloned()
            .unwrap_or_else(|| "unknown".to_string())
    };

    ListeningPort {
        ip,
        port,
        protocol: protocol.to_string(),
        process,
        pid,
        interface,
        is_public: wildcard,
    }
}

/// Build an address-to-interface map from the plain `ip addr show`
/// listing. Interface headers are `N: name: <flags>`; address lines
/// are indented `inet`/`inet6` entries.
fn parse_interface_map(output: &str) -> HashMap<String, String> {
    let header_re = regex::Regex::new(r"^\d+:\s+([^:@]+)[@:]").unwrap();
    let mut map = HashMap::new();
    let mut current: Option<String> = None;

    for line in output.lines() {
        if let Some(caps) = header_re.captures(line) {
            current = Some(caps[1].trim().to_string());
            continue;
        }
        let trimmed = line.trim();
        let addr = trimmed
            .strip_prefix("inet6 ")
            .or_else(|| trimmed.strip_prefix("inet "));
        if let (Some(addr), Some(iface)) = (addr, &current) {
            let ip = addr
                .split_whitespace()
                .next()
                .and_then(|cidr| cidr.split('/').next());
            if let Some(ip) = ip {
                map.insert(ip.to_string(), iface.clone());
            }
        }
    }

    map
}

fn parse_nmap(output: &str) -> ScanReport {
    let host_re = regex::Regex::new(r"Nmap scan report for (\S+)").unwrap();
    let port_re = regex::Regex::new(r"^(\d+)/(\w+)\s+(\w+)\s+(\S+)\s*(.*)").unwrap();

    let mut report = ScanReport {
        raw: output.to_string(),
        ..ScanReport::default()
    };

    for line in output.lines() {
        if let Some(caps) = host_re.captures(line) {
            report.host = Some(caps[1].to_string());
        } else if line.contains("Host is up") {
            report.state = Some("up".to_string());
        } else if let Some(caps) = port_re.captures(line.trim()) {
            let Ok(port) = caps[1].parse() else { continue };
            let version = caps[5].trim();
            report.ports.push(ScannedPort {
                port,
                protocol: caps[2].to_string(),
                state: caps[3].to_string(),
                service: caps[4].to_string(),
                version: (!version.is_empty()).then(|| version.to_string()),
            });
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::MockRunner;

    const SS_LISTING: &str = "\
Netid State  Recv-Q Send-Q Local Address:Port Peer Address:Port Process
udp   UNCONN 0      0      127.0.0.53%lo:53   0.0.0.0:*          users:((\"systemd-resolve\",pid=612,fd=13))
tcp   LISTEN 0      128    0.0.0.0:22         0.0.0.0:*          users:((\"sshd\",pid=901,fd=3))
tcp   LISTEN 0      511    192.168.1.10:80    0.0.0.0:*          users:((\"nginx\",pid=1200,fd=6))
tcp   LISTEN 0      128    [::]:22            [::]:*             users:((\"sshd\",pid=901,fd=4))
tcp   LISTEN 0      100    127.0.0.1:5432     0.0.0.0:*
";

    const IP_ADDR: &str = "\
1: lo: <LOOPBACK,UP,LOWER_UP> mtu 65536 qdisc noqueue state UNKNOWN
    inet 127.0.0.1/8 scope host lo
2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc fq_codel state UP
    inet 192.168.1.10/24 brd 192.168.1.255 scope global eth0
    inet6 fe80::5054:ff:fe12:3456/64 scope link
";

    const NMAP_REPORT: &str = "\
Starting Nmap 7.94 ( https://nmap.org )
Nmap scan report for scanme.example.org (192.0.2.7)
Host is up (0.024s latency).
Not shown: 997 closed tcp ports (conn-refused)
PORT     STATE SERVICE VERSION
22/tcp   open  ssh     OpenSSH 8.9p1 Ubuntu
80/tcp   open  http    nginx 1.18.0
3306/tcp open  mysql
";

    fn scanner(runner: MockRunner) -> PortScannerConnector<MockRunner> {
        PortScannerConnector::new(runner)
    }

    #[tokio::test]
    async fn test_parse_ss_listing() {
        let runner = MockRunner::new(&["ss", "ip"])
            .with_stdout("ss -tulnp", SS_LISTING)
            .with_stdout("ip addr show", IP_ADDR);
        let ports = scanner(runner).listening_ports().await;

        assert_eq!(ports.len(), 5);

        let sshd = &ports[1];
        assert_eq!(sshd.port, 22);
        assert_eq!(sshd.ip, "0.0.0.0");
        assert_eq!(sshd.interface, "all");
        assert!(sshd.is_public);
        assert_eq!(sshd.process.as_deref(), Some("sshd"));
        assert_eq!(sshd.pid, Some(901));

        let nginx = &ports[2];
        assert_eq!(nginx.interface, "eth0");
        assert!(!nginx.is_public);

        let v6 = &ports[3];
        assert_eq!(v6.ip, "::");
        assert_eq!(v6.interface, "all");
        assert!(v6.is_public);

        // Process column may be absent entirely.
        let postgres = &ports[4];
        assert_eq!(postgres.port, 5432);
        assert_eq!(postgres.interface, "lo");
        assert!(postgres.process.is_none());
    }

    #[tokio::test]
    async fn test_netstat_fallback() {
        let listing = "\
Active Internet connections (only servers)
Proto Recv-Q Send-Q Local Address           Foreign Address         State
tcp        0      0 0.0.0.0:22              0.0.0.0:*               LISTEN
tcp6       0      0 :::80                   :::*                    LISTEN
udp        0      0 127.0.0.53:53           0.0.0.0:*
";
        let runner = MockRunner::new(&["netstat", "ip"])
            .with_stdout("netstat -tuln", listing)
            .with_stdout("ip addr show", IP_ADDR);
        let ports = scanner(runner).listening_ports().await;

        assert_eq!(ports.len(), 3);
        assert_eq!(ports[0].port, 22);
        assert_eq!(ports[1].ip, "::");
        assert!(ports[1].is_public);
        assert_eq!(ports[2].protocol, "udp");
        assert!(ports.iter().all(|p| p.process.is_none()));
    }

    #[tokio::test]
    async fn test_ss_runs_elevated() {
        let runner = MockRunner::new(&["ss"]).with_stdout("ss -tulnp", "header\n");
        let connector = scanner(runner.clone());
        connector.listening_ports().await;

        let calls = runner.calls();
        assert_eq!(calls[0].1, "-tulnp");
        assert!(calls[0].2);
    }

    #[tokio::test]
    async fn test_scan_port_open_and_closed() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let connector = scanner(MockRunner::new(&[]));

        let result = connector.scan_port("127.0.0.1", port, None).await;
        assert_eq!(result.state, ScanState::Open);
        assert_eq!(result.protocol, "tcp");

        drop(listener);
        let result = connector.scan_port("127.0.0.1", port, None).await;
        assert_eq!(result.state, ScanState::Closed);
    }

    #[tokio::test]
    async fn test_scan_ports_defaults_to_common_list() {
        let connector = scanner(MockRunner::new(&[]));
        let results = connector.scan_ports("127.0.0.1", &[], None).await;
        assert_eq!(results.len(), COMMON_PORTS.len());
        let probed: Vec<u16> = results.iter().map(|r| r.port).collect();
        assert_eq!(probed, COMMON_PORTS);
    }

    #[tokio::test]
    async fn test_scan_ports_batches_preserve_order_and_count() {
        let connector = scanner(MockRunner::new(&[]));
        let ports: Vec<u16> = (20000..20120).collect();
        let results = connector.scan_ports("127.0.0.1", &ports, None).await;

        assert_eq!(results.len(), 120);
        let probed: Vec<u16> = results.iter().map(|r| r.port).collect();
        assert_eq!(probed, ports);
        assert!(results.iter().all(|r| r.state != ScanState::Open));
    }

    #[tokio::test]
    async fn test_run_batched_bounds_in_flight_tasks() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::{Arc, Mutex};

        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));
        // How many earlier tasks had finished when each one started.
        let started_after = Arc::new(Mutex::new(Vec::new()));

        let ports: Vec<u16> = (1..=120).collect();
        let results = run_batched("127.0.0.1", &ports, |port| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            let completed = Arc::clone(&completed);
            let started_after = Arc::clone(&started_after);
            async move {
                started_after
                    .lock()
                    .unwrap()
                    .push(completed.load(Ordering::SeqCst));
                let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(current, Ordering::SeqCst);
                tokio::task::yield_now().await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                completed.fetch_add(1, Ordering::SeqCst);
                ScanResult::new("127.0.0.1", port, ScanState::Closed)
            }
        })
        .await;

        assert_eq!(results.len(), 120);
        assert!(peak.load(Ordering::SeqCst) <= SCAN_BATCH_SIZE);

        // Each batch is fully drained before the next one starts, so
        // tasks launch in waves of 50, 50 and 20.
        let expected: Vec<usize> = std::iter::repeat(0)
            .take(50)
            .chain(std::iter::repeat(50).take(50))
            .chain(std::iter::repeat(100).take(20))
            .collect();
        assert_eq!(*started_after.lock().unwrap(), expected);
    }

    #[test]
    fn test_parse_nmap_report() {
        let report = parse_nmap(NMAP_REPORT);
        assert_eq!(report.host.as_deref(), Some("scanme.example.org"));
        assert_eq!(report.state.as_deref(), Some("up"));
        assert_eq!(report.ports.len(), 3);

        let ssh = &report.ports[0];
        assert_eq!(ssh.port, 22);
        assert_eq!(ssh.state, "open");
        assert_eq!(ssh.service, "ssh");
        assert_eq!(ssh.version.as_deref(), Some("OpenSSH 8.9p1 Ubuntu"));

        let mysql = &report.ports[2];
        assert_eq!(mysql.service, "mysql");
        assert!(mysql.version.is_none());

        assert_eq!(report.raw, NMAP_REPORT);
    }

    #[tokio::test]
    async fn test_nmap_missing_is_unavailable() {
        let connector = scanner(MockRunner::new(&["ss"]));
        let err = connector
            .scan_with_nmap("127.0.0.1", None, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_nmap_default_options_and_port_range() {
        let runner = MockRunner::new(&["nmap"])
            .with_stdout("nmap -sT -sV --open -p 1-1000 127.0.0.1", NMAP_REPORT);
        let connector = scanner(runner.clone());

        let report = connector
            .scan_with_nmap("127.0.0.1", None, &[])
            .await
            .unwrap();
        assert_eq!(report.ports.len(), 3);
        assert_eq!(runner.calls()[0].1, "-sT -sV --open -p 1-1000 127.0.0.1");
    }

    #[test]
    fn test_interface_map_handles_vlan_suffix() {
        let output = "\
3: eth0.100@eth0: <BROADCAST,MULTICAST,UP> mtu 1500
    inet 10.0.100.2/24 scope global eth0.100
";
        let map = parse_interface_map(output);
        assert_eq!(map.get("10.0.100.2").map(String::as_str), Some("eth0.100"));
    }

    #[test]
    fn test_split_local_address_forms() {
        assert_eq!(
            split_local_address("192.168.1.10:80"),
            Some(("192.168.1.10".to_string(), 80))
        );
        assert_eq!(split_local_address("[::]:22"), Some(("::".to_string(), 22)));
        assert_eq!(split_local_address("*:443"), Some(("0.0.0.0".to_string(), 443)));
        assert_eq!(
            split_local_address("127.0.0.53%lo:53"),
            Some(("127.0.0.53".to_string(), 53))
        );
        assert_eq!(split_local_address("no-port"), None);
    }

    #[tokio::test]
    async fn test_availability_lists_tools() {
        let connector = scanner(MockRunner::new(&["ss", "nmap"]));
        let info = connector.check_availability().await;
        assert!(info.is_available());
        assert_eq!(info.message.as_deref(), Some("Available tools: nmap, ss"));

        let connector = scanner(MockRunner::new(&[]));
        assert!(!connector.check_availability().await.is_available());
    }
}
