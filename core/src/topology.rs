//! Network topology graph.
//!
//! Builds a deterministic node/edge graph from interface and route
//! listings: the local host in the middle, one node per non-loopback
//! interface, plus gateway and destination-network nodes from the
//! routing table. Nodes and edges are deduplicated and sorted so equal
//! inputs always produce byte-equal graphs.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::models::{NetworkInterface, Route};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Host,
    Interface,
    Gateway,
    Network,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// Host to one of its interfaces.
    Interface,
    /// Interface to a gateway it routes through.
    Route,
    /// Interface to a directly attached network.
    Direct,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyNode {
    pub id: String,
    pub label: String,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopologyEdge {
    pub source: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyGraph {
    pub nodes: Vec<TopologyNode>,
    pub edges: Vec<TopologyEdge>,
}

/// Build the topology graph from live interface and route listings.
///
/// The loopback interface is omitted. Routes whose device has no
/// interface node (or no device at all) are skipped rather than left
/// dangling.
pub fn build_topology(interfaces: &[NetworkInterface], routes: &[Route]) -> TopologyGraph {
    // BTree keyed by id for dedupe and deterministic order.
    let mut nodes: BTreeMap<String, TopologyNode> = BTreeMap::new();
    let mut edges: BTreeSet<TopologyEdge> = BTreeSet::new();

    nodes.insert(
        "localhost".to_string(),
        TopologyNode {
            id: "localhost".to_string(),
            label: "This Host".to_string(),
            kind: NodeKind::Host,
        },
    );

    for interface in interfaces {
        if interface.name == "lo" {
            continue;
        }
        let id = format!("iface_{}", interface.name);
        let label = match interface.ipv4.first() {
            Some(addr) => format!("{} ({})", interface.name, addr.address),
            None => interface.name.clone(),
        };
        nodes.insert(
            id.clone(),
            TopologyNode {
                id: id.clone(),
                label,
                kind: NodeKind::Interface,
            },
        );
        edges.insert(TopologyEdge {
            source: "localhost".to_string(),
            target: id,
            label: Some(interface.state.clone()),
            kind: EdgeKind::Interface,
        });
    }

    for route in routes {
        let Some(device) = &route.device else {
            continue;
        };
        let iface_id = format!("iface_{device}");
        if !nodes.contains_key(&iface_id) {
            continue;
        }

        if let Some(gateway) = &route.gateway {
            let gw_id = format!("gw_{gateway}");
            nodes.entry(gw_id.clone()).or_insert_with(|| TopologyNode {
                id: gw_id.clone(),
                label: format!("Gateway {gateway}"),
                kind: NodeKind::Gateway,
            });
            edges.insert(TopologyEdge {
                source: iface_id.clone(),
                target: gw_id,
                label: Some(route.destination.clone()),
                kind: EdgeKind::Route,
            });
        }

        if route.destination != "default" {
            let net_id = format!("net_{}", route.destination);
            nodes.entry(net_id.clone()).or_insert_with(|| TopologyNode {
                id: net_id.clone(),
                label: route.destination.clone(),
                kind: NodeKind::Network,
            });
            // Gatewayed destinations hang off the gateway, directly
            // attached ones off the interface.
            let edge = match &route.gateway {
                Some(gateway) => TopologyEdge {
                    source: format!("gw_{gateway}"),
                    target: net_id,
                    label: None,
                    kind: EdgeKind::Route,
                },
                None => TopologyEdge {
                    source: iface_id,
                    target: net_id,
                    label: None,
                    kind: EdgeKind::Direct,
                },
            };
            edges.insert(edge);
        }
    }

    TopologyGraph {
        nodes: nodes.into_values().collect(),
        edges: edges.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InterfaceAddress;

    fn iface(name: &str, addr: Option<&str>) -> NetworkInterface {
        NetworkInterface {
            name: name.to_string(),
            index: 1,
            state: "UP".to_string(),
            mtu: Some(1500),
            mac: None,
            link_type: None,
            flags: Vec::new(),
            ipv4: addr
                .map(|a| {
                    vec![InterfaceAddress {
                        address: a.to_string(),
                        prefix: 24,
                        broadcast: None,
                        scope: None,
                    }]
                })
                .unwrap_or_default(),
            ipv6: Vec::new(),
        }
    }

    fn route(dest: &str, gateway: Option<&str>, device: &str) -> Route {
        Route {
            id: format!("{dest}@{device}"),
            destination: dest.to_string(),
            gateway: gateway.map(str::to_string),
            device: Some(device.to_string()),
            table: "main".to_string(),
            protocol: None,
            scope: None,
            metric: None,
            prefsrc: None,
            route_type: "unicast".to_string(),
            flags: Vec::new(),
        }
    }

    #[test]
    fn test_basic_graph_shape() {
        let interfaces = vec![
            iface("lo", Some("127.0.0.1")),
            iface("eth0", Some("192.168.1.10")),
        ];
        let routes = vec![
            route("default", Some("192.168.1.1"), "eth0"),
            route("192.168.1.0/24", None, "eth0"),
        ];

        let graph = build_topology(&interfaces, &routes);

        let ids: Vec<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "gw_192.168.1.1",
                "iface_eth0",
                "localhost",
                "net_192.168.1.0/24"
            ]
        );
        assert!(!ids.contains(&"iface_lo"));
        assert_eq!(graph.edges.len(), 3);

        let iface_node = graph.nodes.iter().find(|n| n.id == "iface_eth0").unwrap();
        assert_eq!(iface_node.label, "eth0 (192.168.1.10)");
    }

    #[test]
    fn test_routes_without_known_device_are_skipped() {
        let interfaces = vec![iface("eth0", Some("192.168.1.10"))];
        let routes = vec![
            route("default", Some("10.0.0.1"), "wg0"),
            Route {
                device: None,
                ..route("10.9.0.0/16", None, "eth0")
            },
        ];

        let graph = build_topology(&interfaces, &routes);
        assert!(graph.edges.iter().all(|e| e.kind == EdgeKind::Interface));
        assert!(graph.nodes.iter().all(|n| n.kind != NodeKind::Gateway));
    }

    #[test]
    fn test_graph_is_deterministic() {
        let interfaces = vec![
            iface("eth1", Some("10.0.0.2")),
            iface("eth0", Some("192.168.1.10")),
        ];
        let routes = vec![
            route("192.168.1.0/24", None, "eth0"),
            route("default", Some("192.168.1.1"), "eth0"),
            route("10.0.0.0/24", None, "eth1"),
        ];

        let forward = build_topology(&interfaces, &routes);

        let mut reversed_ifaces = interfaces.clone();
        reversed_ifaces.reverse();
        let mut reversed_routes = routes.clone();
        reversed_routes.reverse();
        let reversed = build_topology(&reversed_ifaces, &reversed_routes);

        assert_eq!(forward, reversed);
    }

    #[test]
    fn test_duplicate_gateways_collapse() {
        let interfaces = vec![iface("eth0", Some("192.168.1.10"))];
        let routes = vec![
            route("default", Some("192.168.1.1"), "eth0"),
            route("10.0.0.0/8", Some("192.168.1.1"), "eth0"),
        ];

        let graph = build_topology(&interfaces, &routes);
        let gateways = graph
            .nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Gateway)
            .count();
        assert_eq!(gateways, 1);

        // Both destinations keep their interface-to-gateway edges, and
        // the non-default one hangs off the gateway as a network.
        let iface_to_gw = graph
            .edges
            .iter()
            .filter(|e| e.source == "iface_eth0" && e.target == "gw_192.168.1.1")
            .count();
        assert_eq!(iface_to_gw, 2);
        assert!(graph
            .edges
            .iter()
            .any(|e| e.source == "gw_192.168.1.1" && e.target == "net_10.0.0.0/8"));
    }
}
