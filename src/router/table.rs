//! Routing and service capacity tables.
//!
//! Plain data structures; the router serializes access to both under its
//! table lock. `last_seen` is refreshed on every advertisement but nothing
//! expires on it.

use std::collections::BTreeMap;
use std::time::Instant;

use crate::transport::ChannelId;

/// How to reach one remote address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteNodeInfo {
    pub address: String,
    /// Neighbor the route was learned from.
    pub next_hop: String,
    /// Channel that neighbor is attached on.
    pub channel: ChannelId,
    /// Hop count, never 0 for a stored route.
    pub cost: u16,
    pub last_seen: Instant,
}

/// Outcome of offering a route advertisement to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteUpdate {
    /// No previous route.
    Added,
    /// Lower cost than the stored route.
    Improved,
    /// Not better than the stored route; only `last_seen` changed.
    Ignored,
}

impl RouteUpdate {
    pub fn accepted(self) -> bool {
        !matches!(self, RouteUpdate::Ignored)
    }
}

#[derive(Debug, Default)]
pub struct RoutingTable {
    nodes: BTreeMap<String, RemoteNodeInfo>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &str) -> Option<&RemoteNodeInfo> {
        self.nodes.get(address)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.nodes.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Keep the advertised route if it is new or cheaper than the stored one.
    /// `cost` must be nonzero.
    pub fn offer(&mut self, address: &str, next_hop: &str, channel: ChannelId, cost: u16) -> RouteUpdate {
        let now = Instant::now();
        match self.nodes.get_mut(address) {
            Some(node) => {
                node.last_seen = now;
                if cost < node.cost {
                    node.next_hop = next_hop.to_owned();
                    node.channel = channel;
                    node.cost = cost;
                    RouteUpdate::Improved
                } else {
                    RouteUpdate::Ignored
                }
            }
            None => {
                self.nodes.insert(
                    address.to_owned(),
                    RemoteNodeInfo {
                        address: address.to_owned(),
                        next_hop: next_hop.to_owned(),
                        channel,
                        cost,
                        last_seen: now,
                    },
                );
                RouteUpdate::Added
            }
        }
    }

    pub fn remove(&mut self, address: &str) -> Option<RemoteNodeInfo> {
        self.nodes.remove(address)
    }

    /// Delete every route learned over `channel`, returning their addresses.
    pub fn remove_channel(&mut self, channel: ChannelId) -> Vec<String> {
        let lost: Vec<String> = self
            .nodes
            .values()
            .filter(|n| n.channel == channel)
            .map(|n| n.address.clone())
            .collect();
        for address in &lost {
            self.nodes.remove(address);
        }
        lost
    }

    pub fn iter(&self) -> impl Iterator<Item = &RemoteNodeInfo> {
        self.nodes.values()
    }
}

/// Capacity advertised for one (service, address) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityEntry {
    pub capacity: u16,
    pub last_seen: Instant,
}

/// Outcome of applying a SERVICE advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityUpdate {
    Added,
    Changed,
    Removed,
    /// Same capacity already recorded, or withdrawal of an unknown entry.
    Redundant,
}

impl CapacityUpdate {
    pub fn changed(self) -> bool {
        !matches!(self, CapacityUpdate::Redundant)
    }
}

#[derive(Debug, Default)]
pub struct ServiceCapacityTable {
    services: BTreeMap<String, BTreeMap<String, CapacityEntry>>,
}

impl ServiceCapacityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, service: &str, address: &str, capacity: u16) -> CapacityUpdate {
        if capacity == 0 {
            let Some(hosts) = self.services.get_mut(service) else {
                return CapacityUpdate::Redundant;
            };
            if hosts.remove(address).is_none() {
                return CapacityUpdate::Redundant;
            }
            if hosts.is_empty() {
                self.services.remove(service);
            }
            return CapacityUpdate::Removed;
        }

        let hosts = self.services.entry(service.to_owned()).or_default();
        let entry = CapacityEntry {
            capacity,
            last_seen: Instant::now(),
        };
        match hosts.insert(address.to_owned(), entry) {
            None => CapacityUpdate::Added,
            Some(prev) if prev.capacity == capacity => {
                // keep the earlier timestamp; redundant adverts are not refreshes
                hosts.insert(address.to_owned(), prev);
                CapacityUpdate::Redundant
            }
            Some(_) => CapacityUpdate::Changed,
        }
    }

    /// Drop every entry for `address`, returning the affected services.
    pub fn remove_address(&mut self, address: &str) -> Vec<String> {
        let mut affected = Vec::new();
        self.services.retain(|service, hosts| {
            if hosts.remove(address).is_some() {
                affected.push(service.clone());
            }
            !hosts.is_empty()
        });
        affected
    }

    pub fn get(&self, service: &str, address: &str) -> Option<&CapacityEntry> {
        self.services.get(service).and_then(|h| h.get(address))
    }

    /// Remote addresses with a nonzero capacity for `service`.
    pub fn addresses(&self, service: &str) -> Vec<String> {
        self.services
            .get(service)
            .map(|h| h.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Remote address with the lowest advertised capacity for `service`.
    pub fn least_loaded(&self, service: &str) -> Option<&str> {
        self.services
            .get(service)?
            .iter()
            .min_by_key(|(_, e)| e.capacity)
            .map(|(addr, _)| addr.as_str())
    }

    pub fn has_service(&self, service: &str) -> bool {
        self.services.get(service).is_some_and(|h| !h.is_empty())
    }

    /// `(service, address, entry)` for every recorded capacity.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &CapacityEntry)> {
        self.services.iter().flat_map(|(service, hosts)| {
            hosts
                .iter()
                .map(move |(addr, e)| (service.as_str(), addr.as_str(), e))
        })
    }
}
