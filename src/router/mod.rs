//! # Router
//!
//! Forwarding and distance-vector route / service discovery for one node.
//!
//! A `Router` is a cheap handle; clones share the same node. It owns the
//! routing table, the service capacity table, local service and context
//! handlers, and the set of attached channels, all behind a single lock.
//!
//! ## Locking
//! Every operation mutates tables under the lock and records the packets it
//! wants to send in an outbox. The outbox, capacity notifications and local
//! handler calls run after the lock is released, so a slow channel or a
//! handler that calls back into the router never blocks table access.
//!
//! ## Protocol
//! - **ROUTE**: cost 0 withdraws an address; otherwise the route is kept if
//!   new or cheaper and re-advertised at cost + 1 to the other channels
//! - **SERVICE**: capacity 0 withdraws; identical capacities are dropped so
//!   adverts stop circulating
//! - **QUERY**: answered on the asking channel with the full route and
//!   service tables
//! - Losing a channel withdraws every route learned over it

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::config::{RouterConfig, DEFAULT_FIGHT_THE_LIE_DELAY};
use crate::core::packet::{CrcCheck, NetType, Packet};
use crate::error::{AlnError, Result};
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::net_state;
use crate::transport::{Channel, ChannelId, CloseCallback, PacketCallback};
use crate::utils::metrics::{RouterMetrics, RouterMetricsSnapshot};

pub mod table;


pub use table::{CapacityEntry, RemoteNodeInfo, RoutingTable, ServiceCapacityTable};

/// Called with `(service, capacity, address)` whenever a capacity changes.
pub type CapacityChangedCallback = Arc<dyn Fn(&str, u16, &str) + Send + Sync + 'static>;

/// One row of the service table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEntry {
    pub service: String,
    pub address: String,
    pub capacity: u16,
    pub last_seen: Instant,
}

type Outbox = Vec<(Arc<dyn Channel>, Packet)>;

/// Work collected under the lock and carried out after it is released.
#[derive(Default)]
struct Effects {
    outbox: Outbox,
    notices: Vec<(String, u16, String)>,
    on_capacity_changed: Option<CapacityChangedCallback>,
}

impl Effects {
    fn notify(&mut self, service: &str, capacity: u16, address: &str) {
        self.notices
            .push((service.to_owned(), capacity, address.to_owned()));
    }

    fn flush(self) {
        for (channel, packet) in self.outbox {
            channel.send(packet);
        }
        if let Some(cb) = self.on_capacity_changed {
            for (service, capacity, address) in &self.notices {
                cb(service, *capacity, address);
            }
        }
    }
}

struct RouterState {
    channels: BTreeMap<ChannelId, Arc<dyn Channel>>,
    dispatcher: Dispatcher,
    routes: RoutingTable,
    capacities: ServiceCapacityTable,
    on_capacity_changed: Option<CapacityChangedCallback>,
}

impl RouterState {
    fn effects(&self) -> Effects {
        Effects {
            on_capacity_changed: self.on_capacity_changed.clone(),
            ..Effects::default()
        }
    }

    fn broadcast(&self, packet: &Packet, out: &mut Outbox) {
        self.flood_except(None, packet, out);
    }

    fn flood_except(&self, except: Option<ChannelId>, packet: &Packet, out: &mut Outbox) {
        for (id, channel) in &self.channels {
            if Some(*id) != except {
                out.push((channel.clone(), packet.clone()));
            }
        }
    }

    /// Forget the route to `address` and everything it advertised.
    fn remove_address(&mut self, address: &str, fx: &mut Effects) -> bool {
        if self.routes.remove(address).is_none() {
            return false;
        }
        for service in self.capacities.remove_address(address) {
            fx.notify(&service, 0, address);
        }
        true
    }

    fn export_route_table(&self, local: &str) -> Vec<Packet> {
        std::iter::once((local, 1u16))
            .chain(
                self.routes
                    .iter()
                    .map(|n| (n.address.as_str(), n.cost.saturating_add(1))),
            )
            .filter_map(|(address, cost)| match net_state::route(local, address, cost) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!(address, error = %e, "route not exportable");
                    None
                }
            })
            .collect()
    }

    fn export_service_table(&self, local: &str) -> Vec<Packet> {
        let hosted = self.dispatcher.services().map(|s| (local, s, 1u16));
        let remote = self
            .capacities
            .iter()
            .map(|(service, address, e)| (address, service, e.capacity));
        hosted
            .chain(remote)
            .filter_map(|(address, service, capacity)| {
                match net_state::service(local, address, service, capacity) {
                    Ok(p) => Some(p),
                    Err(e) => {
                        warn!(service, address, error = %e, "service not exportable");
                        None
                    }
                }
            })
            .collect()
    }
}

struct RouterInner {
    address: String,
    fight_the_lie_delay: Duration,
    state: Mutex<RouterState>,
    metrics: RouterMetrics,
    next_channel_id: AtomicU64,
}

/// Handle to one ALN node.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("address", &self.inner.address)
            .field("channels", &self.num_channels())
            .finish()
    }
}

impl Router {
    pub fn new(address: impl Into<String>) -> Self {
        Self::build(address.into(), DEFAULT_FIGHT_THE_LIE_DELAY)
    }

    /// Router for the configured address, or a random one if none is set.
    pub fn from_config(config: &RouterConfig) -> Self {
        Self::build(config.resolve_address(), config.fight_the_lie_delay)
    }

    fn build(address: String, fight_the_lie_delay: Duration) -> Self {
        info!(address = %address, "router created");
        Self {
            inner: Arc::new(RouterInner {
                address,
                fight_the_lie_delay,
                state: Mutex::new(RouterState {
                    channels: BTreeMap::new(),
                    dispatcher: Dispatcher::new(),
                    routes: RoutingTable::new(),
                    capacities: ServiceCapacityTable::new(),
                    on_capacity_changed: None,
                }),
                metrics: RouterMetrics::new(),
                next_channel_id: AtomicU64::new(1),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RouterState> {
        // Every mutation leaves the tables consistent, so a panic in another
        // thread does not invalidate them.
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn address(&self) -> &str {
        &self.inner.address
    }

    pub fn metrics(&self) -> RouterMetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    pub fn log_metrics(&self) {
        self.inner.metrics.log_metrics(&self.inner.address);
    }

    // ---------------------------------------------------------------
    // Forwarding
    // ---------------------------------------------------------------

    /// Deliver `packet` locally or forward it toward its destination.
    ///
    /// An unset source is filled with this node's address. A packet with a
    /// service but no destination goes to every known provider.
    pub fn send(&self, mut packet: Packet) -> Result<()> {
        if packet.src_addr.is_empty() {
            packet.src_addr = self.inner.address.clone();
        }
        if !packet.dest_addr.is_empty() {
            return self.route(packet);
        }
        if packet.service.is_empty() {
            self.inner.metrics.packet_dropped();
            return Err(AlnError::MissingDestination);
        }

        let providers = self.service_addresses(&packet.service);
        if providers.is_empty() {
            self.inner.metrics.packet_dropped();
            debug!(service = %packet.service, "no service providers discovered");
            return Err(AlnError::NoServiceProviders(packet.service));
        }

        let mut delivered = false;
        let mut last_err = None;
        for address in providers {
            let mut copy = packet.clone();
            copy.dest_addr = address;
            match self.route(copy) {
                Ok(()) => delivered = true,
                Err(e) => {
                    debug!(service = %packet.service, error = %e, "fan-out copy dropped");
                    last_err = Some(e);
                }
            }
        }
        match last_err {
            Some(e) if !delivered => Err(e),
            _ => Ok(()),
        }
    }

    /// Single-destination step of `send`.
    fn route(&self, mut packet: Packet) -> Result<()> {
        let metrics = &self.inner.metrics;
        metrics.packet_routed();
        let local = self.inner.address.as_str();

        if packet.dest_addr == local {
            let handler = self.lock().dispatcher.resolve(&packet);
            return match handler {
                Ok(handler) => {
                    metrics.packet_delivered();
                    handler(packet);
                    Ok(())
                }
                Err(e) => {
                    metrics.packet_dropped();
                    debug!(service = %packet.service, context = packet.context_id, "service not registered");
                    Err(e)
                }
            };
        }

        if !packet.next_addr.is_empty() && packet.next_addr != local {
            metrics.packet_dropped();
            warn!(next_hop = %packet.next_addr, dest = %packet.dest_addr, "packet is unroutable; no action taken");
            return Err(AlnError::Unroutable {
                next_hop: packet.next_addr,
            });
        }

        let hop = {
            let state = self.lock();
            state.routes.get(&packet.dest_addr).and_then(|node| {
                state
                    .channels
                    .get(&node.channel)
                    .map(|ch| (ch.clone(), node.next_hop.clone()))
            })
        };
        match hop {
            Some((channel, next_hop)) => {
                trace!(dest = %packet.dest_addr, next_hop = %next_hop, "forwarding");
                packet.next_addr = next_hop;
                metrics.packet_forwarded();
                channel.send(packet);
                Ok(())
            }
            None => {
                metrics.packet_dropped();
                debug!(dest = %packet.dest_addr, "no route, dropped");
                Err(AlnError::NoRoute(packet.dest_addr))
            }
        }
    }

    // ---------------------------------------------------------------
    // Local services and contexts
    // ---------------------------------------------------------------

    /// Host `service` on this node and advertise it on every channel.
    pub fn register_service<F>(&self, service: &str, handler: F) -> Result<()>
    where
        F: Fn(Packet) + Send + Sync + 'static,
    {
        let local = self.inner.address.as_str();
        let advert = net_state::service(local, local, service, 1)?;
        let fx = {
            let mut state = self.lock();
            state.dispatcher.register_service(service, Arc::new(handler));
            let mut fx = state.effects();
            fx.notify(service, 1, local);
            state.broadcast(&advert, &mut fx.outbox);
            fx
        };
        info!(service, "service registered");
        fx.flush();
        Ok(())
    }

    /// Stop hosting `service` and advertise the withdrawal. Returns false if
    /// it was not registered.
    pub fn unregister_service(&self, service: &str) -> bool {
        let local = self.inner.address.as_str();
        let fx = {
            let mut state = self.lock();
            if !state.dispatcher.unregister_service(service) {
                return false;
            }
            let mut fx = state.effects();
            fx.notify(service, 0, local);
            match net_state::service(local, local, service, 0) {
                Ok(p) => state.broadcast(&p, &mut fx.outbox),
                Err(e) => warn!(service, error = %e, "withdrawal not encodable"),
            }
            fx
        };
        info!(service, "service unregistered");
        fx.flush();
        true
    }

    /// Register a handler for replies carrying the returned context id. The
    /// id stays reserved until `release_context`.
    pub fn register_context_handler<F>(&self, handler: F) -> Result<u16>
    where
        F: Fn(Packet) + Send + Sync + 'static,
    {
        self.lock().dispatcher.register_context(Arc::new(handler))
    }

    pub fn release_context(&self, context_id: u16) -> bool {
        self.lock().dispatcher.release_context(context_id)
    }

    pub fn set_on_service_capacity_changed<F>(&self, callback: F)
    where
        F: Fn(&str, u16, &str) + Send + Sync + 'static,
    {
        self.lock().on_capacity_changed = Some(Arc::new(callback));
    }

    // ---------------------------------------------------------------
    // Channels
    // ---------------------------------------------------------------

    pub fn add_channel<C: Channel + 'static>(&self, channel: C) -> ChannelId {
        self.add_shared_channel(Arc::new(channel))
    }

    /// Attach `channel`, wire its callbacks to this router and ask the peer
    /// for its tables.
    pub fn add_shared_channel(&self, channel: Arc<dyn Channel>) -> ChannelId {
        let id = ChannelId(self.inner.next_channel_id.fetch_add(1, Ordering::Relaxed));
        self.lock().channels.insert(id, channel.clone());
        self.inner.metrics.channel_added();
        info!(channel = %id, "channel added");

        let weak = Arc::downgrade(&self.inner);
        let on_packet: PacketCallback = Arc::new(move |packet| {
            if let Some(inner) = weak.upgrade() {
                Router { inner }.on_channel_packet(id, packet);
            }
        });
        let weak = Arc::downgrade(&self.inner);
        let on_closed: CloseCallback = Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                Router { inner }.remove_channel(id);
            }
        });
        channel.receive(on_packet, on_closed);
        channel.send(net_state::query(&self.inner.address));
        id
    }

    /// Detach a channel and withdraw every route that used it. Returns false
    /// if the channel was not attached.
    pub fn remove_channel(&self, id: ChannelId) -> bool {
        let local = self.inner.address.as_str();
        let (fx, removed) = {
            let mut state = self.lock();
            let Some(removed) = state.channels.remove(&id) else {
                return false;
            };
            let mut fx = state.effects();
            let lost = state.routes.remove_channel(id);
            for address in &lost {
                for service in state.capacities.remove_address(address) {
                    fx.notify(&service, 0, address);
                }
                match net_state::route(local, address, 0) {
                    Ok(p) => state.broadcast(&p, &mut fx.outbox),
                    Err(e) => warn!(address = %address, error = %e, "withdrawal not encodable"),
                }
            }
            self.inner.metrics.route_withdrawn(lost.len() as u64);
            info!(channel = %id, routes_lost = lost.len(), "channel removed");
            (fx, removed)
        };
        self.inner.metrics.channel_removed();
        fx.flush();
        drop(removed);
        true
    }

    /// Close an attached channel. Its close callback detaches it.
    pub fn close_channel(&self, id: ChannelId) -> bool {
        let channel = self.lock().channels.get(&id).cloned();
        match channel {
            Some(channel) => {
                channel.close();
                self.remove_channel(id);
                true
            }
            None => false,
        }
    }

    pub fn num_channels(&self) -> usize {
        self.lock().channels.len()
    }

    fn on_channel_packet(&self, from: ChannelId, packet: Packet) {
        if let CrcCheck::Mismatch {
            transmitted,
            computed,
        } = packet.crc
        {
            self.inner.metrics.crc_mismatch();
            warn!(channel = %from, transmitted, computed, "CRC mismatch, delivering anyway");
        }
        if packet.is_control() {
            self.handle_net_state(from, packet);
        } else if let Err(e) = self.send(packet) {
            debug!(channel = %from, error = %e, "received packet dropped");
        }
    }

    // ---------------------------------------------------------------
    // Net state
    // ---------------------------------------------------------------

    /// Apply a control packet received on `from`.
    pub fn handle_net_state(&self, from: ChannelId, packet: Packet) {
        match packet.net() {
            NetType::Route => self.handle_route(from, packet),
            NetType::Service => self.handle_service(from, packet),
            NetType::Query => self.handle_query(from),
            NetType::Data => {
                if let Err(e) = self.send(packet) {
                    debug!(channel = %from, error = %e, "received packet dropped");
                }
            }
            NetType::Unknown(net_type) => {
                warn!(channel = %from, net_type, "unknown net type, dropped");
            }
        }
    }

    fn handle_route(&self, from: ChannelId, packet: Packet) {
        let advert = match net_state::parse_route(&packet) {
            Ok(advert) => advert,
            Err(e) => {
                warn!(channel = %from, error = %e, "malformed ROUTE dropped");
                return;
            }
        };
        let local = self.inner.address.as_str();
        let metrics = &self.inner.metrics;
        let mut fight_the_lie = false;

        let fx = {
            let mut state = self.lock();
            if !state.channels.contains_key(&from) {
                trace!(channel = %from, "ROUTE from detached channel");
                return;
            }
            let mut fx = state.effects();
            if advert.cost == 0 {
                if advert.address == local {
                    fight_the_lie = true;
                } else if state.remove_address(&advert.address, &mut fx) {
                    metrics.route_withdrawn(1);
                    debug!(address = %advert.address, channel = %from, "route withdrawn");
                    state.flood_except(Some(from), &packet, &mut fx.outbox);
                }
            } else if advert.address != local {
                let update = state
                    .routes
                    .offer(&advert.address, &advert.next_hop, from, advert.cost);
                if update.accepted() {
                    metrics.route_update();
                    debug!(
                        address = %advert.address,
                        next_hop = %advert.next_hop,
                        cost = advert.cost,
                        "route accepted"
                    );
                    match net_state::route(local, &advert.address, advert.cost.saturating_add(1)) {
                        Ok(p) => state.flood_except(Some(from), &p, &mut fx.outbox),
                        Err(e) => warn!(address = %advert.address, error = %e, "route not relayable"),
                    }
                }
            }
            fx
        };
        fx.flush();

        if fight_the_lie {
            info!(channel = %from, advertiser = %advert.next_hop, "peer withdrew this node; re-sharing state");
            self.schedule_share_net_state();
        }
    }

    fn handle_service(&self, from: ChannelId, packet: Packet) {
        let advert = match net_state::parse_service(&packet) {
            Ok(advert) => advert,
            Err(e) => {
                warn!(channel = %from, error = %e, "malformed SERVICE dropped");
                return;
            }
        };
        if advert.address == self.inner.address {
            return;
        }
        let metrics = &self.inner.metrics;

        let fx = {
            let mut state = self.lock();
            if !state.channels.contains_key(&from) {
                trace!(channel = %from, "SERVICE from detached channel");
                return;
            }
            let update = state
                .capacities
                .apply(&advert.service, &advert.address, advert.capacity);
            if !update.changed() {
                metrics.service_redundant();
                trace!(service = %advert.service, address = %advert.address, "redundant SERVICE dropped");
                return;
            }
            metrics.service_update();
            debug!(
                service = %advert.service,
                address = %advert.address,
                capacity = advert.capacity,
                "service capacity updated"
            );
            let mut fx = state.effects();
            fx.notify(&advert.service, advert.capacity, &advert.address);
            state.flood_except(Some(from), &packet, &mut fx.outbox);
            fx
        };
        fx.flush();
    }

    fn handle_query(&self, from: ChannelId) {
        let local = self.inner.address.as_str();
        let reply = {
            let state = self.lock();
            state.channels.get(&from).cloned().map(|channel| {
                let mut packets = state.export_route_table(local);
                packets.extend(state.export_service_table(local));
                (channel, packets)
            })
        };
        let Some((channel, packets)) = reply else {
            return;
        };
        self.inner.metrics.query_answered();
        debug!(channel = %from, packets = packets.len(), "answering QUERY");
        for packet in packets {
            channel.send(packet);
        }
    }

    /// ROUTE packets describing every address reachable through this node.
    pub fn export_route_table(&self) -> Vec<Packet> {
        self.lock().export_route_table(&self.inner.address)
    }

    /// SERVICE packets for every local and known remote service.
    pub fn export_service_table(&self) -> Vec<Packet> {
        self.lock().export_service_table(&self.inner.address)
    }

    /// Send the full route and service tables on every channel.
    pub fn share_net_state(&self) {
        let local = self.inner.address.as_str();
        let mut out = Outbox::new();
        {
            let state = self.lock();
            let mut packets = state.export_route_table(local);
            packets.extend(state.export_service_table(local));
            for packet in &packets {
                state.broadcast(packet, &mut out);
            }
        }
        debug!(packets = out.len(), "sharing net state");
        for (channel, packet) in out {
            channel.send(packet);
        }
    }

    fn schedule_share_net_state(&self) {
        let weak = Arc::downgrade(&self.inner);
        let delay = self.inner.fight_the_lie_delay;
        let share = move || {
            if let Some(inner) = weak.upgrade() {
                Router { inner }.share_net_state();
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    share();
                });
            }
            Err(_) => {
                std::thread::spawn(move || {
                    std::thread::sleep(delay);
                    share();
                });
            }
        }
    }

    // ---------------------------------------------------------------
    // Inspection
    // ---------------------------------------------------------------

    pub fn has_route(&self, address: &str) -> bool {
        self.lock().routes.contains(address)
    }

    /// True if `service` is hosted locally or advertised by a remote node.
    pub fn has_service(&self, service: &str) -> bool {
        let state = self.lock();
        state.dispatcher.has_service(service) || state.capacities.has_service(service)
    }

    /// Every address known to provide `service`, this node first.
    pub fn service_addresses(&self, service: &str) -> Vec<String> {
        let state = self.lock();
        let mut addresses = Vec::new();
        if state.dispatcher.has_service(service) {
            addresses.push(self.inner.address.clone());
        }
        addresses.extend(state.capacities.addresses(service));
        addresses
    }

    /// This node if it hosts `service`, else the remote provider with the
    /// lowest advertised capacity.
    pub fn select_service(&self, service: &str) -> Option<String> {
        let state = self.lock();
        if state.dispatcher.has_service(service) {
            return Some(self.inner.address.clone());
        }
        state.capacities.least_loaded(service).map(str::to_owned)
    }

    pub fn routes(&self) -> Vec<RemoteNodeInfo> {
        self.lock().routes.iter().cloned().collect()
    }

    /// Remote capacity entries.
    pub fn services(&self) -> Vec<ServiceEntry> {
        self.lock()
            .capacities
            .iter()
            .map(|(service, address, e)| ServiceEntry {
                service: service.to_owned(),
                address: address.to_owned(),
                capacity: e.capacity,
                last_seen: e.last_seen,
            })
            .collect()
    }

    /// Services per address, including this node's own.
    pub fn node_services(&self) -> BTreeMap<String, Vec<String>> {
        let state = self.lock();
        let mut nodes: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut local: Vec<String> = state.dispatcher.services().map(str::to_owned).collect();
        if !local.is_empty() {
            local.sort();
            nodes.insert(self.inner.address.clone(), local);
        }
        for (service, address, _) in state.capacities.iter() {
            nodes
                .entry(address.to_owned())
                .or_default()
                .push(service.to_owned());
        }
        nodes
    }
}
