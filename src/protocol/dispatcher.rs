use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;

use crate::core::packet::Packet;
use crate::error::{AlnError, Result};

/// Every nonzero 16-bit id.
const MAX_CONTEXTS: usize = u16::MAX as usize;

/// Handler for packets delivered to this node.
pub type PacketHandler = Arc<dyn Fn(Packet) + Send + Sync + 'static>;

/// Local delivery registry: service handlers keyed by name, response
/// handlers keyed by context id.
///
/// Holds no lock of its own; the router keeps it under its table lock and
/// invokes the resolved handler after releasing it.
#[derive(Default)]
pub struct Dispatcher {
    services: HashMap<String, PacketHandler>,
    contexts: HashMap<u16, PacketHandler>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to `service`, replacing any previous one.
    pub fn register_service(&mut self, service: &str, handler: PacketHandler) -> bool {
        self.services
            .insert(service.to_owned(), handler)
            .is_none()
    }

    pub fn unregister_service(&mut self, service: &str) -> bool {
        self.services.remove(service).is_some()
    }

    pub fn has_service(&self, service: &str) -> bool {
        self.services.contains_key(service)
    }

    /// Names of the locally hosted services.
    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    /// Allocate a fresh nonzero context id for `handler`, retrying random
    /// picks until one is free.
    pub fn register_context(&mut self, handler: PacketHandler) -> Result<u16> {
        if self.contexts.len() >= MAX_CONTEXTS {
            return Err(AlnError::ContextsExhausted);
        }
        let mut rng = rand::rng();
        loop {
            let id: u16 = rng.random();
            if id != 0 && !self.contexts.contains_key(&id) {
                self.contexts.insert(id, handler);
                return Ok(id);
            }
        }
    }

    pub fn release_context(&mut self, context_id: u16) -> bool {
        self.contexts.remove(&context_id).is_some()
    }

    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    /// Service handler first, then the context handler.
    pub fn resolve(&self, packet: &Packet) -> Result<PacketHandler> {
        self.services
            .get(&packet.service)
            .or_else(|| self.contexts.get(&packet.context_id))
            .cloned()
            .ok_or_else(|| AlnError::UnregisteredService {
                service: packet.service.clone(),
                context_id: packet.context_id,
            })
    }
}
