//! Channel decorator that filters outbound packets.
//!
//! Used to model links that can only carry some traffic, for example a
//! constrained radio that should not relay bulk data.

use std::sync::Arc;

use tracing::trace;

use crate::core::packet::Packet;
use crate::transport::{Channel, CloseCallback, PacketCallback};

/// Decides whether a packet may go out on the wrapped channel.
pub type SendPredicate = Arc<dyn Fn(&Packet) -> bool + Send + Sync + 'static>;

pub struct LimitedChannel {
    inner: Arc<dyn Channel>,
    can_send: SendPredicate,
}

impl LimitedChannel {
    pub fn new<F>(inner: Arc<dyn Channel>, can_send: F) -> Self
    where
        F: Fn(&Packet) -> bool + Send + Sync + 'static,
    {
        Self {
            inner,
            can_send: Arc::new(can_send),
        }
    }

    /// Only pass control packets; data is dropped.
    pub fn control_only(inner: Arc<dyn Channel>) -> Self {
        Self::new(inner, Packet::is_control)
    }
}

impl Channel for LimitedChannel {
    fn send(&self, packet: Packet) {
        if (self.can_send)(&packet) {
            self.inner.send(packet);
        } else {
            trace!(packet = %packet, "limited channel refused packet");
        }
    }

    fn receive(&self, on_packet: PacketCallback, on_closed: CloseCallback) {
        self.inner.receive(on_packet, on_closed);
    }

    fn close(&self) {
        self.inner.close();
    }
}
