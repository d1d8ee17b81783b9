//! # Transport Layer
//!
//! Point-to-point links between routers. A router only needs three things
//! from a link: queue a packet for sending, report received packets, and
//! report that the link went away.
//!
//! ## Implementations
//! - **Local**: in-process loopback pair, for development and tests
//! - **Stream**: any tokio byte stream, framed with [`FrameCodec`](crate::core::codec::FrameCodec)
//! - **TCP**: connect / accept helpers producing stream channels
//! - **Limited**: wraps another channel and filters what it sends
//!
//! ## Contract
//! - `send` never blocks; a full outbound queue drops the packet
//! - `on_packet` runs on the channel's own worker
//! - `close` is idempotent and `on_closed` fires exactly once

use std::fmt;
use std::sync::Arc;

use crate::core::packet::Packet;

pub mod limited;
pub mod local;
pub mod stream;
pub mod tcp;

/// Invoked for every packet a channel receives.
pub type PacketCallback = Arc<dyn Fn(Packet) + Send + Sync + 'static>;

/// Invoked once when a channel closes.
pub type CloseCallback = Box<dyn FnOnce() + Send + 'static>;

/// A bidirectional packet link to one peer.
pub trait Channel: Send + Sync {
    /// Queue `packet` for the peer. Never blocks; may drop.
    fn send(&self, packet: Packet);

    /// Register the receive and close callbacks. Packets that arrived before
    /// registration are delivered once the callbacks are in place. If the
    /// channel is already closed, `on_closed` runs immediately.
    fn receive(&self, on_packet: PacketCallback, on_closed: CloseCallback);

    /// Shut the link down. Safe to call more than once.
    fn close(&self);
}

/// Opaque handle a router uses to refer to an attached channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(pub(crate) u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

pub use limited::LimitedChannel;
pub use local::LocalChannel;
pub use stream::StreamChannel;
