//! In-process channel pair.
//!
//! Each end hands packets straight to the other end's callback on the
//! sending thread; nothing is encoded. Packets sent before the peer
//! registers its callbacks are held and delivered on registration.
//! Closing either end closes both.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::core::packet::Packet;
use crate::transport::{Channel, CloseCallback, PacketCallback};

#[derive(Default)]
struct EndpointState {
    on_packet: Option<PacketCallback>,
    on_closed: Option<CloseCallback>,
    pending: Vec<Packet>,
    closed: bool,
}

#[derive(Default)]
struct Endpoint {
    state: Mutex<EndpointState>,
}

impl Endpoint {
    fn lock(&self) -> MutexGuard<'_, EndpointState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self, packet: Packet) {
        let handler = {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            match state.on_packet.clone() {
                Some(handler) => handler,
                None => {
                    state.pending.push(packet);
                    return;
                }
            }
        };
        handler(packet);
    }

    /// Returns false if this end was already closed.
    fn shut(&self) -> bool {
        let on_closed = {
            let mut state = self.lock();
            if state.closed {
                return false;
            }
            state.closed = true;
            state.pending.clear();
            state.on_packet = None;
            state.on_closed.take()
        };
        if let Some(cb) = on_closed {
            cb();
        }
        true
    }
}

/// One end of an in-process link.
pub struct LocalChannel {
    local: Arc<Endpoint>,
    peer: Arc<Endpoint>,
}

impl LocalChannel {
    /// Two connected ends.
    pub fn pair() -> (LocalChannel, LocalChannel) {
        let a = Arc::new(Endpoint::default());
        let b = Arc::new(Endpoint::default());
        (
            LocalChannel {
                local: a.clone(),
                peer: b.clone(),
            },
            LocalChannel { local: b, peer: a },
        )
    }

    pub fn is_closed(&self) -> bool {
        self.local.lock().closed
    }
}

impl Channel for LocalChannel {
    fn send(&self, packet: Packet) {
        if self.local.lock().closed {
            debug!("send on closed local channel, dropped");
            return;
        }
        self.peer.deliver(packet);
    }

    fn receive(&self, on_packet: PacketCallback, on_closed: CloseCallback) {
        let pending = {
            let mut state = self.local.lock();
            if state.closed {
                drop(state);
                on_closed();
                return;
            }
            state.on_packet = Some(on_packet.clone());
            state.on_closed = Some(on_closed);
            std::mem::take(&mut state.pending)
        };
        for packet in pending {
            on_packet(packet);
        }
    }

    fn close(&self) {
        if self.local.shut() {
            self.peer.shut();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn collector() -> (Arc<Mutex<Vec<Packet>>>, PacketCallback) {
        let got = Arc::new(Mutex::new(Vec::new()));
        let sink = got.clone();
        (got, Arc::new(move |p| sink.lock().unwrap().push(p)))
    }

    #[test]
    fn delivers_to_peer_and_buffers_until_receive() {
        let (a, b) = LocalChannel::pair();
        a.send(Packet::to_service("early", vec![1]));
        let (got, cb) = collector();
        b.receive(cb, Box::new(|| {}));
        a.send(Packet::to_service("late", vec![2]));
        let got = got.lock().unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].service, "early");
        assert_eq!(got[1].service, "late");
    }

    #[test]
    fn close_fires_both_ends_once() {
        let (a, b) = LocalChannel::pair();
        let closes = Arc::new(AtomicUsize::new(0));
        for ch in [&a, &b] {
            let closes = closes.clone();
            let (_, cb) = collector();
            ch.receive(
                cb,
                Box::new(move || {
                    closes.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }
        a.close();
        a.close();
        b.close();
        assert_eq!(closes.load(Ordering::SeqCst), 2);
        assert!(a.is_closed() && b.is_closed());
    }

    #[test]
    fn receive_after_close_reports_closed() {
        let (a, _b) = LocalChannel::pair();
        a.close();
        let closed = Arc::new(AtomicUsize::new(0));
        let c = closed.clone();
        let (_, cb) = collector();
        a.receive(
            cb,
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn send_after_close_is_dropped() {
        let (a, b) = LocalChannel::pair();
        let (got, cb) = collector();
        b.receive(cb, Box::new(|| {}));
        b.close();
        a.send(Packet::to_service("x", vec![]));
        assert!(got.lock().unwrap().is_empty());
    }
}
