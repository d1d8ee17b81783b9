// test-only module included via protocol/mod.rs
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::core::packet::Packet;
use crate::error::AlnError;
use crate::protocol::dispatcher::{Dispatcher, PacketHandler};
use crate::protocol::net_state;

fn counting(counter: &Arc<AtomicUsize>) -> PacketHandler {
    let counter = counter.clone();
    Arc::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn service_handler_wins_over_context() {
    let mut d = Dispatcher::new();
    let by_service = Arc::new(AtomicUsize::new(0));
    let by_context = Arc::new(AtomicUsize::new(0));
    d.register_service("ping", counting(&by_service));
    let ctx = d.register_context(counting(&by_context)).unwrap();

    let packet = Packet {
        service: "ping".into(),
        context_id: ctx,
        ..Packet::default()
    };
    (d.resolve(&packet).unwrap())(packet);
    assert_eq!(by_service.load(Ordering::SeqCst), 1);
    assert_eq!(by_context.load(Ordering::SeqCst), 0);

    let reply = Packet {
        service: "unknown".into(),
        context_id: ctx,
        ..Packet::default()
    };
    (d.resolve(&reply).unwrap())(reply);
    assert_eq!(by_context.load(Ordering::SeqCst), 1);
}

#[test]
fn last_registration_wins() {
    let mut d = Dispatcher::new();
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    assert!(d.register_service("svc", counting(&first)));
    assert!(!d.register_service("svc", counting(&second)));
    let p = Packet::to_service("svc", vec![]);
    (d.resolve(&p).unwrap())(p);
    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[test]
fn unresolved_packet_reports_service_and_context() {
    let d = Dispatcher::new();
    let p = Packet {
        service: "nobody".into(),
        context_id: 42,
        ..Packet::default()
    };
    match d.resolve(&p) {
        Err(AlnError::UnregisteredService {
            service,
            context_id,
        }) => {
            assert_eq!(service, "nobody");
            assert_eq!(context_id, 42);
        }
        other => panic!("unexpected: {:?}", other.map(|_| ())),
    }
}

#[test]
fn context_ids_are_unique_and_nonzero() {
    let mut d = Dispatcher::new();
    let counter = Arc::new(AtomicUsize::new(0));
    let mut seen = HashSet::new();
    for _ in 0..2000 {
        let id = d.register_context(counting(&counter)).unwrap();
        assert_ne!(id, 0);
        assert!(seen.insert(id), "duplicate context id {id}");
    }
    assert_eq!(d.context_count(), 2000);
    let id = *seen.iter().next().unwrap();
    assert!(d.release_context(id));
    assert!(!d.release_context(id));
    assert_eq!(d.context_count(), 1999);
}

#[test]
fn unregister_removes_service() {
    let mut d = Dispatcher::new();
    let counter = Arc::new(AtomicUsize::new(0));
    d.register_service("a", counting(&counter));
    d.register_service("b", counting(&counter));
    let mut names: Vec<&str> = d.services().collect();
    names.sort();
    assert_eq!(names, vec!["a", "b"]);
    assert!(d.unregister_service("a"));
    assert!(!d.has_service("a"));
    assert!(d.has_service("b"));
}

#[test]
fn service_advert_survives_the_wire() {
    let p = net_state::service("relay", "host", "echo", 3).unwrap();
    let frame = p.to_frame().unwrap();
    let mut parser = crate::core::parser::Parser::new();
    let decoded = parser.feed(&frame).pop().unwrap().unwrap();
    let ad = net_state::parse_service(&decoded).unwrap();
    assert_eq!((ad.address.as_str(), ad.service.as_str(), ad.capacity), ("host", "echo", 3));
    assert_eq!(decoded.src_addr, "relay");
}
