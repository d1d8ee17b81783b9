//! Concurrent use of a shared router

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use aln_mesh::{LocalChannel, Packet, Router};
use tokio::task::JoinSet;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_sends_across_a_link() {
    let a = Router::new("a");
    let b = Router::new("b");
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    b.register_service("count", move |_| {
        counter.fetch_add(1, Ordering::Relaxed);
    })
    .unwrap();

    let (left, right) = LocalChannel::pair();
    a.add_channel(left);
    b.add_channel(right);

    let mut tasks = JoinSet::new();
    for t in 0..8u8 {
        let a = a.clone();
        tasks.spawn(async move {
            for i in 0..500u16 {
                let mut p = Packet::to_service("count", vec![t]);
                p.seq_num = i;
                a.send(p).unwrap();
            }
        });
    }
    while let Some(res) = tasks.join_next().await {
        res.unwrap();
    }
    assert_eq!(hits.load(Ordering::Relaxed), 8 * 500);
    assert_eq!(b.metrics().packets_delivered, 8 * 500);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_context_registration_is_unique() {
    let router = Router::new("ctx");
    let ids = Arc::new(Mutex::new(HashSet::new()));

    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let router = router.clone();
        let ids = ids.clone();
        tasks.spawn(async move {
            for _ in 0..250 {
                let id = router.register_context_handler(|_| {}).unwrap();
                assert!(ids.lock().unwrap().insert(id), "duplicate context id {id}");
            }
        });
    }
    while let Some(res) = tasks.join_next().await {
        res.unwrap();
    }
    assert_eq!(ids.lock().unwrap().len(), 2000);
    assert!(!ids.lock().unwrap().contains(&0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn services_registered_while_linked_converge() {
    let a = Router::new("a");
    let b = Router::new("b");
    let (left, right) = LocalChannel::pair();
    a.add_channel(left);
    b.add_channel(right);

    let mut tasks = JoinSet::new();
    for i in 0..32 {
        let b = b.clone();
        tasks.spawn(async move {
            b.register_service(&format!("svc-{i}"), |_| {}).unwrap();
            if i % 2 == 1 {
                b.unregister_service(&format!("svc-{i}"));
            }
        });
    }
    while let Some(res) = tasks.join_next().await {
        res.unwrap();
    }

    for i in 0..32 {
        assert_eq!(
            a.has_service(&format!("svc-{i}")),
            i % 2 == 0,
            "svc-{i} on a disagrees with b"
        );
    }
    assert_eq!(a.node_services().get("b").map(Vec::len), Some(16));
}
