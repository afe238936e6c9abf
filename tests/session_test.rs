//! Session behavior: membership, cross-subscription, leave cascades, GC

mod support;

use rtc_sfu::router::Router;
use rtc_sfu::session::Session;
use rtc_sfu::transport::Transport;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use support::*;

/// Build a session of N mock transports, each publishing one video router
async fn mesh(session: &Session, ssrcs: &[(String, u32)]) -> Vec<(Arc<MockTransport>, Arc<Router>)> {
    let mut out = Vec::new();
    for (tid, ssrc) in ssrcs {
        let transport = MockTransport::new(tid.clone());
        session.add_transport(transport.clone()).await;
        out.push((transport, *ssrc));
    }

    let mut mesh = Vec::new();
    for (transport, ssrc) in out {
        let receiver = MockReceiver::new(video_track(ssrc));
        let router = Router::new(transport.id(), receiver);
        transport.register_router(router.clone()).await;
        session.add_router(&router).await;
        mesh.push((transport, router));
    }
    mesh
}

#[tokio::test]
async fn test_membership_is_keyed_by_transport_id() {
    let session = Session::new("room1");
    let a = MockTransport::new("a");
    let b = MockTransport::new("b");
    session.add_transport(a.clone()).await;
    session.add_transport(b.clone()).await;

    let transports = session.transports().await;
    assert_eq!(transports.len(), 2);
    for (tid, transport) in transports {
        assert_eq!(tid, transport.id());
    }
}

#[tokio::test]
async fn test_add_router_subscribes_every_other_transport() {
    let session = Session::new("room1");
    let a = MockTransport::new("a");
    let b = MockTransport::new("b");
    let c = MockTransport::new("c");
    for t in [&a, &b, &c] {
        session.add_transport(t.clone()).await;
    }

    let receiver = MockReceiver::new(video_track(42));
    let router = Router::new("a", receiver);
    session.add_router(&router).await;

    assert_eq!(router.sender_count().await, 2);
    assert!(router.has_sender("b").await);
    assert!(router.has_sender("c").await);
    assert!(!router.has_sender("a").await);

    // Subscribers were asked to renegotiate, the source was not.
    assert_eq!(b.negotiations(), 1);
    assert_eq!(c.negotiations(), 1);
    assert_eq!(a.negotiations(), 0);

    router.close().await;
}

#[tokio::test]
async fn test_failed_subscription_skips_only_that_transport() {
    let session = Session::new("room1");
    let a = MockTransport::new("a");
    let b = MockTransport::new("b");
    let c = MockTransport::new("c");
    b.fail_new_sender.store(true, Ordering::SeqCst);
    for t in [&a, &b, &c] {
        session.add_transport(t.clone()).await;
    }

    let receiver = MockReceiver::new(video_track(42));
    let router = Router::new("a", receiver);
    session.add_router(&router).await;

    assert_eq!(router.sender_count().await, 1);
    assert!(router.has_sender("c").await);
    assert!(!router.has_sender("b").await);
    assert_eq!(b.negotiations(), 0);
    assert_eq!(c.negotiations(), 1);

    router.close().await;
}

#[tokio::test]
async fn test_full_mesh_has_one_sender_per_pair() {
    let session = Session::new("room1");
    let members = mesh(
        &session,
        &[
            ("a".to_string(), 100),
            ("b".to_string(), 200),
            ("c".to_string(), 300),
        ],
    )
    .await;

    for (transport, router) in &members {
        assert_eq!(router.sender_count().await, 2);
        for (other, _) in &members {
            let expected = other.id() != transport.id();
            assert_eq!(router.has_sender(other.id()).await, expected);
        }
    }

    for (_, router) in members {
        router.close().await;
    }
}

#[tokio::test]
async fn test_leave_cascade_drops_only_departed_senders() {
    let session = Session::new("room1");
    let members = mesh(
        &session,
        &[
            ("a".to_string(), 100),
            ("b".to_string(), 200),
            ("c".to_string(), 300),
        ],
    )
    .await;

    let negotiations_before: Vec<usize> =
        members.iter().map(|(t, _)| t.negotiations()).collect();

    session.remove_transport("c").await;

    let (a, router_a) = &members[0];
    let (b, router_b) = &members[1];

    assert!(!router_a.has_sender("c").await);
    assert!(!router_b.has_sender("c").await);
    assert!(router_a.has_sender("b").await);
    assert!(router_b.has_sender("a").await);

    // Removal does not trigger renegotiation for the remaining peers.
    assert_eq!(a.negotiations(), negotiations_before[0]);
    assert_eq!(b.negotiations(), negotiations_before[1]);

    for (_, router) in members {
        router.close().await;
    }
}

#[tokio::test]
async fn test_close_hook_fires_once_when_last_transport_leaves() {
    let session = Session::new("room1");
    let fired = Arc::new(AtomicUsize::new(0));
    let fired_hook = fired.clone();
    session.on_close(Box::new(move || {
        let fired = fired_hook.clone();
        Box::pin(async move {
            fired.fetch_add(1, Ordering::SeqCst);
        })
    }));

    let a = MockTransport::new("a");
    let b = MockTransport::new("b");
    session.add_transport(a.clone()).await;
    session.add_transport(b.clone()).await;

    session.remove_transport("a").await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    session.remove_transport("b").await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    // Removing from an already empty session must not re-fire the hook.
    session.remove_transport("b").await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}
