//! Actor-level integration tests for `SyncClient`, run over `MockTransport`
//! instead of a real socket (the transport layer is out of scope per
//! spec.md §1). Style mirrors `sven_p2p`'s `tests/peer_tests.rs`: spawn the
//! actor, drive the "remote" side from the test, assert on the event
//! channels.

use std::time::Duration;

use hydra::client::{Event, SyncClient};
use hydra::config::ConfigTree;
use hydra::protocol::transport::{mock_pair, MockConnector, MockPeer};
use hydra::protocol::types::{ClientFrame, HeaderFields, ServerFrame, StatusCode};
use hydra::{Ledger, Post};

fn write_hydra_cfg(dir: &std::path::Path, identity: &str) {
    let mut tree = ConfigTree::new();
    tree.put("/hydra/identity", identity);
    tree.put("/hydra/nickname", "local-nick");
    tree.save(&dir.join("hydra.cfg")).unwrap();
}

async fn expect_sent(peer: &mut MockPeer, timeout: Duration) -> ClientFrame {
    tokio::time::timeout(timeout, peer.recv_sent())
        .await
        .expect("timed out waiting for client to send a frame")
        .expect("peer channel closed unexpectedly")
}

fn header_fields(subject: &str, content: &[u8]) -> (String, HeaderFields) {
    let mut post = Post::new(subject);
    post.set_data(content.to_vec());
    let ident = post.ident();
    (ident, post.encode())
}

#[tokio::test]
async fn connect_failure_reports_bad_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    write_hydra_cfg(dir.path(), "local-id");

    let client = SyncClient::new(MockConnector::failing(), dir.path()).unwrap();
    let handle = client.handle();
    let mut cmd_events = handle.subscribe_command_events();
    tokio::spawn(client.run());

    handle.connect("mock://unreachable", 200).await.unwrap();

    let event = tokio::time::timeout(Duration::from_millis(300), cmd_events.recv())
        .await
        .expect("should respond within timeout")
        .unwrap();
    match event {
        Event::Failure { code, reason } => {
            assert_eq!(code, -1);
            assert_eq!(reason, "Bad server endpoint");
        }
        other => panic!("expected Failure, got {other:?}"),
    }
}

/// S6-ish: a brand-new peer offers exactly one post; the client fetches it
/// in a single chunk and reports `SUCCESS(1)`.
#[tokio::test]
async fn new_peer_sync_fetches_single_post() {
    let dir = tempfile::tempdir().unwrap();
    write_hydra_cfg(dir.path(), "local-id");

    let (transport, mut peer) = mock_pair();
    let client = SyncClient::new(MockConnector::new(transport), dir.path()).unwrap();
    let handle = client.handle();
    let mut cmd_events = handle.subscribe_command_events();
    let mut msg_events = handle.subscribe_message_events();
    tokio::spawn(client.run());

    handle.connect("mock://peer", 500).await.unwrap();
    match expect_sent(&mut peer, Duration::from_secs(1)).await {
        ClientFrame::Hello { identity, .. } => assert_eq!(identity, "local-id"),
        other => panic!("expected Hello, got {other:?}"),
    }
    peer.send_reply(ServerFrame::HelloOk {
        identity: "remote-id".into(),
        nickname: "remote-nick".into(),
    });
    let connected = cmd_events.recv().await.unwrap();
    assert!(matches!(connected, Event::Connected { .. }));
    assert!(matches!(cmd_events.recv().await.unwrap(), Event::Success(0)));

    handle.sync().await.unwrap();

    let (ident, fields) = header_fields("hello world", b"hello");

    // Ask-HEAD.
    match expect_sent(&mut peer, Duration::from_secs(1)).await {
        ClientFrame::GetPost { ident: asked } => assert_eq!(asked, "HEAD"),
        other => panic!("expected GET-POST HEAD, got {other:?}"),
    }
    peer.send_reply(ServerFrame::HeaderOk { ident: ident.clone(), fields });

    match expect_sent(&mut peer, Duration::from_secs(1)).await {
        ClientFrame::GetPostData { offset, .. } => assert_eq!(offset, 0),
        other => panic!("expected GET-POST-DATA, got {other:?}"),
    }
    peer.send_reply(ServerFrame::DataOk { content: b"hello".to_vec() });

    // Backward scan asks for the post before `oldest` (itself) -> boundary.
    match expect_sent(&mut peer, Duration::from_secs(1)).await {
        ClientFrame::GetPost { ident: asked } => assert_eq!(asked, ident),
        other => panic!("expected backward GET-POST, got {other:?}"),
    }
    peer.send_reply(ServerFrame::Error { status: StatusCode::NoSuchPost });

    // Forward scan asks for the post after `newest` (itself) -> boundary,
    // ending the sync.
    match expect_sent(&mut peer, Duration::from_secs(1)).await {
        ClientFrame::GetPost { ident: asked } => assert_eq!(asked, ident),
        other => panic!("expected forward GET-POST, got {other:?}"),
    }
    peer.send_reply(ServerFrame::Error { status: StatusCode::NoSuchPost });

    let post_event = tokio::time::timeout(Duration::from_secs(1), msg_events.recv())
        .await
        .unwrap()
        .unwrap();
    let received_post = match post_event {
        Event::Post(post) => post,
        other => panic!("expected Post, got {other:?}"),
    };
    assert_eq!(received_post.ident(), ident);
    assert_eq!(received_post.fetch(0, 0).unwrap(), b"hello");

    let success_event = tokio::time::timeout(Duration::from_secs(1), msg_events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(success_event, Event::Success(1)));

    // The post landed in the local ledger too.
    let mut ledger = Ledger::new(dir.path().join("posts"));
    assert_eq!(ledger.load(), 1);
    assert!(ledger.contains(&ident));

    // And the peer cursor was persisted.
    let cursor = hydra::PeerCursor::load_or_new(dir.path(), "remote-id", "remote-nick");
    assert_eq!(cursor.oldest.as_deref(), Some(ident.as_str()));
    assert_eq!(cursor.newest.as_deref(), Some(ident.as_str()));
}

/// S3: the peer offers a post the local ledger already has; no `Post`
/// event fires and the sync still reports `SUCCESS(0)`.
#[tokio::test]
async fn duplicate_post_is_suppressed() {
    let dir = tempfile::tempdir().unwrap();
    write_hydra_cfg(dir.path(), "local-id");

    let mut template = Post::new("seen already");
    template.set_content("hello");
    let ident = template.ident();
    let fields = template.encode();

    let mut seed_ledger = Ledger::new(dir.path().join("posts"));
    seed_ledger.store(template).unwrap();

    let (transport, mut peer) = mock_pair();
    let client = SyncClient::new(MockConnector::new(transport), dir.path()).unwrap();
    let handle = client.handle();
    let mut msg_events = handle.subscribe_message_events();
    tokio::spawn(client.run());

    handle.connect("mock://peer", 500).await.unwrap();
    let _ = expect_sent(&mut peer, Duration::from_secs(1)).await;
    peer.send_reply(ServerFrame::HelloOk {
        identity: "remote-id".into(),
        nickname: "remote-nick".into(),
    });

    handle.sync().await.unwrap();

    match expect_sent(&mut peer, Duration::from_secs(1)).await {
        ClientFrame::GetPost { ident: asked } => assert_eq!(asked, "HEAD"),
        other => panic!("expected GET-POST HEAD, got {other:?}"),
    }
    peer.send_reply(ServerFrame::HeaderOk { ident: ident.clone(), fields });

    // Duplicate detected: the client must not request the content chunk for
    // this post, it advances the cursor directly to the boundary checks.
    match expect_sent(&mut peer, Duration::from_secs(1)).await {
        ClientFrame::GetPost { ident: asked } => assert_eq!(asked, ident),
        other => panic!("expected backward GET-POST (no chunk fetch), got {other:?}"),
    }
    peer.send_reply(ServerFrame::Error { status: StatusCode::NoSuchPost });

    match expect_sent(&mut peer, Duration::from_secs(1)).await {
        ClientFrame::GetPost { ident: asked } => assert_eq!(asked, ident),
        other => panic!("expected forward GET-POST, got {other:?}"),
    }
    peer.send_reply(ServerFrame::Error { status: StatusCode::NoSuchPost });

    let success_event = tokio::time::timeout(Duration::from_secs(1), msg_events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(success_event, Event::Success(0)));
}

/// S6: a 1 MiB payload still fits in the single-chunk transfer and the
/// committed post's digest matches what was computed over the original
/// bytes.
#[tokio::test]
async fn single_chunk_transfer_handles_one_mebibyte_payload() {
    let dir = tempfile::tempdir().unwrap();
    write_hydra_cfg(dir.path(), "local-id");

    let (transport, mut peer) = mock_pair();
    let client = SyncClient::new(MockConnector::new(transport), dir.path()).unwrap();
    let handle = client.handle();
    let mut cmd_events = handle.subscribe_command_events();
    let mut msg_events = handle.subscribe_message_events();
    tokio::spawn(client.run());

    handle.connect("mock://peer", 500).await.unwrap();
    let _ = expect_sent(&mut peer, Duration::from_secs(1)).await;
    peer.send_reply(ServerFrame::HelloOk {
        identity: "remote-id".into(),
        nickname: "remote-nick".into(),
    });
    assert!(matches!(cmd_events.recv().await.unwrap(), Event::Connected { .. }));
    assert!(matches!(cmd_events.recv().await.unwrap(), Event::Success(0)));

    handle.sync().await.unwrap();

    let payload = vec![0x5Au8; 1024 * 1024];
    let (ident, fields) = header_fields("big post", &payload);

    let _ = expect_sent(&mut peer, Duration::from_secs(1)).await; // Ask-HEAD
    peer.send_reply(ServerFrame::HeaderOk { ident: ident.clone(), fields });

    match expect_sent(&mut peer, Duration::from_secs(1)).await {
        ClientFrame::GetPostData { offset, octets } => {
            assert_eq!(offset, 0);
            assert!(octets >= payload.len() as u64);
        }
        other => panic!("expected GET-POST-DATA, got {other:?}"),
    }
    peer.send_reply(ServerFrame::DataOk { content: payload.clone() });

    let _ = expect_sent(&mut peer, Duration::from_secs(1)).await; // backward boundary
    peer.send_reply(ServerFrame::Error { status: StatusCode::NoSuchPost });
    let _ = expect_sent(&mut peer, Duration::from_secs(1)).await; // forward boundary
    peer.send_reply(ServerFrame::Error { status: StatusCode::NoSuchPost });

    let post_event = tokio::time::timeout(Duration::from_secs(1), msg_events.recv())
        .await
        .unwrap()
        .unwrap();
    let received_post = match post_event {
        Event::Post(post) => post,
        other => panic!("expected Post, got {other:?}"),
    };
    assert_eq!(received_post.ident(), ident);
    assert_eq!(received_post.fetch(0, 0).unwrap(), payload);
}

/// Known-peer flow: a cursor with both bounds already set skips straight
/// to the forward scan, since the backward history up to `oldest` was
/// already established on a prior sync.
#[tokio::test]
async fn known_peer_sync_skips_ask_head_and_backward_scan() {
    let dir = tempfile::tempdir().unwrap();
    write_hydra_cfg(dir.path(), "local-id");

    let mut seed = Post::new("first");
    seed.set_content("already synced");
    let seed_ident = seed.ident();
    let mut seed_ledger = Ledger::new(dir.path().join("posts"));
    seed_ledger.store(seed).unwrap();

    let mut cursor = hydra::PeerCursor::load_or_new(dir.path(), "remote-id", "remote-nick");
    cursor.oldest = Some(seed_ident.clone());
    cursor.newest = Some(seed_ident.clone());
    cursor.save(dir.path()).unwrap();

    let (transport, mut peer) = mock_pair();
    let client = SyncClient::new(MockConnector::new(transport), dir.path()).unwrap();
    let handle = client.handle();
    let mut msg_events = handle.subscribe_message_events();
    tokio::spawn(client.run());

    handle.connect("mock://peer", 500).await.unwrap();
    let _ = expect_sent(&mut peer, Duration::from_secs(1)).await;
    peer.send_reply(ServerFrame::HelloOk {
        identity: "remote-id".into(),
        nickname: "remote-nick".into(),
    });

    handle.sync().await.unwrap();

    // Known peer: the first request must be the forward probe for
    // `seed_ident`, not "HEAD".
    match expect_sent(&mut peer, Duration::from_secs(1)).await {
        ClientFrame::GetPost { ident: asked } => assert_eq!(asked, seed_ident),
        other => panic!("expected forward GET-POST, got {other:?}"),
    }
    peer.send_reply(ServerFrame::Error { status: StatusCode::NoSuchPost });

    let success_event = tokio::time::timeout(Duration::from_secs(1), msg_events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(success_event, Event::Success(0)));
}

/// S5: silence from the server for 3+ heartbeat intervals tears the
/// session down and reports failure on both channels.
#[tokio::test(start_paused = true)]
async fn heartbeat_expiry_emits_failure_on_both_channels() {
    let dir = tempfile::tempdir().unwrap();
    write_hydra_cfg(dir.path(), "local-id");

    let (transport, mut peer) = mock_pair();
    let client = SyncClient::new(MockConnector::new(transport), dir.path()).unwrap();
    let handle = client.handle();
    let mut cmd_events = handle.subscribe_command_events();
    let mut msg_events = handle.subscribe_message_events();
    tokio::spawn(client.run());

    handle.connect("mock://peer", 500).await.unwrap();
    let _ = tokio::time::timeout(Duration::from_secs(1), peer.recv_sent())
        .await
        .unwrap();
    peer.send_reply(ServerFrame::HelloOk {
        identity: "remote-id".into(),
        nickname: "remote-nick".into(),
    });
    assert!(matches!(
        cmd_events.recv().await.unwrap(),
        Event::Connected { .. }
    ));
    assert!(matches!(cmd_events.recv().await.unwrap(), Event::Success(0)));

    // Never answer any PING the client sends; advance virtual time past
    // three full heartbeat rounds (~3.5s).
    for _ in 0..4 {
        tokio::time::advance(Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
    }

    let cmd_failure = tokio::time::timeout(Duration::from_secs(1), cmd_events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(cmd_failure, Event::Failure { reason, .. } if reason == "Unhandled error"));

    let msg_failure = tokio::time::timeout(Duration::from_secs(1), msg_events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(msg_failure, Event::Failure { reason, .. } if reason == "Unhandled error"));
}
