//! Integration tests for the end-to-end push pipeline.
//!
//! These tests start a real server and connect real viewers, verifying
//! the full distribution path: authority mutation, lite reduction,
//! WebSocket push, and client-side reassembly.

use std::time::Duration;

use tokio::time::timeout;

use veil_core::{ImageRef, MaskOp};
use veil_mask::{MaskCompositor, SurfaceRole};
use veil_sync::{
    AuthorityHandle, ConnectionState, Frame, PointerEvent, PushServer, ServerConfig,
    ViewerClient, ViewerEvent, ViewerInfo,
};

/// Find a free port for testing.
async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Start a server on a free port, return the URL and authority handle.
async fn start_test_server() -> (String, AuthorityHandle) {
    let port = free_port().await;
    let config = ServerConfig {
        bind_addr: format!("127.0.0.1:{port}"),
        max_viewers: 8,
        broadcast_capacity: 64,
    };
    let (server, authority) = PushServer::spawn(config);
    tokio::spawn(async move {
        server.run().await.unwrap();
    });
    // Give the server time to bind
    tokio::time::sleep(Duration::from_millis(50)).await;
    (format!("ws://127.0.0.1:{port}"), authority)
}

async fn connect_viewer(
    url: &str,
    name: &str,
) -> (ViewerClient, tokio::sync::mpsc::Receiver<ViewerEvent>) {
    let mut client = ViewerClient::new(ViewerInfo::new(name), url);
    let mut events = client.take_event_rx().unwrap();
    client.connect().await.unwrap();

    // First event is Connected
    match timeout(Duration::from_secs(2), events.recv()).await {
        Ok(Some(ViewerEvent::Connected)) => {}
        other => panic!("Expected Connected event, got {other:?}"),
    }
    (client, events)
}

async fn next_snapshot(
    events: &mut tokio::sync::mpsc::Receiver<ViewerEvent>,
) -> veil_core::Snapshot {
    loop {
        match timeout(Duration::from_secs(2), events.recv()).await {
            Ok(Some(ViewerEvent::Snapshot(snap))) => return snap,
            Ok(Some(_)) => continue,
            other => panic!("Expected Snapshot event, got {other:?}"),
        }
    }
}

fn test_image(identity: &str, bytes: usize) -> ImageRef {
    ImageRef::new(identity, vec![0xABu8; bytes], 100, 100)
}

#[tokio::test]
async fn test_server_accepts_connections() {
    let (url, _authority) = start_test_server().await;
    let result = tokio_tungstenite::connect_async(&url).await;
    assert!(result.is_ok(), "Should connect to server");
}

#[tokio::test]
async fn test_viewer_receives_initial_full_snapshot() {
    let (url, authority) = start_test_server().await;
    authority.set_image(test_image("map1", 256)).await.unwrap();
    authority
        .apply_ops(vec![MaskOp::RevealCircle { x: 50.0, y: 50.0, r: 20.0 }])
        .await
        .unwrap();

    let (client, mut events) = connect_viewer(&url, "Table TV").await;

    // Join snapshot carries the full payload
    let snap = next_snapshot(&mut events).await;
    assert_eq!(snap.version, 2);
    let image = snap.state.image.unwrap();
    assert_eq!(image.identity, "map1");
    assert_eq!(image.payload.len(), 256);
    assert_eq!(snap.state.log.len(), 1);

    assert_eq!(client.connection_state().await, ConnectionState::Connected);
}

#[tokio::test]
async fn test_mutation_pushed_to_connected_viewer() {
    let (url, authority) = start_test_server().await;
    authority.set_image(test_image("map1", 64)).await.unwrap();

    let (_client, mut events) = connect_viewer(&url, "Table TV").await;
    let join = next_snapshot(&mut events).await;
    assert_eq!(join.version, 1);

    authority
        .apply_ops(vec![MaskOp::RevealCircle { x: 10.0, y: 10.0, r: 5.0 }])
        .await
        .unwrap();

    let pushed = next_snapshot(&mut events).await;
    assert_eq!(pushed.version, 2);
    assert_eq!(pushed.state.log.len(), 1);
    // The cache restored the payload even though the wire frame was lite
    assert_eq!(pushed.state.image.unwrap().payload.len(), 64);
}

#[tokio::test]
async fn test_lite_frames_elide_image_on_the_wire() {
    let (url, authority) = start_test_server().await;

    // Raw subscription to observe actual wire frames
    let mut raw_rx = authority.viewer_group().subscribe();

    // A connected viewer makes the channel live
    let (_client, mut events) = connect_viewer(&url, "Table TV").await;

    authority.set_image(test_image("map1", 512)).await.unwrap();
    let first = Frame::decode(&raw_rx.recv().await.unwrap())
        .unwrap()
        .snapshot_frame()
        .unwrap();
    assert!(!first.image_elided);
    assert_eq!(first.snapshot.state.image.unwrap().payload.len(), 512);

    authority
        .apply_ops(vec![MaskOp::RevealCircle { x: 1.0, y: 1.0, r: 2.0 }])
        .await
        .unwrap();
    let second = Frame::decode(&raw_rx.recv().await.unwrap())
        .unwrap()
        .snapshot_frame()
        .unwrap();
    assert!(second.image_elided);
    assert!(second.snapshot.state.image.unwrap().payload.is_empty());

    // The viewer still sees complete snapshots
    let snap = next_snapshot(&mut events).await; // join frame or set_image
    let _ = snap;
    let mut last = None;
    for _ in 0..2 {
        if let Ok(Some(ViewerEvent::Snapshot(s))) =
            timeout(Duration::from_secs(2), events.recv()).await
        {
            last = Some(s);
        }
    }
    if let Some(snap) = last {
        assert_eq!(snap.state.image.unwrap().payload.len(), 512);
    }
}

#[tokio::test]
async fn test_pointer_roundtrip_between_viewers() {
    let (url, authority) = start_test_server().await;
    authority.set_image(test_image("map1", 16)).await.unwrap();

    let (client_a, mut events_a) = connect_viewer(&url, "Alice").await;
    let (_client_b, mut events_b) = connect_viewer(&url, "Bob").await;

    // Drain join snapshots
    let _ = next_snapshot(&mut events_a).await;
    let _ = next_snapshot(&mut events_b).await;

    let event = PointerEvent {
        x: 42.0,
        y: 17.0,
        label: "Alice".to_string(),
        timestamp_ms: 1_000,
    };
    client_a.send_pointer(&event).await.unwrap();

    // Bob sees Alice's pointer
    loop {
        match timeout(Duration::from_secs(2), events_b.recv()).await {
            Ok(Some(ViewerEvent::Pointer(p))) => {
                assert_eq!(p, event);
                break;
            }
            Ok(Some(_)) => continue,
            other => panic!("Expected Pointer event, got {other:?}"),
        }
    }

    // Alice must not see her own pointer echoed back
    match timeout(Duration::from_millis(200), events_a.recv()).await {
        Ok(Some(ViewerEvent::Pointer(_))) => panic!("Pointer echoed to sender"),
        _ => {}
    }
}

#[tokio::test]
async fn test_late_joiner_matches_authority_state() {
    let (url, authority) = start_test_server().await;

    // Build up state before anyone connects
    authority.set_image(test_image("map1", 128)).await.unwrap();
    authority
        .apply_ops(vec![
            MaskOp::RevealCircle { x: 20.0, y: 20.0, r: 10.0 },
            MaskOp::HideCircle { x: 25.0, y: 25.0, r: 4.0 },
        ])
        .await
        .unwrap();
    authority.push_event("{\"kind\":\"reveal\"}".to_string()).await.unwrap();

    let expected = authority.get_snapshot().await.unwrap();

    let (_client, mut events) = connect_viewer(&url, "Latecomer").await;
    let snap = next_snapshot(&mut events).await;
    assert_eq!(snap, expected);
}

#[tokio::test]
async fn test_end_to_end_reveal_then_reset() {
    let (url, authority) = start_test_server().await;
    authority.set_image(test_image("map1", 32)).await.unwrap();

    let (_client, mut events) = connect_viewer(&url, "Table TV").await;
    let join = next_snapshot(&mut events).await;

    // Drive a viewer-side compositor from the pushed snapshots
    let mut compositor = MaskCompositor::new(SurfaceRole::Viewer);
    compositor.set_image_size(100, 100).unwrap();
    compositor.sync(&join.state.log);

    authority
        .apply_ops(vec![MaskOp::RevealCircle { x: 50.0, y: 50.0, r: 20.0 }])
        .await
        .unwrap();
    let snap = next_snapshot(&mut events).await;
    compositor.sync(&snap.state.log);
    // Revealed: the center pixel is transparent
    assert_eq!(compositor.raster().unwrap().alpha_at(50, 50), 0);

    authority.reset_mask().await.unwrap();
    let snap = next_snapshot(&mut events).await;
    assert_eq!(snap.state.log.len(), 1);
    compositor.sync(&snap.state.log);
    // Back to fully hidden
    assert_eq!(compositor.raster().unwrap().alpha_at(50, 50), 255);
}
