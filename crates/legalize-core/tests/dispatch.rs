//! Inbound dispatch and outbound sends through the channel manager.

use legalize_core::{ChannelEvent, ChannelManager, InboundMessage, ManagerConfig, MessageKind};
use legalize_transport::memory::{self, MemoryPeer, MemoryServer, PeerEvent};
use serde_json::{json, Value};
use tokio::sync::mpsc;

async fn connected() -> (ChannelManager, MemoryServer, MemoryPeer) {
    let (connector, mut server) = memory::channel();
    let manager = ChannelManager::new(ManagerConfig::with_url("ws://legalize.test"), connector)
        .with_token("secret");
    let mut events = manager.events();

    manager.connect().unwrap();
    let peer = server.accept().await.unwrap();
    while events.recv().await.unwrap() != ChannelEvent::Connected {}

    (manager, server, peer)
}

fn forward(
    manager: &ChannelManager,
    kind: impl Into<MessageKind>,
) -> mpsc::UnboundedReceiver<InboundMessage> {
    let (tx, rx) = mpsc::unbounded_channel();
    manager.on(kind, move |message| {
        let _ = tx.send(message.clone());
    });
    rx
}

async fn sent_json(peer: &mut MemoryPeer) -> Value {
    match peer.recv().await {
        Some(PeerEvent::Text(text)) => serde_json::from_str(&text).unwrap(),
        other => panic!("Expected text frame, got {:?}", other),
    }
}

#[tokio::test]
async fn test_messages_routed_by_kind() {
    let (manager, _server, peer) = connected().await;
    let mut notifications = forward(&manager, MessageKind::Notification);
    let mut payments = forward(&manager, MessageKind::PaymentStatus);

    assert!(peer.send_text(r#"{"kind":"payment_status","payload":{"status":"paid"}}"#));
    assert!(peer.send_text(r#"{"kind":"notification","payload":{"id":7}}"#));

    let payment = payments.recv().await.unwrap();
    assert_eq!(payment.payload, json!({"status": "paid"}));
    let notification = notifications.recv().await.unwrap();
    assert_eq!(notification.payload["id"], 7);

    assert!(payments.try_recv().is_err());
    assert!(notifications.try_recv().is_err());
}

#[tokio::test]
async fn test_malformed_frame_is_isolated() {
    let (manager, _server, peer) = connected().await;
    let mut updates = forward(&manager, MessageKind::CaseUpdate);

    assert!(peer.send_text("not json"));
    assert!(peer.send_text(r#"{"payload":{"case_id":1}}"#));
    assert!(peer.send_raw(vec![0xff, 0xfe]));
    assert!(peer.send_text(r#"{"kind":"case_update","payload":{"case_id":2}}"#));

    let update = updates.recv().await.unwrap();
    assert_eq!(update.payload["case_id"], 2);

    let status = manager.status();
    assert!(status.connected);
    assert!(status.last_error.is_none());
}

#[tokio::test]
async fn test_unknown_kind_reaches_exact_listener_only() {
    let (manager, _server, peer) = connected().await;
    let mut shared = forward(&manager, "document_shared");
    let mut notifications = forward(&manager, MessageKind::Notification);

    assert!(peer.send_text(r#"{"kind":"document_shared","payload":{"doc":3}}"#));
    assert!(peer.send_text(r#"{"kind":"typing","payload":{}}"#));
    assert!(peer.send_text(r#"{"kind":"notification","payload":null}"#));

    assert_eq!(shared.recv().await.unwrap().payload["doc"], 3);
    // The notification arrives after the unhandled frame, so it was dropped.
    notifications.recv().await.unwrap();
    assert!(shared.try_recv().is_err());
}

#[tokio::test]
async fn test_off_stops_delivery() {
    let (manager, _server, peer) = connected().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = manager.on(MessageKind::CommentAdded, move |m| {
        let _ = tx.send(m.clone());
    });
    let mut marker = forward(&manager, MessageKind::Notification);

    assert!(manager.off(&MessageKind::CommentAdded, id));
    assert!(peer.send_text(r#"{"kind":"comment_added","payload":{}}"#));
    assert!(peer.send_text(r#"{"kind":"notification","payload":{}}"#));

    marker.recv().await.unwrap();
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_send_message_and_subscriptions() {
    let (manager, _server, mut peer) = connected().await;

    assert!(manager.send_message("typing", json!({"case_id": 42})));
    assert_eq!(sent_json(&mut peer).await, json!({"type": "typing", "case_id": 42}));

    assert!(manager.subscribe("case:42"));
    assert_eq!(
        sent_json(&mut peer).await,
        json!({"type": "subscribe", "channel": "case:42"})
    );

    assert!(manager.unsubscribe("case:42"));
    assert_eq!(
        sent_json(&mut peer).await,
        json!({"type": "unsubscribe", "channel": "case:42"})
    );

    assert!(manager.send_message("ping", ()));
    assert_eq!(sent_json(&mut peer).await, json!({"type": "ping"}));
}

#[tokio::test]
async fn test_send_rejected_after_disconnect() {
    let (manager, _server, mut peer) = connected().await;

    manager.disconnect();
    assert!(!manager.send_message("typing", json!({"case_id": 1})));
    assert!(!manager.subscribe("case:1"));

    assert_eq!(
        peer.recv().await,
        Some(PeerEvent::Closed {
            code: 1000,
            reason: "User disconnected".into(),
        })
    );
    assert_eq!(peer.recv().await, None);
}

#[tokio::test]
async fn test_non_object_fields_rejected() {
    let (manager, _server, mut peer) = connected().await;

    assert!(!manager.send_message("typing", json!([1, 2, 3])));
    assert!(manager.send_message("typing", json!({})));
    assert_eq!(sent_json(&mut peer).await, json!({"type": "typing"}));
}
