//! Dispatch overflow and server lifecycle behaviour.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use ws_reactor::{ServerError, WsServer};

use common::{start_server, test_config, wait_for, RecordingHandler};

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_full_dispatch_queue_rejects_to_handler() {
    let mut config = test_config();
    config.dispatch.workers = 1;
    config.dispatch.queue_capacity = 1;
    config.dispatch.enqueue_timeout_ms = 20;

    let handler = RecordingHandler::new();
    handler.hold.store(true, Ordering::SeqCst);
    let (server, addr) = start_server(config, handler.clone());
    let (mut client, _) = connect_async(format!("ws://{addr}/")).await.unwrap();

    for i in 0..5 {
        client.send(WsMessage::text(format!("msg-{i}"))).await.unwrap();
    }

    assert!(wait_for(TIMEOUT, || handler.rejected.load(Ordering::SeqCst) >= 1).await);
    handler.hold.store(false, Ordering::SeqCst);

    let accounted = wait_for(TIMEOUT, || {
        handler.received_count() + handler.rejected.load(Ordering::SeqCst) == 5
    })
    .await;
    assert!(accounted);

    let stats = server.dispatch_stats();
    assert_eq!(stats.rejected as usize, handler.rejected.load(Ordering::SeqCst));
    assert!(stats.max_queue_len <= 1);

    // Accepted messages are still echoed in order.
    for _ in 0..handler.received_count() {
        let reply = tokio::time::timeout(TIMEOUT, client.next()).await.unwrap().unwrap().unwrap();
        assert!(reply.into_text().unwrap().starts_with("msg-"));
    }
    server.stop();
}

#[tokio::test]
async fn test_start_twice_restarts_on_same_config() {
    let (server, first_addr) = start_server(test_config(), RecordingHandler::new());
    assert!(server.is_running());

    let second_addr = server.start().unwrap();
    assert!(server.is_running());
    assert_eq!(server.local_addr(), Some(second_addr));
    assert_ne!(first_addr.port(), 0);

    let (mut client, _) = connect_async(format!("ws://{second_addr}/")).await.unwrap();
    client.send(WsMessage::text("again")).await.unwrap();
    let reply = tokio::time::timeout(TIMEOUT, client.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(reply, WsMessage::text("again"));
    server.stop();
}

#[tokio::test]
async fn test_start_fails_when_port_taken() {
    let (running, addr) = start_server(test_config(), RecordingHandler::new());

    let mut config = test_config();
    config.listener.bind_address = addr.to_string();
    let clash = WsServer::new(config, RecordingHandler::new());

    let err = clash.start().unwrap_err();
    assert!(matches!(err, ServerError::Bind { .. }));
    assert!(!clash.is_running());
    assert_eq!(clash.local_addr(), None);
    assert_eq!(clash.dispatch_stats().submitted, 0);

    running.stop();
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let (server, _) = start_server(test_config(), RecordingHandler::new());
    server.stop();
    server.stop();
    assert!(!server.is_running());
    assert_eq!(server.local_addr(), None);
}

#[tokio::test]
async fn test_invalid_bind_address_is_reported() {
    let mut config = test_config();
    config.listener.bind_address = "not-an-address".to_string();
    let server = WsServer::new(config, RecordingHandler::new());

    let err = server.start().unwrap_err();
    assert!(matches!(err, ServerError::InvalidAddress(_)));
    assert!(!server.is_running());
}
