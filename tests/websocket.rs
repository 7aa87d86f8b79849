// tests/websocket.rs

#![cfg(feature = "transport_websocket")]

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;

use protoo_peer::{
    // ---
    decode,
    encode_success,
    Message,
    PeerBuilder,
    PeerEvent,
    PeerEvents,
    ReconnectPolicy,
    RpcError,
    TransportBuilder,
};

const WAIT: Duration = Duration::from_secs(5);

async fn next_event(events: &mut PeerEvents) -> PeerEvent {
    // ---
    timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for peer event")
        .expect("peer event stream ended")
}

/// Accept one WebSocket connection, echoing the requested subprotocol.
///
/// Sends the offered subprotocol on `offered` when given.
async fn accept(
    listener: &TcpListener,
    offered: Option<oneshot::Sender<Option<String>>>,
) -> WebSocketStream<TcpStream> {
    // ---
    let (stream, _) = listener.accept().await.unwrap();
    let callback = move |request: &Request, mut response: Response| {
        // ---
        let protocol = request.headers().get("sec-websocket-protocol").cloned();
        if let Some(offered) = offered {
            let _ = offered.send(protocol.as_ref().and_then(|v| v.to_str().ok()).map(String::from));
        }
        if let Some(protocol) = protocol {
            response.headers_mut().insert("sec-websocket-protocol", protocol);
        }
        Ok::<Response, ErrorResponse>(response)
    };
    tokio_tungstenite::accept_hdr_async(stream, callback)
        .await
        .unwrap()
}

fn fast_reconnect() -> ReconnectPolicy {
    // ---
    ReconnectPolicy {
        max_attempts: 5,
        multiplier: 1.0,
        initial_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(20),
    }
}

#[tokio::test]
async fn request_response_over_websocket() {
    // ---
    // Arrange
    // ---
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let (offered_tx, offered_rx) = oneshot::channel();

    let server = tokio::spawn(async move {
        // ---
        let mut ws = accept(&listener, Some(offered_tx)).await;
        while let Some(Ok(frame)) = ws.next().await {
            let WsMessage::Text(text) = frame else {
                continue;
            };
            if let Ok(Message::Request(request)) = decode(text.as_str()) {
                let reply = encode_success(request.id, Some(json!({"echo": request.data})))
                    .unwrap();
                ws.send(WsMessage::text(reply)).await.unwrap();
            }
        }
    });

    let transport = TransportBuilder::new().url(url).no_reconnect().build().unwrap();
    let (peer, mut events) = PeerBuilder::new(transport).label("ws").build();

    // ---
    // Act
    // ---
    assert!(matches!(next_event(&mut events).await, PeerEvent::Open));
    let data = timeout(WAIT, peer.request("echo", json!({"n": 1})).unwrap())
        .await
        .unwrap()
        .unwrap();

    // ---
    // Assert
    // ---
    assert_eq!(data, json!({"echo": {"n": 1}}));
    assert_eq!(offered_rx.await.unwrap().as_deref(), Some("protoo"));

    peer.close().await;
    assert!(matches!(next_event(&mut events).await, PeerEvent::Close));
    timeout(WAIT, server).await.unwrap().unwrap();
}

#[tokio::test]
async fn server_close_closes_the_peer() {
    // ---
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let server = tokio::spawn(async move {
        // ---
        let mut ws = accept(&listener, None).await;
        // Wait for the request, then hang up without answering
        let _ = ws.next().await;
        ws.close(None).await.unwrap();
        while ws.next().await.is_some() {}
    });

    let transport = TransportBuilder::new()
        .url(url)
        .reconnect(fast_reconnect())
        .build()
        .unwrap();
    let (peer, mut events) = PeerBuilder::new(transport).build();
    assert!(matches!(next_event(&mut events).await, PeerEvent::Open));

    let pending = peer.request("join", json!({})).unwrap();

    assert!(matches!(next_event(&mut events).await, PeerEvent::Close));
    assert!(matches!(pending.await, Err(RpcError::PeerClosed)));
    assert!(peer.is_closed());
    timeout(WAIT, server).await.unwrap().unwrap();
}

#[tokio::test]
async fn lost_connection_reconnects() {
    // ---
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let server = tokio::spawn(async move {
        // ---
        // First connection is dropped without a close frame
        let first = accept(&listener, None).await;
        drop(first);

        let mut second = accept(&listener, None).await;
        while let Some(Ok(frame)) = second.next().await {
            if let WsMessage::Text(text) = frame {
                if let Ok(Message::Request(request)) = decode(text.as_str()) {
                    let reply = encode_success(request.id, None).unwrap();
                    second.send(WsMessage::text(reply)).await.unwrap();
                }
            }
        }
    });

    let transport = TransportBuilder::new()
        .url(url)
        .reconnect(fast_reconnect())
        .build()
        .unwrap();
    let (peer, mut events) = PeerBuilder::new(transport).build();

    assert!(matches!(next_event(&mut events).await, PeerEvent::Open));
    assert!(matches!(next_event(&mut events).await, PeerEvent::Disconnected));
    assert!(matches!(next_event(&mut events).await, PeerEvent::Open));

    let data = timeout(WAIT, peer.request("ping", json!({})).unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(data, json!({}));

    peer.close().await;
    timeout(WAIT, server).await.unwrap().unwrap();
}

#[tokio::test]
async fn failed_reconnects_report_fail() {
    // ---
    // Arrange
    // ---
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let server = tokio::spawn(async move {
        // ---
        // Accept once, then go away for good
        let ws = accept(&listener, None).await;
        drop(listener);
        drop(ws);
    });

    let transport = TransportBuilder::new()
        .url(url)
        .reconnect(ReconnectPolicy {
            max_attempts: 2,
            ..fast_reconnect()
        })
        .build()
        .unwrap();

    // ---
    // Act
    // ---
    let (peer, mut events) = PeerBuilder::new(transport).build();

    // ---
    // Assert
    // ---
    assert!(matches!(next_event(&mut events).await, PeerEvent::Open));
    assert!(matches!(next_event(&mut events).await, PeerEvent::Disconnected));
    assert!(matches!(next_event(&mut events).await, PeerEvent::Fail));
    assert!(matches!(next_event(&mut events).await, PeerEvent::Fail));
    assert!(matches!(next_event(&mut events).await, PeerEvent::Close));
    assert!(peer.is_closed());
    timeout(WAIT, server).await.unwrap().unwrap();
}

#[tokio::test]
async fn unreachable_server_fails_then_closes() {
    // ---
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);

    let transport = TransportBuilder::new().url(url).no_reconnect().build().unwrap();
    let (peer, mut events) = PeerBuilder::new(transport).build();

    assert!(matches!(next_event(&mut events).await, PeerEvent::Fail));
    assert!(matches!(next_event(&mut events).await, PeerEvent::Close));
    assert!(peer.is_closed());
}

#[test]
fn builder_rejects_http_url() {
    // ---
    let result = TransportBuilder::new().url("http://127.0.0.1:80").build();
    assert!(matches!(result, Err(RpcError::InvalidConfig(_))));
}

#[test]
fn subprotocol_header_value_is_valid() {
    // ---
    assert!(HeaderValue::from_str(protoo_peer::PROTOO_SUBPROTOCOL).is_ok());
}
