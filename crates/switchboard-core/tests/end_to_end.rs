//! End-to-end routing over a real WebSocket listener.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use switchboard_core::{Acceptor, HandlerDirectory, HandlerResult, Router};
use switchboard_protocol::InboundMessage;
use switchboard_transport::{ListenerConfig, WebSocketTransport};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn on_move(msg: InboundMessage) -> HandlerResult {
    assert_eq!(msg.get("dx"), Some(&json!(1)));
    Ok(Some(json!({"ok": true})))
}

async fn start() -> String {
    let directory = HandlerDirectory::builder()
        .route("game42", "move", on_move)
        .build();
    let router = Arc::new(Router::new(directory));

    let config = ListenerConfig::new(0).with_host("127.0.0.1".parse().unwrap());
    let transport = WebSocketTransport::bind(config).await.unwrap();
    let addr = transport.local_addr().unwrap();

    tokio::spawn(async move {
        Acceptor::new(router).run(&transport).await;
    });

    format!("ws://{}", addr)
}

async fn next_text(client: &mut Client) -> Option<String> {
    loop {
        match client.next().await? {
            Ok(Message::Text(text)) => return Some(text),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

#[tokio::test]
async fn test_reply_reaches_sender_only() {
    let base = start().await;

    let (mut player, _) = connect_async(format!("{}/game42", base)).await.unwrap();
    let (mut teammate, _) = connect_async(format!("{}/game42", base)).await.unwrap();
    let (mut bystander, _) = connect_async(format!("{}/", base)).await.unwrap();

    player
        .send(Message::Text(r#"{"type":"move","dx":1}"#.into()))
        .await
        .unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(5), next_text(&mut player))
        .await
        .unwrap()
        .unwrap();
    let reply: Value = serde_json::from_str(&reply).unwrap();
    assert_eq!(reply, json!({"ok": true}));

    for other in [&mut teammate, &mut bystander] {
        let nothing = tokio::time::timeout(Duration::from_millis(200), next_text(other)).await;
        assert!(nothing.is_err(), "unexpected frame delivered");
    }
}

#[tokio::test]
async fn test_malformed_then_valid() {
    let base = start().await;
    let (mut player, _) = connect_async(format!("{}/game42", base)).await.unwrap();

    player.send(Message::Text("not json".into())).await.unwrap();
    player
        .send(Message::Text(r#"{"dx":1}"#.into()))
        .await
        .unwrap();
    player
        .send(Message::Text(r#"{"type":"move","dx":1}"#.into()))
        .await
        .unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(5), next_text(&mut player))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(serde_json::from_str::<Value>(&reply).unwrap(), json!({"ok": true}));
}

#[tokio::test]
async fn test_other_channel_gets_no_reply() {
    let base = start().await;
    let (mut lost, _) = connect_async(format!("{}/game7", base)).await.unwrap();

    lost.send(Message::Text(r#"{"type":"move","dx":1}"#.into()))
        .await
        .unwrap();

    let nothing = tokio::time::timeout(Duration::from_millis(200), next_text(&mut lost)).await;
    assert!(nothing.is_err());
}

#[tokio::test]
async fn test_idle_socket_does_not_block_others() {
    let base = start().await;
    let addr = base.trim_start_matches("ws://").to_string();

    // Connected at the TCP level but never starts the handshake.
    let _idle = TcpStream::connect(&addr).await.unwrap();

    let served = tokio::time::timeout(Duration::from_secs(3), async {
        let (mut player, _) = connect_async(format!("{}/game42", base)).await.unwrap();
        player
            .send(Message::Text(r#"{"type":"move","dx":1}"#.into()))
            .await
            .unwrap();
        next_text(&mut player).await
    })
    .await
    .expect("idle socket blocked the listener");

    let reply: Value = serde_json::from_str(&served.unwrap()).unwrap();
    assert_eq!(reply, json!({"ok": true}));
}
