//! End-to-end tests driving the gateway with real `WebSocket` clients.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use switchboard_broker::{
    BrokerConfig, ClientEndpoint, ClientMessage, ConnectionChange, ConnectionHandler,
    HandlerError, MessageBroker, MessageHandler, PublishRequest,
};
use switchboard_core::constants::{BROKER_CHANNEL_ID, SERVICE_NAME};
use switchboard_server::SwitchboardServer;
use switchboard_settings::ServerSettings;

const TIMEOUT: Duration = Duration::from_secs(5);
const ORIGIN: &str = "https://app.example";

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn boot_server() -> (SocketAddr, Arc<SwitchboardServer>) {
    let broker = Arc::new(MessageBroker::new(BrokerConfig {
        accepted_origins: vec![ORIGIN.into()],
        ..BrokerConfig::default()
    }));
    let settings = ServerSettings {
        port: 0,
        ..ServerSettings::default()
    };
    let handle = PrometheusBuilder::new().build_recorder().handle();
    let server = Arc::new(SwitchboardServer::new(settings, broker, handle));
    let (addr, _serve) = server.listen().await.unwrap();
    (addr, server)
}

async fn open_frame(addr: SocketAddr, origin: &str) -> Result<WsStream, WsError> {
    let mut req = format!("ws://{addr}/ws").into_client_request().unwrap();
    let _ = req
        .headers_mut()
        .insert("origin", HeaderValue::from_str(origin).unwrap());
    connect_async(req).await.map(|(ws, _)| ws)
}

async fn send(ws: &mut WsStream, value: &Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

async fn recv(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

fn connect_envelope(request_id: &str, client_id: &str, channels: &[&str]) -> Value {
    json!({
        "type": "request",
        "service": SERVICE_NAME,
        "request_id": request_id,
        "body": {
            "channelId": BROKER_CHANNEL_ID,
            "clientId": client_id,
            "messageName": "connect",
            "subscribedChannels": channels,
            "data": {},
        },
    })
}

async fn connected_frame(addr: SocketAddr, client_id: &str) -> (WsStream, Value) {
    let mut ws = open_frame(addr, ORIGIN).await.unwrap();
    send(&mut ws, &connect_envelope("c-1", client_id, &["chan1"])).await;
    let ack = recv(&mut ws).await;
    (ws, ack)
}

async fn eventually(mut check: impl FnMut() -> bool) {
    timeout(TIMEOUT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never held");
}

#[tokio::test]
async fn connect_is_acknowledged() {
    let (addr, server) = boot_server().await;
    let (_ws, ack) = connected_frame(addr, "F").await;

    assert_eq!(ack["type"], "response");
    assert_eq!(ack["request_id"], "c-1");
    assert_eq!(ack["body"]["status"], "accepted");
    assert_eq!(ack["body"]["activeClients"], json!([]));
    assert!(server.broker().is_subscribed("F"));
}

#[tokio::test]
async fn frame_to_frame_round_trip() {
    let (addr, _server) = boot_server().await;
    let (mut a, _) = connected_frame(addr, "A").await;
    let (mut b, ack) = connected_frame(addr, "B").await;
    assert_eq!(ack["body"]["activeClients"][0]["clientId"], "A");

    let event = recv(&mut a).await;
    assert_eq!(event["type"], "event");
    assert_eq!(event["body"]["messageName"], "clientConnected");
    assert_eq!(event["body"]["clientId"], "B");

    send(
        &mut a,
        &json!({
            "type": "request",
            "service": SERVICE_NAME,
            "request_id": "p-1",
            "body": {
                "channelId": "chan1",
                "clientId": "A",
                "messageName": "ping",
                "targetClientIds": ["B"],
                "data": {"n": 1},
            },
        }),
    )
    .await;

    let delivered = recv(&mut b).await;
    assert_eq!(delivered["type"], "request");
    assert_eq!(delivered["request_id"], "p-1");
    assert_eq!(delivered["body"]["clientId"], "A");
    assert_eq!(delivered["body"]["data"], json!({"n": 1}));

    send(
        &mut b,
        &json!({
            "type": "response",
            "service": SERVICE_NAME,
            "request_id": "p-1",
            "body": {
                "channelId": "chan1",
                "clientId": "B",
                "correlationMessageId": "p-1",
                "messageName": "ping",
                "data": {"n": 2},
            },
        }),
    )
    .await;

    let reply = recv(&mut a).await;
    assert_eq!(reply["type"], "response");
    assert_eq!(reply["body"]["clientId"], "B");
    assert_eq!(reply["body"]["correlationMessageId"], "p-1");
    assert_eq!(reply["body"]["data"], json!({"n": 2}));
}

struct Quiet;

#[async_trait]
impl MessageHandler for Quiet {
    async fn on_message(&self, _: ClientMessage) -> Result<Option<Value>, HandlerError> {
        Ok(None)
    }
}

#[async_trait]
impl ConnectionHandler for Quiet {
    async fn on_connection_change(&self, _: ConnectionChange) -> Result<(), HandlerError> {
        Ok(())
    }
}

#[tokio::test]
async fn in_process_publish_waits_for_frame_response() {
    let (addr, server) = boot_server().await;
    let quiet = Arc::new(Quiet);
    let _ = server
        .broker()
        .subscribe(
            "L",
            &["chan1".to_string()],
            json!({}),
            ClientEndpoint::in_process(quiet.clone(), quiet),
        )
        .await
        .unwrap();
    let (mut f, _) = connected_frame(addr, "F").await;

    let broker = server.broker().clone();
    let publish = tokio::spawn(async move {
        broker
            .publish(PublishRequest {
                channel_id: "chan1".into(),
                sender_id: "L".into(),
                message_id: "q-1".into(),
                message_name: "query".into(),
                target_client_ids: vec!["F".into()],
                data: json!("?"),
            })
            .await
    });

    let delivered = recv(&mut f).await;
    assert_eq!(delivered["request_id"], "q-1");
    send(
        &mut f,
        &json!({
            "type": "response",
            "service": SERVICE_NAME,
            "request_id": "q-1",
            "body": {
                "channelId": "chan1",
                "clientId": "F",
                "correlationMessageId": "q-1",
                "messageName": "query",
                "data": "answer",
            },
        }),
    )
    .await;

    let report = timeout(TIMEOUT, publish).await.unwrap().unwrap().unwrap();
    assert_eq!(report.replies[0].client_id, "F");
    assert_eq!(report.replies[0].data, json!("answer"));
    assert_eq!(server.broker().pending_request_count(), 0);
}

#[tokio::test]
async fn duplicate_connect_is_rejected() {
    let (addr, _server) = boot_server().await;
    let (mut ws, _) = connected_frame(addr, "F").await;

    send(&mut ws, &connect_envelope("c-2", "F", &["chan1"])).await;
    let rejected = recv(&mut ws).await;
    assert_eq!(rejected["request_id"], "c-2");
    assert_eq!(rejected["body"]["status"], "rejected");
    assert_eq!(rejected["body"]["error"]["code"], "ALREADY_SUBSCRIBED");
}

#[tokio::test]
async fn unaccepted_origin_gets_403() {
    let (addr, _server) = boot_server().await;
    match open_frame(addr, "https://evil.example").await {
        Err(WsError::Http(resp)) => assert_eq!(resp.status(), 403),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("upgrade should have been refused"),
    }
}

#[tokio::test]
async fn revoked_origin_drops_later_messages() {
    let (addr, server) = boot_server().await;
    let mut ws = open_frame(addr, ORIGIN).await.unwrap();
    assert!(server.broker().remove_accepted_origin(ORIGIN));

    send(&mut ws, &connect_envelope("c-1", "F", &["chan1"])).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!server.broker().is_subscribed("F"));
}

#[tokio::test]
async fn closing_the_socket_unsubscribes_its_clients() {
    let (addr, server) = boot_server().await;
    let (mut ws, _) = connected_frame(addr, "F").await;
    send(&mut ws, &connect_envelope("c-2", "G", &["chan2"])).await;
    let _ = recv(&mut ws).await;
    assert_eq!(server.broker().active_client_count(), 2);

    ws.close(None).await.unwrap();
    let broker = server.broker().clone();
    eventually(|| broker.active_client_count() == 0).await;
    let frames = server.frames().clone();
    eventually(|| frames.is_empty()).await;
}

#[tokio::test]
async fn health_counts_frames_over_http() {
    let (addr, server) = boot_server().await;
    let (_ws, _) = connected_frame(addr, "F").await;
    let frames = server.frames().clone();
    eventually(|| frames.len() == 1).await;

    let body: Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["connections"], 1);
    assert_eq!(body["active_clients"], 1);
}

#[tokio::test]
async fn shutdown_closes_frames() {
    let (addr, server) = boot_server().await;
    let (mut ws, _) = connected_frame(addr, "F").await;

    let _ = server.shutdown().shutdown();
    let closed = timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                None | Some(Err(_) | Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok());
    let broker = server.broker().clone();
    eventually(|| !broker.is_subscribed("F")).await;
}
