//! End-to-end tests using a real WebSocket client.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rolecall_core::TemplateTable;
use rolecall_server::{ServerConfig, ServerHandle};
use serde_json::{json, Value};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(300);

const STORYTELLER_OPENING: &str =
    "Greetings, Storyteller! Let's weave a captivating narrative together.";

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        ..Default::default()
    }
}

async fn boot_server(config: ServerConfig) -> ServerHandle {
    rolecall_server::start(config, Arc::new(TemplateTable::default()))
        .await
        .unwrap()
}

async fn connect(handle: &ServerHandle) -> WsStream {
    let (ws, _) = connect_async(handle.ws_url()).await.unwrap();
    ws
}

async fn send(ws: &mut WsStream, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

/// Next text frame as JSON, skipping control frames.
async fn recv(ws: &mut WsStream) -> Value {
    timeout(TIMEOUT, async {
        loop {
            let msg = ws.next().await.expect("stream ended").expect("ws error");
            if let Message::Text(text) = msg {
                return serde_json::from_str::<Value>(text.as_str()).unwrap();
            }
        }
    })
    .await
    .expect("timed out waiting for message")
}

/// Assert no text frame arrives within a short window.
async fn expect_silence(ws: &mut WsStream) {
    let got = timeout(QUIET, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return Some(text.as_str().to_owned()),
                Some(Ok(_)) => continue,
                _ => return None,
            }
        }
    })
    .await;
    if let Ok(Some(text)) = got {
        panic!("expected no message, got {text}");
    }
}

async fn wait_for_registrations(handle: &ServerHandle, expected: usize) {
    timeout(TIMEOUT, async {
        while handle.dispatcher().registration_count() != expected {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("registry never reached expected size");
}

#[tokio::test]
async fn registering_receives_opening_message() {
    let handle = boot_server(test_config()).await;
    let mut a = connect(&handle).await;

    send(&mut a, json!({"action": "Registering", "tabId": "t1", "role": "Storyteller"})).await;

    assert_eq!(recv(&mut a).await, json!({"tabId": "t1", "message": STORYTELLER_OPENING}));
    expect_silence(&mut a).await;
}

#[tokio::test]
async fn reused_tab_id_is_rejected() {
    let handle = boot_server(test_config()).await;
    let mut a = connect(&handle).await;
    let mut b = connect(&handle).await;
    send(&mut a, json!({"action": "Registering", "tabId": "t1", "role": "Storyteller"})).await;
    recv(&mut a).await;

    send(&mut b, json!({"action": "Registering", "tabId": "t1", "role": "Hero Creator"})).await;

    assert_eq!(
        recv(&mut b).await,
        json!({"tabId": "t1", "message": "Tab has already been assigned"})
    );
    expect_silence(&mut a).await;

    // t1 still answers to Storyteller.
    send(&mut b, json!({"action": "Query", "role": "Storyteller", "query": "still yours?"})).await;
    assert_eq!(recv(&mut a).await, json!({"tabId": "t1", "message": "still yours?"}));
}

#[tokio::test]
async fn query_is_delivered_to_role_holder() {
    let handle = boot_server(test_config()).await;
    let mut a = connect(&handle).await;
    let mut c = connect(&handle).await;
    send(&mut a, json!({"action": "Registering", "tabId": "t1", "role": "Storyteller"})).await;
    recv(&mut a).await;

    send(&mut c, json!({"action": "Query", "role": "Storyteller", "query": "Begin the adventure"})).await;

    assert_eq!(recv(&mut a).await, json!({"tabId": "t1", "message": "Begin the adventure"}));
    expect_silence(&mut c).await;
}

#[tokio::test]
async fn query_fans_out_to_all_holders() {
    let handle = boot_server(test_config()).await;
    let mut a = connect(&handle).await;
    let mut b = connect(&handle).await;
    let mut other = connect(&handle).await;
    let mut q = connect(&handle).await;
    send(&mut a, json!({"action": "Registering", "tabId": "t1", "role": "Storyteller"})).await;
    send(&mut b, json!({"action": "Registering", "tabId": 77, "role": "Storyteller"})).await;
    send(&mut other, json!({"action": "Registering", "tabId": "t3", "role": "Map Generator"})).await;
    recv(&mut a).await;
    recv(&mut b).await;
    recv(&mut other).await;

    send(&mut q, json!({"action": "Query", "role": "Storyteller", "query": "gather round"})).await;

    assert_eq!(recv(&mut a).await, json!({"tabId": "t1", "message": "gather round"}));
    assert_eq!(recv(&mut b).await, json!({"tabId": 77, "message": "gather round"}));
    expect_silence(&mut other).await;
    expect_silence(&mut q).await;
}

#[tokio::test]
async fn unknown_role_reports_back_to_origin_only() {
    let handle = boot_server(test_config()).await;
    let mut a = connect(&handle).await;
    let mut d = connect(&handle).await;
    send(&mut a, json!({"action": "Registering", "tabId": "t1", "role": "Storyteller"})).await;
    recv(&mut a).await;

    send(&mut d, json!({"action": "Query", "role": "Nonexistent Role", "query": "hi"})).await;

    assert_eq!(
        recv(&mut d).await,
        json!({"tabId": null, "message": "No agent found with the role 'Nonexistent Role'"})
    );
    expect_silence(&mut d).await;
    expect_silence(&mut a).await;
}

#[tokio::test]
async fn reset_clears_registry() {
    let handle = boot_server(test_config()).await;
    let mut a = connect(&handle).await;
    let mut other = connect(&handle).await;
    send(&mut a, json!({"action": "Registering", "tabId": "t1", "role": "Storyteller"})).await;
    recv(&mut a).await;

    send(&mut other, json!({"action": "Reset"})).await;
    expect_silence(&mut other).await;
    wait_for_registrations(&handle, 0).await;

    send(&mut other, json!({"action": "Query", "role": "Storyteller", "query": "anyone?"})).await;
    assert_eq!(
        recv(&mut other).await["message"],
        "No agent found with the role 'Storyteller'"
    );

    send(&mut a, json!({"action": "Registering", "tabId": "t1", "role": "Storyteller"})).await;
    assert_eq!(recv(&mut a).await, json!({"tabId": "t1", "message": STORYTELLER_OPENING}));
}

#[tokio::test]
async fn arbitrary_json_tab_ids_and_null_queries_are_routed() {
    let handle = boot_server(test_config()).await;
    let mut a = connect(&handle).await;
    let mut other = connect(&handle).await;
    let tab = json!({"window": 1, "tab": 3});

    send(&mut a, json!({"action": "Registering", "tabId": tab, "role": "Storyteller"})).await;
    assert_eq!(recv(&mut a).await, json!({"tabId": tab, "message": STORYTELLER_OPENING}));

    send(&mut other, json!({"action": "Query", "tabId": 1.5, "role": "Storyteller", "query": null})).await;
    assert_eq!(recv(&mut a).await, json!({"tabId": tab, "message": "null"}));

    send(&mut other, json!({"action": "Reset", "tabId": {"window": 9}})).await;
    wait_for_registrations(&handle, 0).await;
    expect_silence(&mut other).await;
}

#[tokio::test]
async fn malformed_message_keeps_connection_open() {
    let handle = boot_server(test_config()).await;
    let mut ws = connect(&handle).await;

    ws.send(Message::Text("this is {not json".to_string().into()))
        .await
        .unwrap();
    expect_silence(&mut ws).await;

    send(&mut ws, json!({"action": "Heartbeat"})).await;
    expect_silence(&mut ws).await;

    // Still routable afterwards.
    send(&mut ws, json!({"action": "Registering", "tabId": "after", "role": "Fight Manager"})).await;
    assert_eq!(
        recv(&mut ws).await["message"],
        "Greetings, Fight Manager! Let's make those battles epic."
    );

    let metrics: Value = reqwest::get(format!("http://{}/metrics", handle.addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let decode_errors = metrics["samples"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["name"] == "decode_errors_total")
        .unwrap();
    assert_eq!(decode_errors["value"], 1);
}

#[tokio::test]
async fn structured_query_arrives_as_json_text() {
    let handle = boot_server(test_config()).await;
    let mut dm = connect(&handle).await;
    let mut hero = connect(&handle).await;
    send(&mut dm, json!({"action": "Registering", "tabId": 5, "role": "Dungeon Master"})).await;
    recv(&mut dm).await;

    let payload = json!({"heroes": [{"name": "Ayla", "quirk": "sings to doors"}], "count": 1});
    send(&mut hero, json!({"action": "Query", "role": "Dungeon Master", "query": payload})).await;

    let env = recv(&mut dm).await;
    assert_eq!(env["tabId"], 5);
    let text = env["message"].as_str().unwrap();
    assert_eq!(serde_json::from_str::<Value>(text).unwrap(), payload);
}

#[tokio::test]
async fn binary_frames_are_decoded_as_text() {
    let handle = boot_server(test_config()).await;
    let mut ws = connect(&handle).await;

    let doc = json!({"action": "Registering", "tabId": "bin", "role": "Storyteller"});
    ws.send(Message::Binary(doc.to_string().into_bytes().into())).await.unwrap();

    assert_eq!(recv(&mut ws).await["tabId"], "bin");
}

#[tokio::test]
async fn disconnect_releases_registrations() {
    let handle = boot_server(test_config()).await;
    let mut a = connect(&handle).await;
    send(&mut a, json!({"action": "Registering", "tabId": "t1", "role": "Storyteller"})).await;
    recv(&mut a).await;
    wait_for_registrations(&handle, 1).await;

    a.close(None).await.unwrap();
    wait_for_registrations(&handle, 0).await;

    let mut b = connect(&handle).await;
    send(&mut b, json!({"action": "Registering", "tabId": "t1", "role": "Storyteller"})).await;
    assert_eq!(recv(&mut b).await, json!({"tabId": "t1", "message": STORYTELLER_OPENING}));
}

#[tokio::test]
async fn dropped_socket_releases_registrations() {
    let handle = boot_server(test_config()).await;
    let mut a = connect(&handle).await;
    send(&mut a, json!({"action": "Registering", "tabId": "t9", "role": "Storyteller"})).await;
    recv(&mut a).await;

    drop(a);
    wait_for_registrations(&handle, 0).await;
}

#[tokio::test]
async fn idle_clients_are_evicted_when_configured() {
    let handle = boot_server(ServerConfig {
        idle_timeout_secs: Some(1),
        sweep_interval_secs: 1,
        ..test_config()
    })
    .await;
    let mut a = connect(&handle).await;
    send(&mut a, json!({"action": "Registering", "tabId": "sleepy", "role": "Storyteller"})).await;
    recv(&mut a).await;

    wait_for_registrations(&handle, 0).await;

    let closed = timeout(TIMEOUT, async {
        loop {
            match a.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "evicted connection was not closed");
}

#[tokio::test]
async fn health_reports_connections_and_registrations() {
    let handle = boot_server(test_config()).await;
    let mut a = connect(&handle).await;
    send(&mut a, json!({"action": "Registering", "tabId": "t1", "role": "Storyteller"})).await;
    recv(&mut a).await;

    let body: Value = reqwest::get(format!("http://{}/health", handle.addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["connections"], 1);
    assert_eq!(body["registrations"], 1);
}
