//! Realtime push integration tests
//!
//! A websocket client registers under a project, collaborators post events
//! over HTTP and the frames arrive on the socket.

mod common;

use common::start_gateway;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn realtime_connections(base_url: &str) -> u64 {
    let health: Value = reqwest::get(format!("{}/health", base_url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    health["realtime_connections"].as_u64().unwrap()
}

/// Wait until the hub reports `expected` live connections
async fn wait_for_connections(base_url: &str, expected: u64) {
    let reached = tokio::time::timeout(Duration::from_secs(5), async {
        while realtime_connections(base_url).await != expected {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "hub never reached {} connections", expected);
}

async fn connect(base_url: &str, project: Uuid) -> Socket {
    let url = format!(
        "{}/ws?project_id={}",
        base_url.replacen("http", "ws", 1),
        project
    );
    let (socket, _) = connect_async(url.as_str())
        .await
        .expect("Failed to open websocket");
    socket
}

async fn next_frame(socket: &mut Socket) -> Value {
    let frame = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => return text,
                Some(Ok(_)) => continue,
                other => panic!("socket ended before a frame arrived: {:?}", other),
            }
        }
    })
    .await
    .expect("No frame within deadline");
    serde_json::from_str(&frame).unwrap()
}

async fn emit(base_url: &str, project: Uuid, body: Value) {
    let response = reqwest::Client::new()
        .post(format!("{}/api/projects/{}/events", base_url, project))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_websocket_receives_only_its_project_events() {
    let gateway = start_gateway().await;
    let project = Uuid::new_v4();
    let mut socket = connect(&gateway.base_url, project).await;
    wait_for_connections(&gateway.base_url, 1).await;

    emit(
        &gateway.base_url,
        Uuid::new_v4(),
        json!({ "type": "agent_update", "payload": { "name": "elsewhere" } }),
    )
    .await;
    emit(
        &gateway.base_url,
        project,
        json!({ "type": "task_update", "payload": { "title": "ship it", "status": "done" } }),
    )
    .await;

    let frame = next_frame(&mut socket).await;
    assert_eq!(
        frame,
        json!({ "type": "task_update", "payload": { "title": "ship it", "status": "done" } })
    );

    socket.close(None).await.unwrap();
    gateway.stop().await;
}

#[tokio::test]
async fn test_closing_socket_unregisters_connection() {
    let gateway = start_gateway().await;
    let project = Uuid::new_v4();

    let mut first = connect(&gateway.base_url, project).await;
    let mut second = connect(&gateway.base_url, project).await;
    wait_for_connections(&gateway.base_url, 2).await;

    first.close(None).await.unwrap();
    wait_for_connections(&gateway.base_url, 1).await;

    emit(
        &gateway.base_url,
        project,
        json!({ "type": "context_added", "payload": { "title": "notes" } }),
    )
    .await;
    let frame = next_frame(&mut second).await;
    assert_eq!(frame["type"], "context_added");

    second.close(None).await.unwrap();
    wait_for_connections(&gateway.base_url, 0).await;

    gateway.stop().await;
}
