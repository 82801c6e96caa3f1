//! Socket.IO channel against a loopback WebSocket server.

use std::sync::Arc;

use c2d_protocol::{ResourceKey, ResourcePayload};
use c2d_runtime::{ConnectionPool, Error, PoolConfig, SocketIoConnector};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

const OPEN: &str = r#"0{"sid":"eio-1","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;

async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> String {
	loop {
		match ws.next().await.expect("client hung up").expect("websocket error") {
			Message::Text(text) => return text.as_str().to_string(),
			Message::Close(_) => panic!("client closed"),
			_ => continue,
		}
	}
}

/// Accepts one client, runs the Engine.IO open + Socket.IO connect exchange
/// and returns the socket with the auth payload the client sent.
async fn accept_and_handshake(listener: &TcpListener) -> (WebSocketStream<TcpStream>, Value) {
	let (stream, _) = listener.accept().await.unwrap();
	let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
	ws.send(Message::Text(OPEN.into())).await.unwrap();

	let connect = next_text(&mut ws).await;
	let auth_json = connect.strip_prefix("40").expect("expected socket.io connect");
	let auth: Value = serde_json::from_str(auth_json).unwrap();

	ws.send(Message::Text(r#"40{"sid":"sio-1"}"#.into())).await.unwrap();
	(ws, auth)
}

async fn bind() -> (TcpListener, String) {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let endpoint = format!("http://{}", listener.local_addr().unwrap());
	(listener, endpoint)
}

#[tokio::test]
async fn socket_io_subscription_round_trip() {
	let (listener, endpoint) = bind().await;

	let server = tokio::spawn(async move {
		let (mut ws, auth) = accept_and_handshake(&listener).await;
		assert_eq!(auth["accessToken"], "token-1");

		let subscribe = next_text(&mut ws).await;
		let body = subscribe.strip_prefix("42").expect("expected event");
		let event: Value = serde_json::from_str(body).unwrap();
		assert_eq!(event[0], "resource:subscribe");
		assert_eq!(event[1]["resourceType"], "copy-to-design:generate-task");
		assert_eq!(event[1]["resourceId"], "task-7");

		let reply = json!([
			"resource:subscribe",
			{"resourceType": "copy-to-design:generate-task", "resourceId": "task-7", "payload": {"success": true, "content": "<div>ok</div>"}}
		]);
		ws.send(Message::Text(format!("42{reply}").into())).await.unwrap();

		let unsubscribe = next_text(&mut ws).await;
		assert!(unsubscribe.starts_with(r#"42["resource:unsubscribe""#), "got {unsubscribe}");

		// Client disconnect on pool teardown.
		assert_eq!(next_text(&mut ws).await, "41");
	});

	let pool = ConnectionPool::new(Arc::new(SocketIoConnector::new()), PoolConfig::default());
	let connection = pool.acquire(&endpoint, &json!({"type": "sdk", "accessToken": "token-1"})).await.unwrap();

	let key = ResourceKey::generate_task("task-7");
	let wait = pool.subscriptions().subscribe_to_resource(&connection, key.clone()).await.unwrap();
	let payload: ResourcePayload = wait.await.unwrap();
	assert_eq!(payload.content.as_deref(), Some("<div>ok</div>"));

	pool.subscriptions().unsubscribe_from_resource(&connection, &key).await.unwrap();
	pool.release(connection);
	pool.teardown_all().await;

	server.await.unwrap();
}

#[tokio::test]
async fn socket_io_answers_server_ping() {
	let (listener, endpoint) = bind().await;

	let server = tokio::spawn(async move {
		let (mut ws, _) = accept_and_handshake(&listener).await;
		ws.send(Message::Text("2".into())).await.unwrap();
		assert_eq!(next_text(&mut ws).await, "3");
	});

	let pool = ConnectionPool::new(Arc::new(SocketIoConnector::new()), PoolConfig::default());
	let _connection = pool.acquire(&endpoint, &json!({})).await.unwrap();

	server.await.unwrap();
	pool.teardown_all().await;
}

#[tokio::test]
async fn socket_io_connect_error_fails_acquire() {
	let (listener, endpoint) = bind().await;

	let server = tokio::spawn(async move {
		let (stream, _) = listener.accept().await.unwrap();
		let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
		ws.send(Message::Text(OPEN.into())).await.unwrap();
		let _connect = next_text(&mut ws).await;
		ws.send(Message::Text(r#"44{"message":"invalid access token"}"#.into())).await.unwrap();
	});

	let pool = ConnectionPool::new(Arc::new(SocketIoConnector::new()), PoolConfig::default());
	let err = pool.acquire(&endpoint, &json!({})).await.unwrap_err();

	match err {
		Error::Connect { message, .. } => assert_eq!(message, "invalid access token"),
		other => panic!("expected connect error, got {other:?}"),
	}
	assert!(pool.is_empty());
	server.await.unwrap();
}
