use std::{net::SocketAddr, time::Duration};

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::{net::TcpStream, time};
use tokio_tungstenite::{
	MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message,
};

use beacon_service::RegistryStats;

use super::StubGraph;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(addr: SocketAddr, query: &str) -> Client {
	let (client, _) =
		connect_async(format!("ws://{addr}/v1/ws?{query}")).await.expect("Failed to connect.");

	client
}

fn valid_token() -> String {
	super::token(json!({ "user_id": "alice", "tenant_id": "acme", "exp": super::expires_in(600) }))
}

async fn next_message(client: &mut Client) -> Message {
	time::timeout(Duration::from_secs(5), client.next())
		.await
		.expect("Timed out waiting for a frame.")
		.expect("Stream ended unexpectedly.")
		.expect("Failed to read frame.")
}

async fn next_json(client: &mut Client) -> Value {
	loop {
		if let Message::Text(text) = next_message(client).await {
			return serde_json::from_str(text.as_str()).expect("Frame must be JSON.");
		}
	}
}

async fn send_json(client: &mut Client, frame: Value) {
	client.send(Message::Text(frame.to_string().into())).await.expect("Failed to send frame.");
}

async fn close_code(client: &mut Client) -> u16 {
	match next_message(client).await {
		Message::Close(Some(frame)) => u16::from(frame.code),
		other => panic!("Expected a close frame, got {other:?}."),
	}
}

#[tokio::test]
async fn connect_subscribe_and_ping() {
	let app = super::test_app(StubGraph::default());
	let registry = app.state.registry.clone();
	let addr = super::spawn_public(app.state).await;
	let mut client = connect(addr, &format!("token={}&topics=kb-1,kb-2", valid_token())).await;
	let ack = next_json(&mut client).await;
	let connection_id = ack["connection_id"].as_str().expect("Ack must carry an id.").to_string();

	assert_eq!(ack["type"], "connected");
	assert_eq!(
		registry.subscriptions(&connection_id),
		Some(vec!["kb-1".to_string(), "kb-2".to_string()])
	);
	assert_eq!(
		registry.stats(),
		RegistryStats { total_connections: 1, unique_users: 1, unique_orgs: 1 }
	);

	send_json(&mut client, json!({ "action": "subscribe", "topic": "kb-3" })).await;

	assert_eq!(
		next_json(&mut client).await,
		json!({
			"type": "subscription_result",
			"action": "subscribe",
			"topic": "kb-3",
			"success": true
		})
	);

	send_json(&mut client, json!({ "action": "ping", "timestamp": "t-1" })).await;

	assert_eq!(next_json(&mut client).await, json!({ "type": "pong", "timestamp": "t-1" }));

	client.close(None).await.expect("Failed to close client.");

	assert!(super::eventually(|| registry.stats().total_connections == 0).await);
}

#[tokio::test]
async fn record_events_arrive_once_per_connection() {
	let app = super::test_app(StubGraph::default());
	let bridge = app.state.bridge.clone();
	let registry = app.state.registry.clone();
	let addr = super::spawn_public(app.state).await;
	let mut subscribed = connect(addr, &format!("token={}&topics=kb-1", valid_token())).await;
	let mut browsing = connect(addr, &format!("token={}", valid_token())).await;

	next_json(&mut subscribed).await;
	next_json(&mut browsing).await;

	let payload = json!({ "recordId": "r1", "orgId": "acme", "kbId": "kb-1", "apiKey": "leak" });
	let payload = payload.as_object().expect("Payload must be an object.");

	assert!(bridge.process_event("updateRecord", payload).await);

	for client in [&mut subscribed, &mut browsing] {
		let event = next_json(client).await;

		assert_eq!(event["type"], "record_event");
		assert_eq!(event["event_type"], "update");
		assert!(event["payload"].get("apiKey").is_none());
	}

	send_json(&mut subscribed, json!({ "action": "ping", "timestamp": 1 })).await;

	// A duplicate event would arrive before the pong.
	assert_eq!(next_json(&mut subscribed).await["type"], "pong");
	assert_eq!(registry.stats().total_connections, 2);
}

#[tokio::test]
async fn rejected_connections_get_distinct_close_codes() {
	let app = super::test_app(StubGraph::default());
	let registry = app.state.registry.clone();
	let addr = super::spawn_public(app.state).await;
	let expired = super::token(
		json!({ "user_id": "alice", "tenant_id": "acme", "exp": super::expires_in(-3_600) }),
	);
	let no_user = super::token(json!({ "tenant_id": "acme", "exp": super::expires_in(600) }));
	let mut missing_client = connect(addr, "topics=kb-1").await;
	let mut expired_client = connect(addr, &format!("token={expired}")).await;
	let mut incomplete_client = connect(addr, &format!("token={no_user}")).await;

	assert_eq!(close_code(&mut missing_client).await, 4001);
	assert_eq!(close_code(&mut expired_client).await, 4002);
	assert_eq!(close_code(&mut incomplete_client).await, 4003);
	assert_eq!(registry.stats(), RegistryStats::default());
}
