use std::sync::Arc;

use axum::{
	extract::{
		Query, State,
		ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
	},
	response::Response,
};
use futures_util::{
	SinkExt, StreamExt,
	stream::{SplitSink, SplitStream},
};
use serde::Deserialize;
use tokio::sync::Mutex;

use beacon_service::{AuthRejection, BoxFuture, Error, FrameSink, Session, SessionState};

use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
	pub token: Option<String>,
	/// Comma-separated initial topics.
	pub topics: Option<String>,
}

/// Outbound half of an axum WebSocket.
pub struct WsSink {
	sender: Mutex<SplitSink<WebSocket, Message>>,
}
impl WsSink {
	fn new(sender: SplitSink<WebSocket, Message>) -> Self {
		Self { sender: Mutex::new(sender) }
	}

	async fn close(&self) {
		let mut sender = self.sender.lock().await;

		if let Err(err) = sender.close().await {
			tracing::debug!(error = %err, "WebSocket was already closed.");
		}
	}
}
impl FrameSink for WsSink {
	fn send_text<'a>(&'a self, text: &'a str) -> BoxFuture<'a, beacon_service::Result<()>> {
		Box::pin(async move {
			let mut sender = self.sender.lock().await;

			sender
				.send(Message::Text(text.into()))
				.await
				.map_err(|err| Error::Transport { message: err.to_string() })
		})
	}
}

pub async fn ws_handler(
	ws: WebSocketUpgrade,
	State(state): State<AppState>,
	Query(params): Query<ConnectParams>,
) -> Response {
	ws.on_upgrade(move |socket| handle_socket(socket, state, params))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, params: ConnectParams) {
	let mut session = Session::new(state.registry.clone());
	let principal = match state.authenticator.authenticate(params.token.as_deref()).await {
		Ok(principal) => principal,
		Err(rejection) => {
			tracing::info!(reason = rejection.as_str(), "Rejected WebSocket connection.");

			reject(&mut socket, rejection).await;

			return;
		},
	};
	let (sender, receiver) = socket.split();
	let sink = Arc::new(WsSink::new(sender));

	session.open(sink.clone(), &principal, parse_topics(params.topics.as_deref())).await;

	receive_loop(&mut session, receiver).await;

	session.close();
	sink.close().await;
}

async fn receive_loop(session: &mut Session, mut receiver: SplitStream<WebSocket>) {
	while let Some(message) = receiver.next().await {
		match message {
			Ok(Message::Text(text)) =>
				if session.handle_text(text.as_str()).await != SessionState::Connected {
					break;
				},
			Ok(Message::Close(_)) => break,
			Ok(_) => {},
			Err(err) => {
				tracing::debug!(
					connection_id = session.connection_id().unwrap_or_default(),
					error = %err,
					"WebSocket receive failed."
				);

				break;
			},
		}
	}
}

async fn reject(socket: &mut WebSocket, rejection: AuthRejection) {
	let frame = CloseFrame { code: rejection.close_code(), reason: Utf8Bytes::from_static("") };

	if let Err(err) = socket.send(Message::Close(Some(frame))).await {
		tracing::debug!(error = %err, "Failed to send close frame.");
	}
}

fn parse_topics(raw: Option<&str>) -> Vec<String> {
	raw.unwrap_or_default()
		.split(',')
		.map(str::trim)
		.filter(|topic| !topic.is_empty())
		.map(str::to_string)
		.collect()
}
