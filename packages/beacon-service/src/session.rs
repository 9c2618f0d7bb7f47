//! Per-connection command handling.

use std::sync::Arc;

use crate::{
	FrameSink,
	auth::Principal,
	frames::{InboundCommand, InboundFrame, OutboundFrame, SubscriptionAction},
	registry::ConnectionRegistry,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
	AwaitingAuth,
	Connected,
	Closing,
	Closed,
}

/// Lifecycle of one client stream.
///
/// The registry entry is removed exactly once: on [`Session::close`] or, failing that, on drop.
pub struct Session {
	registry: Arc<ConnectionRegistry>,
	connection_id: Option<String>,
	state: SessionState,
}
impl Session {
	pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
		Self { registry, connection_id: None, state: SessionState::AwaitingAuth }
	}

	pub fn state(&self) -> SessionState {
		self.state
	}

	pub fn connection_id(&self) -> Option<&str> {
		self.connection_id.as_deref()
	}

	/// Registers the authenticated stream. Calling this outside `AwaitingAuth` is a no-op.
	pub async fn open(
		&mut self,
		sink: Arc<dyn FrameSink>,
		principal: &Principal,
		topics: Vec<String>,
	) -> Option<&str> {
		if self.state != SessionState::AwaitingAuth {
			return None;
		}

		let connection_id =
			self.registry.connect(sink, &principal.user_id, &principal.tenant_id, topics).await;

		self.connection_id = Some(connection_id);
		self.state = SessionState::Connected;

		self.connection_id.as_deref()
	}

	/// Dispatches one inbound text frame and returns the resulting state.
	///
	/// Protocol errors never end the session. A failed reply means the registry already dropped
	/// the connection, so the session moves to `Closing`.
	pub async fn handle_text(&mut self, text: &str) -> SessionState {
		if self.state != SessionState::Connected {
			return self.state;
		}

		let Some(connection_id) = self.connection_id.clone() else {
			return self.state;
		};
		let command = match InboundFrame::parse(text) {
			Ok(frame) => frame.into_command(),
			Err(err) => {
				tracing::warn!(
					connection_id = %connection_id,
					error = %err,
					"Malformed client frame."
				);

				return self.state;
			},
		};
		let reply = match command {
			InboundCommand::Ping { timestamp } => OutboundFrame::Pong { timestamp },
			InboundCommand::Subscribe { topic: Some(topic) } => OutboundFrame::SubscriptionResult {
				action: SubscriptionAction::Subscribe,
				success: self.registry.subscribe(&connection_id, &topic),
				topic,
			},
			InboundCommand::Subscribe { topic: None } =>
				OutboundFrame::error("Missing topic for subscription"),
			InboundCommand::Unsubscribe { topic: Some(topic) } =>
				OutboundFrame::SubscriptionResult {
					action: SubscriptionAction::Unsubscribe,
					success: self.registry.unsubscribe(&connection_id, &topic),
					topic,
				},
			InboundCommand::Unsubscribe { topic: None } =>
				OutboundFrame::error("Missing topic for unsubscription"),
			InboundCommand::Unknown { action } => {
				tracing::debug!(
					connection_id = %connection_id,
					action = %action,
					"Ignoring unknown client action."
				);

				return self.state;
			},
		};

		if !self.registry.send_to_connection(&connection_id, &reply).await {
			self.state = SessionState::Closing;
		}

		self.state
	}

	/// Removes the connection from the registry. Safe to call more than once.
	pub fn close(&mut self) {
		if self.state == SessionState::Closed {
			return;
		}

		self.state = SessionState::Closing;

		if let Some(connection_id) = self.connection_id.take() {
			self.registry.disconnect(&connection_id);
		}

		self.state = SessionState::Closed;
	}
}

impl Drop for Session {
	fn drop(&mut self) {
		self.close();
	}
}
