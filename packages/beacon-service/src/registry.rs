//! In-memory registry of live notification connections.
//!
//! Connections are indexed by id, by user, and by tenant. All three indices live behind one
//! mutex so every mutation updates them together. Fan-out snapshots recipients under the lock and
//! sends after releasing it; a failed or timed out send reaps the connection.

use std::{
	collections::{HashMap, HashSet},
	sync::{Arc, Mutex, MutexGuard},
	time::Duration,
};

use futures_util::future;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::time as tokio_time;
use uuid::Uuid;

use crate::{
	Error, FrameSink, Result,
	frames::{EventType, OutboundFrame, RecordEventFrame, RecordEventPayload},
};

pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

type Recipient = (String, Arc<dyn FrameSink>);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
	pub total_connections: usize,
	pub unique_users: usize,
	pub unique_orgs: usize,
}

pub struct ConnectionRegistry {
	indices: Mutex<Indices>,
	send_timeout: Duration,
}
impl ConnectionRegistry {
	pub fn new() -> Self {
		Self::with_send_timeout(DEFAULT_SEND_TIMEOUT)
	}

	/// A send that does not finish within `send_timeout` counts as a transport failure.
	pub fn with_send_timeout(send_timeout: Duration) -> Self {
		Self { indices: Mutex::new(Indices::default()), send_timeout }
	}

	/// Sends the `connected` acknowledgment, then registers the stream.
	///
	/// The acknowledgment goes out before the connection is visible to broadcasts, so it is always
	/// the first frame on the stream. Registration is unconditional. A failed acknowledgment
	/// leaves the connection registered; the next send to it reaps it.
	pub async fn connect<I>(
		&self,
		sink: Arc<dyn FrameSink>,
		user_id: &str,
		tenant_id: &str,
		initial_subscriptions: I,
	) -> String
	where
		I: IntoIterator<Item = String>,
	{
		let connection_id = Uuid::new_v4().to_string();
		let connected_at = OffsetDateTime::now_utc();
		let subscriptions = initial_subscriptions
			.into_iter()
			.map(|topic| topic.trim().to_string())
			.filter(|topic| !topic.is_empty())
			.collect();
		let ack = OutboundFrame::Connected {
			connection_id: connection_id.clone(),
			timestamp: connected_at,
		};

		match ack.to_text() {
			Ok(text) =>
				if let Err(err) = self.send_bounded(sink.as_ref(), &text).await {
					tracing::warn!(
						connection_id = %connection_id,
						error = %err,
						"Failed to send connection acknowledgment."
					);
				},
			Err(err) => {
				tracing::error!(error = %err, "Failed to encode connection acknowledgment.");
			},
		}

		self.lock().insert(
			connection_id.clone(),
			Connection {
				sink,
				user_id: user_id.to_string(),
				tenant_id: tenant_id.to_string(),
				connected_at,
				subscriptions,
			},
		);

		tracing::info!(
			connection_id = %connection_id,
			user_id = %user_id,
			tenant_id = %tenant_id,
			"Connection registered."
		);

		connection_id
	}

	/// Removes the connection from every index. Returns whether it was present.
	pub fn disconnect(&self, connection_id: &str) -> bool {
		let removed = self.lock().remove(connection_id);

		if let Some(connection) = removed.as_ref() {
			let connected_for = OffsetDateTime::now_utc() - connection.connected_at;

			tracing::info!(
				connection_id = %connection_id,
				user_id = %connection.user_id,
				connected_seconds = connected_for.whole_seconds(),
				"Connection removed."
			);
		}

		removed.is_some()
	}

	pub fn subscribe(&self, connection_id: &str, topic: &str) -> bool {
		let mut indices = self.lock();
		let Some(connection) = indices.connections.get_mut(connection_id) else {
			return false;
		};

		connection.subscriptions.insert(topic.to_string());

		true
	}

	pub fn unsubscribe(&self, connection_id: &str, topic: &str) -> bool {
		let mut indices = self.lock();
		let Some(connection) = indices.connections.get_mut(connection_id) else {
			return false;
		};

		connection.subscriptions.remove(topic);

		true
	}

	pub fn contains(&self, connection_id: &str) -> bool {
		self.lock().connections.contains_key(connection_id)
	}

	/// Sorted topics of a live connection.
	pub fn subscriptions(&self, connection_id: &str) -> Option<Vec<String>> {
		let indices = self.lock();
		let connection = indices.connections.get(connection_id)?;
		let mut topics: Vec<String> = connection.subscriptions.iter().cloned().collect();

		topics.sort();

		Some(topics)
	}

	pub fn stats(&self) -> RegistryStats {
		let indices = self.lock();

		RegistryStats {
			total_connections: indices.connections.len(),
			unique_users: indices.by_user.len(),
			unique_orgs: indices.by_tenant.len(),
		}
	}

	pub async fn send_to_connection(&self, connection_id: &str, frame: &OutboundFrame) -> bool {
		let Some(text) = encode(frame) else {
			return false;
		};
		let sink =
			self.lock().connections.get(connection_id).map(|connection| connection.sink.clone());
		let Some(sink) = sink else {
			return false;
		};

		self.deliver(connection_id.to_string(), sink, &text).await
	}

	pub async fn send_to_user(&self, user_id: &str, frame: &OutboundFrame) -> usize {
		let recipients = self.lock().recipients_in(Bucket::User, user_id);

		self.fan_out(recipients, frame).await
	}

	pub async fn broadcast_to_tenant(&self, tenant_id: &str, frame: &OutboundFrame) -> usize {
		let recipients = self.lock().recipients_in(Bucket::Tenant, tenant_id);

		self.fan_out(recipients, frame).await
	}

	/// Sends to subscribers of `topic`, narrowed to `tenant_id` when one is given.
	pub async fn broadcast_to_topic(
		&self,
		topic: &str,
		frame: &OutboundFrame,
		tenant_id: Option<&str>,
	) -> usize {
		let recipients = self.lock().topic_recipients(topic, tenant_id);

		self.fan_out(recipients, frame).await
	}

	/// Delivers a `record_event` frame to the union of the topic (`kb_id`) subscribers and the
	/// tenant's connections. Each connection receives the frame at most once; the return value
	/// is the number of successful sends.
	pub async fn broadcast_record_event(
		&self,
		event_type: EventType,
		record_id: &str,
		tenant_id: Option<&str>,
		kb_id: Option<&str>,
		payload: RecordEventPayload,
	) -> usize {
		let frame = OutboundFrame::RecordEvent(RecordEventFrame {
			event_type,
			record_id: record_id.to_string(),
			kb_id: kb_id.map(str::to_string),
			timestamp: OffsetDateTime::now_utc(),
			payload,
		});
		let recipients = {
			let indices = self.lock();
			let mut recipients = match tenant_id {
				Some(tenant_id) => indices.recipients_in(Bucket::Tenant, tenant_id),
				None => Vec::new(),
			};

			if let Some(kb_id) = kb_id {
				let mut seen: HashSet<String> =
					recipients.iter().map(|(connection_id, _)| connection_id.clone()).collect();

				for recipient in indices.topic_recipients(kb_id, tenant_id) {
					if seen.insert(recipient.0.clone()) {
						recipients.push(recipient);
					}
				}
			}

			recipients
		};

		tracing::debug!(
			event_type = event_type.as_str(),
			record_id = %record_id,
			recipients = recipients.len(),
			"Broadcasting record event."
		);

		self.fan_out(recipients, &frame).await
	}

	fn lock(&self) -> MutexGuard<'_, Indices> {
		self.indices.lock().unwrap_or_else(|err| err.into_inner())
	}

	async fn fan_out(&self, recipients: Vec<Recipient>, frame: &OutboundFrame) -> usize {
		if recipients.is_empty() {
			return 0;
		}

		let Some(text) = encode(frame) else {
			return 0;
		};
		let sends = recipients
			.into_iter()
			.map(|(connection_id, sink)| self.deliver(connection_id, sink, &text));

		future::join_all(sends).await.into_iter().filter(|delivered| *delivered).count()
	}

	async fn deliver(&self, connection_id: String, sink: Arc<dyn FrameSink>, text: &str) -> bool {
		match self.send_bounded(sink.as_ref(), text).await {
			Ok(()) => true,
			Err(err) => {
				tracing::warn!(
					connection_id = %connection_id,
					error = %err,
					"Send failed. Dropping connection."
				);

				self.disconnect(&connection_id);

				false
			},
		}
	}

	async fn send_bounded(&self, sink: &dyn FrameSink, text: &str) -> Result<()> {
		match tokio_time::timeout(self.send_timeout, sink.send_text(text)).await {
			Ok(result) => result,
			Err(_) => Err(Error::Transport {
				message: format!("Send timed out after {} ms.", self.send_timeout.as_millis()),
			}),
		}
	}
}
impl Default for ConnectionRegistry {
	fn default() -> Self {
		Self::new()
	}
}

struct Connection {
	sink: Arc<dyn FrameSink>,
	user_id: String,
	tenant_id: String,
	connected_at: OffsetDateTime,
	subscriptions: HashSet<String>,
}

#[derive(Clone, Copy)]
enum Bucket {
	User,
	Tenant,
}

#[derive(Default)]
struct Indices {
	connections: HashMap<String, Connection>,
	by_user: HashMap<String, HashSet<String>>,
	by_tenant: HashMap<String, HashSet<String>>,
}
impl Indices {
	fn insert(&mut self, connection_id: String, connection: Connection) {
		self.by_user
			.entry(connection.user_id.clone())
			.or_default()
			.insert(connection_id.clone());
		self.by_tenant
			.entry(connection.tenant_id.clone())
			.or_default()
			.insert(connection_id.clone());
		self.connections.insert(connection_id, connection);
	}

	fn remove(&mut self, connection_id: &str) -> Option<Connection> {
		let connection = self.connections.remove(connection_id)?;

		prune(&mut self.by_user, &connection.user_id, connection_id);
		prune(&mut self.by_tenant, &connection.tenant_id, connection_id);

		Some(connection)
	}

	fn recipients_in(&self, bucket: Bucket, key: &str) -> Vec<Recipient> {
		let index = match bucket {
			Bucket::User => &self.by_user,
			Bucket::Tenant => &self.by_tenant,
		};
		let Some(ids) = index.get(key) else {
			return Vec::new();
		};

		ids.iter()
			.filter_map(|connection_id| {
				self.connections
					.get(connection_id)
					.map(|connection| (connection_id.clone(), connection.sink.clone()))
			})
			.collect()
	}

	fn topic_recipients(&self, topic: &str, tenant_id: Option<&str>) -> Vec<Recipient> {
		let subscribed = |(connection_id, connection): (&String, &Connection)| {
			connection
				.subscriptions
				.contains(topic)
				.then(|| (connection_id.clone(), connection.sink.clone()))
		};

		match tenant_id {
			Some(tenant_id) => self
				.by_tenant
				.get(tenant_id)
				.into_iter()
				.flatten()
				.filter_map(|connection_id| {
					self.connections.get_key_value(connection_id).and_then(&subscribed)
				})
				.collect(),
			None => self.connections.iter().filter_map(&subscribed).collect(),
		}
	}
}

fn prune(index: &mut HashMap<String, HashSet<String>>, key: &str, connection_id: &str) {
	if let Some(ids) = index.get_mut(key) {
		ids.remove(connection_id);

		if ids.is_empty() {
			index.remove(key);
		}
	}
}

fn encode(frame: &OutboundFrame) -> Option<String> {
	match frame.to_text() {
		Ok(text) => Some(text),
		Err(err) => {
			tracing::error!(error = %err, "Failed to encode outbound frame.");

			None
		},
	}
}
