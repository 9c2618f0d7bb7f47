//! Adapts record lifecycle events from the event bus into registry broadcasts.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::{
	frames::{EventType, RecordEventPayload},
	registry::ConnectionRegistry,
};

const RECORD_ID_KEYS: &[&str] = &["recordId", "_key", "record_id"];
const TENANT_ID_KEYS: &[&str] = &["orgId", "tenantId", "tenant_id", "org_id"];
const KB_ID_KEYS: &[&str] = &["kbId", "kb_id"];

/// A known status transition reported by an internal component.
#[derive(Debug, Clone, Copy)]
pub struct StatusChange<'a> {
	pub record_id: &'a str,
	pub tenant_id: &'a str,
	pub kb_id: Option<&'a str>,
	pub old_status: &'a str,
	pub new_status: &'a str,
	/// Additional raw record fields; passed through the same allow-list as bus events.
	pub extra: Option<&'a Map<String, Value>>,
}

pub struct EventBridge {
	registry: Arc<ConnectionRegistry>,
}
impl EventBridge {
	pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
		Self { registry }
	}

	/// Handles a decoded bus message of the form `{"eventType": ..., "payload": {...}}`.
	pub async fn handle_envelope(&self, envelope: &Value) -> bool {
		let event_type = envelope.get("eventType").and_then(Value::as_str);
		let payload = envelope.get("payload").and_then(Value::as_object);
		let (Some(event_type), Some(payload)) = (event_type, payload) else {
			tracing::warn!("Skipping event without eventType or payload.");

			return false;
		};

		self.process_event(event_type, payload).await
	}

	/// Broadcasts one record event. Returns `false` only when the event cannot be routed at all;
	/// the caller keeps consuming either way.
	pub async fn process_event(&self, event_type: &str, payload: &Map<String, Value>) -> bool {
		let Some(kind) = EventType::parse(event_type) else {
			tracing::warn!(event_type = %event_type, "Skipping event with unknown type.");

			return false;
		};
		let Some(record_id) = text_field(payload, RECORD_ID_KEYS) else {
			tracing::warn!(event_type = %event_type, "Skipping event without a record id.");

			return false;
		};
		let tenant_id = text_field(payload, TENANT_ID_KEYS);

		if tenant_id.is_none() {
			tracing::warn!(
				record_id = %record_id,
				"Event has no tenant id. Tenant broadcast will reach nobody."
			);
		}

		let mut sanitized = sanitize_payload(kind, payload);

		sanitized.record_id = Some(record_id.clone());

		let kb_id = sanitized.kb_id.clone();
		let delivered = self
			.registry
			.broadcast_record_event(
				kind,
				&record_id,
				tenant_id.as_deref(),
				kb_id.as_deref(),
				sanitized,
			)
			.await;

		tracing::debug!(
			event_type = kind.as_str(),
			record_id = %record_id,
			delivered,
			"Record event processed."
		);

		true
	}

	/// Returns whether at least one connection received the event.
	pub async fn handle_status_change(&self, change: StatusChange<'_>) -> bool {
		let mut payload = RecordEventPayload {
			record_id: Some(change.record_id.to_string()),
			kb_id: change.kb_id.map(str::to_string),
			old_status: Some(change.old_status.to_string()),
			new_status: Some(change.new_status.to_string()),
			..Default::default()
		};

		if let Some(extra) = change.extra {
			payload.merge_missing(sanitize_payload(EventType::StatusChange, extra));
		}

		let kb_id = payload.kb_id.clone();
		let delivered = self
			.registry
			.broadcast_record_event(
				EventType::StatusChange,
				change.record_id,
				Some(change.tenant_id),
				kb_id.as_deref(),
				payload,
			)
			.await;

		delivered > 0
	}
}

/// Copies the allow-listed fields of a raw producer payload. Anything not named here never
/// reaches a client.
pub fn sanitize_payload(event_type: EventType, raw: &Map<String, Value>) -> RecordEventPayload {
	let mut payload = RecordEventPayload {
		record_id: text_field(raw, RECORD_ID_KEYS),
		record_name: text_field(raw, &["recordName", "record_name"]),
		kb_id: text_field(raw, KB_ID_KEYS),
		folder_id: text_field(raw, &["folderId", "folder_id"]),
		record_type: text_field(raw, &["recordType", "record_type"]),
		connector_name: text_field(raw, &["connectorName", "connector_name"]),
		origin: text_field(raw, &["origin"]),
		extension: text_field(raw, &["extension"]),
		mime_type: text_field(raw, &["mimeType", "mime_type"]),
		size_in_bytes: size_field(raw, &["sizeInBytes", "size_in_bytes"]),
		created_at: scalar_field(raw, &["createdAtTimestamp", "createdAt", "created_at"]),
		updated_at: scalar_field(raw, &["updatedAtTimestamp", "updatedAt", "updated_at"]),
		..Default::default()
	};

	if event_type.carries_status() {
		payload.indexing_status = text_field(raw, &["indexingStatus", "indexing_status"]);
		payload.extraction_status = text_field(raw, &["extractionStatus", "extraction_status"]);
		payload.progress = scalar_field(raw, &["progress"]);
		payload.old_status = text_field(raw, &["oldStatus", "old_status"]);
		payload.new_status = text_field(raw, &["newStatus", "new_status"]);
	}

	payload
}

fn first<'a>(raw: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
	keys.iter().filter_map(|key| raw.get(*key)).find(|value| !value.is_null())
}

fn text_field(raw: &Map<String, Value>, keys: &[&str]) -> Option<String> {
	match first(raw, keys)? {
		Value::String(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
		Value::Number(value) => Some(value.to_string()),
		_ => None,
	}
}

fn scalar_field(raw: &Map<String, Value>, keys: &[&str]) -> Option<Value> {
	match first(raw, keys)? {
		value @ (Value::Number(_) | Value::Bool(_)) => Some(value.clone()),
		Value::String(value) if !value.trim().is_empty() => Some(Value::String(value.clone())),
		_ => None,
	}
}

fn size_field(raw: &Map<String, Value>, keys: &[&str]) -> Option<u64> {
	match first(raw, keys)? {
		Value::Number(value) => value.as_u64(),
		Value::String(value) => value.trim().parse().ok(),
		_ => None,
	}
}
