//! JSON frames exchanged over a notification connection.
//!
//! Outbound frames are a closed, tagged set so every message the server can emit is known at
//! compile time. Record payloads are built from an allow-list; there is no path that forwards an
//! arbitrary producer map to clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
	Connected {
		connection_id: String,
		#[serde(with = "crate::time_serde")]
		timestamp: OffsetDateTime,
	},
	Pong {
		timestamp: Value,
	},
	SubscriptionResult {
		action: SubscriptionAction,
		topic: String,
		success: bool,
	},
	Error {
		message: String,
	},
	RecordEvent(RecordEventFrame),
}
impl OutboundFrame {
	pub fn error(message: impl Into<String>) -> Self {
		Self::Error { message: message.into() }
	}

	pub fn to_text(&self) -> crate::Result<String> {
		Ok(serde_json::to_string(self)?)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionAction {
	Subscribe,
	Unsubscribe,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordEventFrame {
	pub event_type: EventType,
	pub record_id: String,
	pub kb_id: Option<String>,
	#[serde(with = "crate::time_serde")]
	pub timestamp: OffsetDateTime,
	pub payload: RecordEventPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
	New,
	Update,
	Delete,
	Reindex,
	StatusChange,
}
impl EventType {
	/// Accepts both the event bus names (`newRecord`, ...) and the short wire names.
	pub fn parse(raw: &str) -> Option<Self> {
		match raw.trim() {
			"newRecord" | "new" => Some(Self::New),
			"updateRecord" | "update" => Some(Self::Update),
			"deleteRecord" | "delete" => Some(Self::Delete),
			"reindexRecord" | "reindex" => Some(Self::Reindex),
			"statusChange" | "status_change" | "status-change" => Some(Self::StatusChange),
			_ => None,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::New => "new",
			Self::Update => "update",
			Self::Delete => "delete",
			Self::Reindex => "reindex",
			Self::StatusChange => "status_change",
		}
	}

	/// Whether indexing/processing progress is meaningful for this event.
	pub fn carries_status(&self) -> bool {
		!matches!(self, Self::Delete)
	}
}

/// Sanitized record fields sent to clients. Absent fields are omitted from the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordEventPayload {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub record_id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub record_name: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub kb_id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub folder_id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub record_type: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub connector_name: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub origin: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub indexing_status: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub extraction_status: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub progress: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub old_status: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub new_status: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub extension: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub mime_type: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub size_in_bytes: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub created_at: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub updated_at: Option<Value>,
}
impl RecordEventPayload {
	/// Fills every field that is unset here from `other`.
	pub fn merge_missing(&mut self, other: RecordEventPayload) {
		fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
			if slot.is_none() {
				*slot = value;
			}
		}

		fill(&mut self.record_id, other.record_id);
		fill(&mut self.record_name, other.record_name);
		fill(&mut self.kb_id, other.kb_id);
		fill(&mut self.folder_id, other.folder_id);
		fill(&mut self.record_type, other.record_type);
		fill(&mut self.connector_name, other.connector_name);
		fill(&mut self.origin, other.origin);
		fill(&mut self.indexing_status, other.indexing_status);
		fill(&mut self.extraction_status, other.extraction_status);
		fill(&mut self.progress, other.progress);
		fill(&mut self.old_status, other.old_status);
		fill(&mut self.new_status, other.new_status);
		fill(&mut self.extension, other.extension);
		fill(&mut self.mime_type, other.mime_type);
		fill(&mut self.size_in_bytes, other.size_in_bytes);
		fill(&mut self.created_at, other.created_at);
		fill(&mut self.updated_at, other.updated_at);
	}
}

/// A client command frame. Frames without an `action` fail to decode and are treated as
/// malformed.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
	pub action: String,
	#[serde(default)]
	pub topic: Option<String>,
	#[serde(default)]
	pub timestamp: Option<Value>,
}
impl InboundFrame {
	pub fn parse(raw: &str) -> crate::Result<Self> {
		Ok(serde_json::from_str(raw)?)
	}

	pub fn into_command(self) -> InboundCommand {
		let topic =
			self.topic.map(|topic| topic.trim().to_string()).filter(|topic| !topic.is_empty());

		match self.action.as_str() {
			"ping" => InboundCommand::Ping { timestamp: self.timestamp.unwrap_or(Value::Null) },
			"subscribe" => InboundCommand::Subscribe { topic },
			"unsubscribe" => InboundCommand::Unsubscribe { topic },
			_ => InboundCommand::Unknown { action: self.action },
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundCommand {
	Ping { timestamp: Value },
	Subscribe { topic: Option<String> },
	Unsubscribe { topic: Option<String> },
	Unknown { action: String },
}
