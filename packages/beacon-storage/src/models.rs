use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RecordDocument {
	pub record_id: String,
	pub tenant_id: String,
	pub record_name: String,
	pub record_type: String,
	/// Content identifier shared by every indexed point derived from this record.
	pub virtual_record_id: Option<String>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PermissionSyncJob {
	pub outbox_id: Uuid,
	pub kind: String,
	pub target_id: String,
	pub tenant_id: String,
	pub status: String,
	pub attempts: i32,
	pub last_error: Option<String>,
	pub available_at: OffsetDateTime,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}
