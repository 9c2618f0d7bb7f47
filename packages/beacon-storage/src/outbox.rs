//! Durable permission-sync queue drained by `beacon-worker`.
//!
//! Code that mutates the permission graph calls [`enqueue`], ideally on the same transaction as
//! the mutation, so the index update survives restarts and is retried with backoff. The admin
//! HTTP triggers are the non-durable path: they run the sync in-process and lose it on restart.

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{Error, Result, db::Db, models::PermissionSyncJob};

pub const KIND_RECORD: &str = "RECORD";
pub const KIND_GROUP: &str = "GROUP";

/// Queues a `RECORD` (target is a record id) or `GROUP` (target is a group id) sync job.
pub async fn enqueue(db: &Db, kind: &str, target_id: &str, tenant_id: &str) -> Result<Uuid> {
	if !matches!(kind, KIND_RECORD | KIND_GROUP) {
		return Err(Error::InvalidArgument(format!("Unsupported permission sync kind: {kind}.")));
	}
	if target_id.trim().is_empty() || tenant_id.trim().is_empty() {
		return Err(Error::InvalidArgument(
			"target_id and tenant_id are required to enqueue a permission sync".to_string(),
		));
	}

	let outbox_id = Uuid::new_v4();

	sqlx::query(
		"\
INSERT INTO permission_sync_outbox (outbox_id, kind, target_id, tenant_id, status)
VALUES ($1, $2, $3, $4, 'PENDING')",
	)
	.bind(outbox_id)
	.bind(kind)
	.bind(target_id)
	.bind(tenant_id)
	.execute(&db.pool)
	.await?;

	Ok(outbox_id)
}

/// Claims the oldest ready job and pushes its availability past the lease so concurrent workers
/// skip it.
pub async fn claim_next(
	db: &Db,
	now: OffsetDateTime,
	lease: Duration,
) -> Result<Option<PermissionSyncJob>> {
	let mut tx = db.pool.begin().await?;
	let row = sqlx::query_as::<_, PermissionSyncJob>(
		"\
SELECT
	outbox_id,
	kind,
	target_id,
	tenant_id,
	status,
	attempts,
	last_error,
	available_at,
	created_at,
	updated_at
FROM permission_sync_outbox
WHERE status IN ('PENDING', 'FAILED') AND available_at <= $1
ORDER BY available_at ASC
LIMIT 1
FOR UPDATE SKIP LOCKED",
	)
	.bind(now)
	.fetch_optional(&mut *tx)
	.await?;
	let job = if let Some(mut job) = row {
		let lease_until = now + lease;

		sqlx::query(
			"\
UPDATE permission_sync_outbox
SET available_at = $1, updated_at = $2
WHERE outbox_id = $3",
		)
		.bind(lease_until)
		.bind(now)
		.bind(job.outbox_id)
		.execute(&mut *tx)
		.await?;

		job.available_at = lease_until;
		job.updated_at = now;

		Some(job)
	} else {
		None
	};

	tx.commit().await?;

	Ok(job)
}

pub async fn mark_done(db: &Db, outbox_id: Uuid, now: OffsetDateTime) -> Result<()> {
	sqlx::query(
		"UPDATE permission_sync_outbox SET status = 'DONE', updated_at = $1 WHERE outbox_id = $2",
	)
	.bind(now)
	.bind(outbox_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn mark_failed(
	db: &Db,
	outbox_id: Uuid,
	attempts: i32,
	error: &str,
	retry_at: OffsetDateTime,
	now: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
UPDATE permission_sync_outbox
SET
	status = 'FAILED',
	attempts = $1,
	last_error = $2,
	available_at = $3,
	updated_at = $4
WHERE outbox_id = $5",
	)
	.bind(attempts)
	.bind(error)
	.bind(retry_at)
	.bind(now)
	.bind(outbox_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn get(db: &Db, outbox_id: Uuid) -> Result<Option<PermissionSyncJob>> {
	let row = sqlx::query_as::<_, PermissionSyncJob>(
		"\
SELECT
	outbox_id,
	kind,
	target_id,
	tenant_id,
	status,
	attempts,
	last_error,
	available_at,
	created_at,
	updated_at
FROM permission_sync_outbox
WHERE outbox_id = $1",
	)
	.bind(outbox_id)
	.fetch_optional(&db.pool)
	.await?;

	Ok(row)
}
