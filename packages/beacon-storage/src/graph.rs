//! Permission graph queries.
//!
//! Principals (users and groups) reach records through `permission_edges`; users reach groups
//! through `group_members`. All lookups are scoped to a tenant.

use sqlx::PgExecutor;

use crate::{Error, Result, models::RecordDocument};

pub const PRINCIPAL_USER: &str = "user";
pub const PRINCIPAL_GROUP: &str = "group";

pub async fn get_record<'e, E>(executor: E, record_id: &str) -> Result<Option<RecordDocument>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, RecordDocument>(
		"\
SELECT
	record_id,
	tenant_id,
	record_name,
	record_type,
	virtual_record_id,
	created_at,
	updated_at
FROM records
WHERE record_id = $1",
	)
	.bind(record_id)
	.fetch_optional(executor)
	.await?;

	Ok(row)
}

/// Every principal with read access to the record: directly granted users and groups, plus the
/// members of granted groups.
pub async fn get_record_permissions<'e, E>(
	executor: E,
	record_id: &str,
	tenant_id: &str,
) -> Result<Vec<String>>
where
	E: PgExecutor<'e>,
{
	if record_id.trim().is_empty() || tenant_id.trim().is_empty() {
		return Err(Error::InvalidArgument(
			"record_id and tenant_id are required to resolve permissions".to_string(),
		));
	}

	let rows: Vec<(String,)> = sqlx::query_as(
		"\
SELECT principal_id
FROM permission_edges
WHERE record_id = $1
	AND tenant_id = $2
UNION
SELECT gm.user_id
FROM permission_edges pe
JOIN group_members gm
	ON gm.group_id = pe.principal_id
	AND gm.tenant_id = pe.tenant_id
WHERE pe.record_id = $1
	AND pe.tenant_id = $2
	AND pe.principal_kind = 'group'
ORDER BY 1",
	)
	.bind(record_id)
	.bind(tenant_id)
	.fetch_all(executor)
	.await?;

	Ok(rows.into_iter().map(|(principal_id,)| principal_id).collect())
}

/// One-hop traversal: group -> permission edge -> record.
pub async fn records_for_group<'e, E>(
	executor: E,
	group_id: &str,
	tenant_id: &str,
) -> Result<Vec<String>>
where
	E: PgExecutor<'e>,
{
	let rows: Vec<(String,)> = sqlx::query_as(
		"\
SELECT DISTINCT record_id
FROM permission_edges
WHERE principal_kind = 'group'
	AND principal_id = $1
	AND tenant_id = $2
ORDER BY record_id",
	)
	.bind(group_id)
	.bind(tenant_id)
	.fetch_all(executor)
	.await?;

	Ok(rows.into_iter().map(|(record_id,)| record_id).collect())
}
