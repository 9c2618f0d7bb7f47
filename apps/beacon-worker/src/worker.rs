use std::time::Duration as StdDuration;

use time::{Duration, OffsetDateTime};
use tokio::time as tokio_time;

use beacon_service::PermissionSyncService;
use beacon_storage::{
	db::Db,
	models::PermissionSyncJob,
	outbox::{self, KIND_GROUP, KIND_RECORD},
};

use crate::{Error, Result};

const MAX_OUTBOX_ERROR_CHARS: usize = 1_024;
const CREDENTIAL_KEYS: [&str; 5] = ["api_key", "apikey", "password", "secret", "token"];
const REDACTED: &str = "[REDACTED]";

pub struct WorkerState {
	pub db: Db,
	pub sync: PermissionSyncService,
	pub settings: beacon_config::Worker,
}

pub async fn run_worker(state: WorkerState) -> Result<()> {
	let poll = StdDuration::from_millis(state.settings.poll_interval_ms);

	tracing::info!(
		poll_interval_ms = state.settings.poll_interval_ms,
		"Permission sync worker started."
	);

	loop {
		match process_outbox_once(&state).await {
			// Drain a backlog without waiting between jobs.
			Ok(true) => continue,
			Ok(false) => {},
			Err(err) => {
				tracing::error!(error = %err, "Permission sync outbox processing failed.");
			},
		}

		tokio_time::sleep(poll).await;
	}
}

/// Claims and runs at most one job. Returns `true` when a job was claimed.
pub async fn process_outbox_once(state: &WorkerState) -> Result<bool> {
	let now = OffsetDateTime::now_utc();
	let lease = Duration::seconds(state.settings.claim_lease_seconds);
	let Some(job) = outbox::claim_next(&state.db, now, lease).await? else {
		return Ok(false);
	};

	match run_job(&state.sync, &job).await {
		Ok(()) => {
			outbox::mark_done(&state.db, job.outbox_id, OffsetDateTime::now_utc()).await?;

			tracing::debug!(
				outbox_id = %job.outbox_id,
				kind = %job.kind,
				"Permission sync job done."
			);
		},
		Err(err) => {
			let now = OffsetDateTime::now_utc();
			let next_attempts = job.attempts.saturating_add(1);
			let backoff = backoff_for_attempt(next_attempts, &state.settings);
			let message = sanitize_outbox_error(&err.to_string());

			outbox::mark_failed(
				&state.db,
				job.outbox_id,
				next_attempts,
				&message,
				now + backoff,
				now,
			)
			.await?;

			tracing::error!(
				error = %err,
				outbox_id = %job.outbox_id,
				attempts = next_attempts,
				retry_in_ms = backoff.whole_milliseconds(),
				"Permission sync job failed."
			);
		},
	}

	Ok(true)
}

/// Runs one outbox job against the sync service. Group jobs fail when any affected record fails so
/// the whole change is retried.
pub async fn run_job(sync: &PermissionSyncService, job: &PermissionSyncJob) -> Result<()> {
	match job.kind.as_str() {
		KIND_RECORD =>
			if sync.sync_record_permissions(&job.target_id, &job.tenant_id, None).await {
				Ok(())
			} else {
				Err(Error::Message(format!("Permission sync failed for record {}.", job.target_id)))
			},
		KIND_GROUP => {
			let record_ids = sync.affected_records(&job.target_id, &job.tenant_id).await?;
			let report =
				sync.sync_records_for_group(&job.target_id, &job.tenant_id, &record_ids).await;

			if report.failed > 0 {
				return Err(Error::Message(format!(
					"Permission sync failed for {} of {} records in group {}.",
					report.failed, report.affected_record_count, job.target_id
				)));
			}

			Ok(())
		},
		other => Err(Error::Validation(format!("Unsupported permission sync kind: {other}."))),
	}
}

fn backoff_for_attempt(attempt: i32, settings: &beacon_config::Worker) -> Duration {
	let attempts = attempt.max(1) as u32;
	let exp = attempts.saturating_sub(1).min(6);
	let base = settings.base_backoff_ms.saturating_mul(1 << exp);
	let capped = base.min(settings.max_backoff_ms);

	Duration::milliseconds(capped)
}

/// Error text stored on a failed job: credential values are masked and the result is bounded to
/// `MAX_OUTBOX_ERROR_CHARS`.
fn sanitize_outbox_error(text: &str) -> String {
	let words: Vec<&str> = text.split_whitespace().collect();
	let masked: Vec<String> = words
		.iter()
		.enumerate()
		.map(|(idx, word)| {
			let after_bearer = idx
				.checked_sub(1)
				.is_some_and(|prev| words[prev].eq_ignore_ascii_case("bearer"));

			if after_bearer {
				REDACTED.to_string()
			} else {
				mask_credential(word).unwrap_or_else(|| (*word).to_string())
			}
		})
		.collect();
	let joined = masked.join(" ");

	match joined.char_indices().nth(MAX_OUTBOX_ERROR_CHARS) {
		Some((cut, _)) => format!("{}...", &joined[..cut]),
		None => joined,
	}
}

/// Masks the value of a `key=value` or `key:value` word whose key names a credential.
fn mask_credential(word: &str) -> Option<String> {
	let sep_at = word.find(['=', ':'])?;
	let key = word[..sep_at].to_ascii_lowercase();

	CREDENTIAL_KEYS
		.iter()
		.any(|credential| key.contains(credential))
		.then(|| format!("{}{REDACTED}", &word[..=sep_at]))
}
