use axum::{
	Json, Router,
	extract::State,
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use beacon_service::RegistryStats;

use crate::{state::AppState, ws};

#[derive(Debug, Deserialize)]
pub struct EventEnvelope {
	#[serde(rename = "eventType")]
	pub event_type: String,
	#[serde(default)]
	pub payload: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct EventResponse {
	pub handled: bool,
}

#[derive(Debug, Deserialize)]
pub struct SyncRecordsRequest {
	pub record_ids: Vec<String>,
	pub tenant_id: String,
	pub concurrency_limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SyncGroupRequest {
	pub group_id: String,
	pub tenant_id: String,
}

#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
	pub accepted: usize,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}
impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		fields: Option<Vec<String>>,
	) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), fields }
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code, message: self.message, fields: self.fields };

		(self.status, Json(body)).into_response()
	}
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/ws", get(ws::ws_handler))
		.route("/v1/notifications/stats", get(stats))
		.with_state(state)
}

pub fn admin_router(state: AppState) -> Router {
	Router::new()
		.route("/v1/admin/events", post(ingest_event))
		.route("/v1/admin/permissions/records", post(sync_records))
		.route("/v1/admin/permissions/groups", post(sync_group))
		.with_state(state)
}

pub fn json_error(
	status: StatusCode,
	code: &str,
	message: impl Into<String>,
	fields: Option<Vec<String>>,
) -> ApiError {
	ApiError::new(status, code, message, fields)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn stats(State(state): State<AppState>) -> Json<RegistryStats> {
	Json(state.registry.stats())
}

async fn ingest_event(
	State(state): State<AppState>,
	Json(envelope): Json<EventEnvelope>,
) -> Json<EventResponse> {
	let handled = state.bridge.process_event(&envelope.event_type, &envelope.payload).await;

	Json(EventResponse { handled })
}

/// Runs the batch in a detached task. Producers that need the sync to survive a restart enqueue
/// it through `beacon_storage::outbox::enqueue` instead.
async fn sync_records(
	State(state): State<AppState>,
	Json(request): Json<SyncRecordsRequest>,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
	let tenant_id = required(&request.tenant_id, "$.tenant_id")?;
	let record_ids: Vec<String> = request
		.record_ids
		.iter()
		.map(|record_id| record_id.trim())
		.filter(|record_id| !record_id.is_empty())
		.map(str::to_string)
		.collect();

	if record_ids.is_empty() {
		return Err(json_error(
			StatusCode::BAD_REQUEST,
			"INVALID_REQUEST",
			"record_ids must contain at least one id.",
			Some(vec!["$.record_ids".to_string()]),
		));
	}
	if request.concurrency_limit == Some(0) {
		return Err(json_error(
			StatusCode::BAD_REQUEST,
			"INVALID_REQUEST",
			"concurrency_limit must be greater than zero.",
			Some(vec!["$.concurrency_limit".to_string()]),
		));
	}

	let accepted = record_ids.len();
	let service = state.permission_sync.clone();
	let limit = request.concurrency_limit.unwrap_or_else(|| service.default_concurrency_limit());

	tokio::spawn(async move {
		service.sync_multiple_records(&record_ids, &tenant_id, limit).await;
	});

	Ok((StatusCode::ACCEPTED, Json(AcceptedResponse { accepted })))
}

async fn sync_group(
	State(state): State<AppState>,
	Json(request): Json<SyncGroupRequest>,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
	let group_id = required(&request.group_id, "$.group_id")?;
	let tenant_id = required(&request.tenant_id, "$.tenant_id")?;
	let service = state.permission_sync.clone();

	tokio::spawn(async move {
		let report = service.sync_group_permission_change(&group_id, &tenant_id).await;

		tracing::info!(
			group_id = %group_id,
			affected = report.affected_record_count,
			failed = report.failed,
			"Group permission change synced."
		);
	});

	Ok((StatusCode::ACCEPTED, Json(AcceptedResponse { accepted: 1 })))
}

fn required(value: &str, field: &str) -> Result<String, ApiError> {
	let trimmed = value.trim();

	if trimmed.is_empty() {
		return Err(json_error(
			StatusCode::BAD_REQUEST,
			"INVALID_REQUEST",
			format!("{field} must not be empty."),
			Some(vec![field.to_string()]),
		));
	}

	Ok(trimmed.to_string())
}
