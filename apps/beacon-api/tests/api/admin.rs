use std::collections::HashMap;

use axum::{
	Router,
	body::{self, Body},
	http::{Request, StatusCode},
};
use serde_json::{Value, json};
use tower::util::ServiceExt;

use beacon_api::routes;

use super::StubGraph;

async fn post_json(app: Router, uri: &str, payload: Value) -> (StatusCode, Value) {
	let response = app
		.oneshot(
			Request::builder()
				.method("POST")
				.uri(uri)
				.header("content-type", "application/json")
				.body(Body::from(payload.to_string()))
				.expect("Failed to build request."),
		)
		.await
		.expect("Failed to call admin route.");
	let status = response.status();
	let body = body::to_bytes(response.into_body(), usize::MAX)
		.await
		.expect("Failed to read response body.");
	let json = serde_json::from_slice(&body).expect("Failed to parse response.");

	(status, json)
}

#[tokio::test]
async fn event_ingest_reports_handling() {
	let app = super::test_app(StubGraph::default());
	let router = routes::admin_router(app.state);
	let (status, handled) = post_json(
		router.clone(),
		"/v1/admin/events",
		json!({ "eventType": "newRecord", "payload": { "recordId": "r1", "orgId": "acme" } }),
	)
	.await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(handled, json!({ "handled": true }));

	let (_, skipped) = post_json(
		router,
		"/v1/admin/events",
		json!({ "eventType": "newRecord", "payload": { "orgId": "acme" } }),
	)
	.await;

	assert_eq!(skipped, json!({ "handled": false }));
}

#[tokio::test]
async fn record_sync_runs_detached() {
	let app = super::test_app(StubGraph::default());
	let index = app.index.clone();
	let (status, body) = post_json(
		routes::admin_router(app.state),
		"/v1/admin/permissions/records",
		json!({ "record_ids": ["r1", " ", "r2"], "tenant_id": "acme", "concurrency_limit": 2 }),
	)
	.await;

	assert_eq!(status, StatusCode::ACCEPTED);
	assert_eq!(body, json!({ "accepted": 2 }));
	assert!(super::eventually(|| index.count() == 2).await);

	let mut content_ids = index.content_ids.lock().expect("Spy lock must not be poisoned.").clone();

	content_ids.sort();

	assert_eq!(content_ids, vec!["vr-r1".to_string(), "vr-r2".to_string()]);
}

#[tokio::test]
async fn record_sync_validates_request() {
	let app = super::test_app(StubGraph::default());
	let router = routes::admin_router(app.state);
	let (status, body) = post_json(
		router.clone(),
		"/v1/admin/permissions/records",
		json!({ "record_ids": [], "tenant_id": "acme" }),
	)
	.await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(body["error_code"], "INVALID_REQUEST");
	assert_eq!(body["fields"][0], "$.record_ids");

	let (status, body) = post_json(
		router,
		"/v1/admin/permissions/records",
		json!({ "record_ids": ["r1"], "tenant_id": "acme", "concurrency_limit": 0 }),
	)
	.await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(body["fields"][0], "$.concurrency_limit");
}

#[tokio::test]
async fn group_sync_resyncs_affected_records() {
	let graph = StubGraph {
		group_records: HashMap::from([(
			"eng".to_string(),
			vec!["r1".to_string(), "r2".to_string(), "r3".to_string()],
		)]),
	};
	let app = super::test_app(graph);
	let index = app.index.clone();
	let router = routes::admin_router(app.state);
	let (status, _) = post_json(
		router.clone(),
		"/v1/admin/permissions/groups",
		json!({ "group_id": "eng", "tenant_id": "acme" }),
	)
	.await;

	assert_eq!(status, StatusCode::ACCEPTED);
	assert!(super::eventually(|| index.count() == 3).await);

	let (status, body) = post_json(
		router,
		"/v1/admin/permissions/groups",
		json!({ "group_id": "  ", "tenant_id": "acme" }),
	)
	.await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(body["fields"][0], "$.group_id");
}
