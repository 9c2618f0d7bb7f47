use axum::{
	body::{self, Body},
	http::{Request, StatusCode},
};
use serde_json::{Value, json};
use tower::util::ServiceExt;

use beacon_api::routes;

use super::StubGraph;

#[tokio::test]
async fn health_ok() {
	let app = routes::router(super::test_app(StubGraph::default()).state);
	let request =
		Request::builder().uri("/health").body(Body::empty()).expect("Failed to build request.");
	let response = app.oneshot(request).await.expect("Failed to call /health.");

	assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn stats_reports_empty_registry() {
	let app = routes::router(super::test_app(StubGraph::default()).state);
	let response = app
		.oneshot(
			Request::builder()
				.uri("/v1/notifications/stats")
				.body(Body::empty())
				.expect("Failed to build request."),
		)
		.await
		.expect("Failed to call stats.");

	assert_eq!(response.status(), StatusCode::OK);

	let body = body::to_bytes(response.into_body(), usize::MAX)
		.await
		.expect("Failed to read response body.");
	let json: Value = serde_json::from_slice(&body).expect("Failed to parse response.");

	assert_eq!(json, json!({ "total_connections": 0, "unique_users": 0, "unique_orgs": 0 }));
}

#[tokio::test]
async fn admin_routes_are_not_public() {
	let app = routes::router(super::test_app(StubGraph::default()).state);
	let response = app
		.oneshot(
			Request::builder()
				.method("POST")
				.uri("/v1/admin/events")
				.header("content-type", "application/json")
				.body(Body::from(r#"{"eventType":"newRecord","payload":{}}"#))
				.expect("Failed to build request."),
		)
		.await
		.expect("Failed to call admin route.");

	assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
