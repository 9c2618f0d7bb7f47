use axum::{
	body::Body,
	http::{Request, StatusCode},
};
use tower::util::ServiceExt;

use beacon_api::{routes, state::AppState};

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set BEACON_PG_DSN and BEACON_QDRANT_URL to run."]
async fn app_state_bootstraps_against_live_storage() {
	let Some(base_dsn) = beacon_testkit::env_dsn() else {
		eprintln!("Skipping live storage test; set BEACON_PG_DSN to run this test.");

		return;
	};
	let Some(qdrant_url) = beacon_testkit::env_qdrant_url() else {
		eprintln!("Skipping live storage test; set BEACON_QDRANT_URL to run this test.");

		return;
	};
	let test_db = beacon_testkit::TestDatabase::new(&base_dsn)
		.await
		.expect("Failed to create test database.");
	let collection = test_db.collection_name("beacon_api");
	let config = super::test_config(test_db.dsn().to_string(), qdrant_url, collection);
	let state = AppState::new(config).await.expect("Failed to initialize app state.");
	let app = routes::router(state.clone());
	let _ = routes::admin_router(state);
	let request =
		Request::builder().uri("/health").body(Body::empty()).expect("Failed to build request.");
	let response = app.oneshot(request).await.expect("Failed to call /health.");

	assert_eq!(response.status(), StatusCode::OK);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
