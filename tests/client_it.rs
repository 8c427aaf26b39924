#![cfg(feature = "reqwest")]

mod common;

// std
use std::sync::Arc;
// crates.io
use httpmock::prelude::*;
use serde_json::json;
use time::Duration;
// self
use session_guard::{
	client::ApiCall,
	config::SessionConfig,
	csrf::DocumentCsrf,
	error::Error,
	http::ReqwestTransport,
	limit::{RateLimitPolicy, RateLimitTable},
	session::Session,
	store::MemoryStorage,
};

#[tokio::test]
async fn authorized_post_carries_bearer_and_csrf_headers() {
	let server = MockServer::start_async().await;
	let config = common::config_builder(&server).build().expect("Configuration should validate.");
	let csrf = Arc::new(DocumentCsrf::default());

	csrf.set_meta_token(Some("meta-token".into()));

	let session = Session::<ReqwestTransport>::builder(
		config,
		ReqwestTransport::build(None).expect("Reqwest transport should build."),
	)
	.storage(Arc::new(MemoryStorage::default()))
	.csrf(csrf)
	.build()
	.expect("Session should build.");
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/images/7/caption")
				.header("authorization", "Bearer access-1")
				.header("x-csrf-token", "meta-token")
				.header("x-xsrf-token", "meta-token")
				.json_body(json!({ "style": "short" }));
			then.status(202).json_body(json!({ "job": "c-1" }));
		})
		.await;

	session.store().set_tokens(&"access-1".into(), None, None);

	let response = session
		.request(
			ApiCall::post("/images/7/caption")
				.json(&json!({ "style": "short" }))
				.expect("Body should serialize."),
		)
		.await
		.expect("Call should succeed.");

	mock.assert_async().await;

	assert_eq!(response.status.as_u16(), 202);
	assert_eq!(
		response.json::<serde_json::Value>().expect("Body should decode."),
		json!({ "job": "c-1" })
	);
}

#[tokio::test]
async fn stale_token_is_refreshed_then_replayed() {
	let server = MockServer::start_async().await;
	let (session, _) = common::session(&server);
	let stale = server
		.mock_async(|when, then| {
			when.method(GET).path("/images").header("authorization", "Bearer access-stale");
			then.status(401).json_body(json!({ "message": "Token expired" }));
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(200).json_body(json!({ "access_token": "access-fresh", "expires_in": 900 }));
		})
		.await;
	let fresh = server
		.mock_async(|when, then| {
			when.method(GET).path("/images").header("authorization", "Bearer access-fresh");
			then.status(200).json_body(json!({ "items": [1, 2, 3] }));
		})
		.await;

	common::sign_in(&session, "access-stale", "refresh-1", Duration::hours(1));

	let body: serde_json::Value = session
		.client()
		.send_json(ApiCall::get("images"))
		.await
		.expect("Replayed call should succeed.");

	stale.assert_calls_async(1).await;
	refresh.assert_calls_async(1).await;
	fresh.assert_calls_async(1).await;

	assert_eq!(body, json!({ "items": [1, 2, 3] }));
}

#[tokio::test]
async fn unrecoverable_401_surfaces_session_expired() {
	let server = MockServer::start_async().await;
	let (session, medium) = common::session(&server);
	let _images = server
		.mock_async(|when, then| {
			when.method(GET).path("/images");
			then.status(401);
		})
		.await;
	let _refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(401).json_body(json!({ "error": "refresh token revoked" }));
		})
		.await;

	common::sign_in(&session, "access-stale", "refresh-1", Duration::hours(1));

	let err = session.request(ApiCall::get("images")).await.expect_err("Call should fail.");

	assert!(matches!(err, Error::SessionExpired));
	assert!(medium.is_empty());
}

#[tokio::test]
async fn rate_limited_upload_fails_without_network() {
	let server = MockServer::start_async().await;
	let config = common::config_builder(&server)
		.rate_limits(RateLimitTable::empty().with_policy("upload", RateLimitPolicy::new(2, 60_000)))
		.build()
		.expect("Configuration should validate.");
	let (session, _) = common::session_with(config);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/images");
			then.status(201);
		})
		.await;
	let upload = || ApiCall::post("images").with_rate_limit("upload");

	for _ in 0..2 {
		session.request(upload()).await.expect("Upload inside the budget should pass.");
	}

	let err = session.request(upload()).await.expect_err("Third upload should be limited.");

	mock.assert_calls_async(2).await;

	let Error::RateLimited { operation, message, .. } = err else {
		panic!("Expected a rate-limit error, got {err:?}.");
	};

	assert_eq!(operation, "upload");
	assert_eq!(message, "Too many attempts. Please wait 60 seconds before trying again.");

	session.limiter().reset("upload");
	session.request(upload()).await.expect("Reset key should admit calls again.");
}

#[tokio::test]
async fn api_errors_are_returned_for_the_caller_to_inspect() {
	let server = MockServer::start_async().await;
	let config = SessionConfig::from_json(&format!(r#"{{ "api_base": "{}" }}"#, server.base_url()))
		.expect("JSON configuration should load.");
	let (session, _) = common::session_with(config);
	let _mock = server
		.mock_async(|when, then| {
			when.method(DELETE).path("/images/9");
			then.status(404).json_body(json!({ "detail": "Image not found" }));
		})
		.await;
	let response =
		session.request(ApiCall::delete("images/9")).await.expect("404 should be a response.");

	assert_eq!(response.status.as_u16(), 404);

	let err = response.error_for_status().expect_err("404 should convert into an error.");

	assert!(matches!(err, Error::Api { status: 404, ref message } if message == "Image not found"));
}
