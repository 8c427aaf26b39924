//! Fixtures shared by the reqwest-backed integration tests.

#![allow(dead_code)]

// std
use std::sync::Arc;
// crates.io
use httpmock::MockServer;
use time::Duration;
// self
use session_guard::{
	auth::Secret,
	config::{SessionConfig, SessionConfigBuilder},
	http::ReqwestTransport,
	session::{ReqwestSession, Session},
	store::{MemoryStorage, SessionStorage},
	url::Url,
};

/// Configuration builder pointed at the mock server.
pub fn config_builder(server: &MockServer) -> SessionConfigBuilder {
	SessionConfig::builder(Url::parse(&server.base_url()).expect("Mock server URL should parse."))
}

/// Session over an in-memory medium with default settings.
pub fn session(server: &MockServer) -> (ReqwestSession, MemoryStorage) {
	let config = config_builder(server).build().expect("Fixture configuration should validate.");

	session_with(config)
}

/// Session over an in-memory medium with custom settings.
pub fn session_with(config: SessionConfig) -> (ReqwestSession, MemoryStorage) {
	let medium = MemoryStorage::default();
	let storage: Arc<dyn SessionStorage> = Arc::new(medium.clone());
	let transport = ReqwestTransport::build(Some(Duration::seconds(5)))
		.expect("Reqwest transport should build.");
	let session = Session::<ReqwestTransport>::builder(config, transport)
		.storage(storage)
		.build()
		.expect("Session should build.");

	(session, medium)
}

/// Seeds credentials as if a sign-in had happened earlier.
pub fn sign_in(session: &ReqwestSession, access: &str, refresh: &str, expires_in: Duration) {
	session.store().set_tokens(&Secret::new(access), Some(&Secret::new(refresh)), Some(expires_in));
}

/// Access token currently stored.
pub fn access_token(session: &ReqwestSession) -> Option<String> {
	session.store().access_token().map(|token| token.expose().to_owned())
}
