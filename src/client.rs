//! Authorized request wrapper every API call goes through.
//!
//! [`AuthorizedClient::send`] gates the call through the rate limiter, attaches the bearer
//! token and (for state-changing verbs) the CSRF token, and recovers from a stale access
//! token by refreshing once and replaying the call.

// crates.io
use ::http::{
	HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
	header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::Secret,
	config::SessionConfig,
	csrf::CsrfSource,
	error::{ConfigError, TransportError},
	http::{ApiResponse, HttpRequest, HttpTransport},
	limit::{RateLimitDecision, RateLimiter},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	refresh::RefreshCoordinator,
	store::CredentialStore,
};

const KIND: FlowKind = FlowKind::Request;
const CSRF_HEADERS: [&str; 2] = ["x-csrf-token", "x-xsrf-token"];

/// One API call described independently of the transport.
#[derive(Clone, Debug)]
pub struct ApiCall {
	/// HTTP method.
	pub method: Method,
	/// Path relative to the API base, query string included.
	pub path: String,
	/// Extra headers sent as-is.
	pub headers: HeaderMap,
	/// Request body.
	pub body: Vec<u8>,
	/// Rate-limit operation key the call is counted under.
	pub rate_limit: Option<String>,
	/// Skips the bearer token (sign-in, registration).
	pub anonymous: bool,
	/// Refreshes and replays once when the API answers 401.
	pub retry_unauthorized: bool,
}
impl ApiCall {
	/// Creates a call with no body.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self {
			method,
			path: path.into(),
			headers: HeaderMap::new(),
			body: Vec::new(),
			rate_limit: None,
			anonymous: false,
			retry_unauthorized: true,
		}
	}

	/// `GET` call.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::GET, path)
	}

	/// `POST` call.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::POST, path)
	}

	/// `PUT` call.
	pub fn put(path: impl Into<String>) -> Self {
		Self::new(Method::PUT, path)
	}

	/// `PATCH` call.
	pub fn patch(path: impl Into<String>) -> Self {
		Self::new(Method::PATCH, path)
	}

	/// `DELETE` call.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::DELETE, path)
	}

	/// Serializes `body` as the JSON payload.
	pub fn json<B>(mut self, body: &B) -> Result<Self>
	where
		B: ?Sized + Serialize,
	{
		self.body = serde_json::to_vec(body).map_err(ConfigError::Serialize)?;
		self.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

		Ok(self)
	}

	/// Sends a raw body with the given content type (multipart uploads, binary payloads).
	pub fn with_body(mut self, content_type: HeaderValue, body: Vec<u8>) -> Self {
		self.body = body;
		self.headers.insert(CONTENT_TYPE, content_type);

		self
	}

	/// Adds a header.
	pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.headers.insert(name, value);

		self
	}

	/// Counts the call under a rate-limit operation key.
	pub fn with_rate_limit(mut self, operation: impl Into<String>) -> Self {
		self.rate_limit = Some(operation.into());

		self
	}

	/// Sends the call without the bearer token.
	pub fn anonymous(mut self) -> Self {
		self.anonymous = true;

		self
	}

	/// Returns 401 responses untouched instead of refreshing.
	pub fn without_refresh(mut self) -> Self {
		self.retry_unauthorized = false;

		self
	}

	/// Returns `true` for verbs that must echo the CSRF token.
	pub fn is_state_changing(&self) -> bool {
		matches!(self.method, Method::POST | Method::PUT | Method::DELETE | Method::PATCH)
	}
}

/// Sends [`ApiCall`]s with credentials attached. Clones share every component.
pub struct AuthorizedClient<T>
where
	T: HttpTransport,
{
	transport: Arc<T>,
	config: Arc<SessionConfig>,
	store: CredentialStore,
	limiter: RateLimiter,
	refresher: RefreshCoordinator<T>,
	csrf: Arc<dyn CsrfSource>,
}
impl<T> AuthorizedClient<T>
where
	T: HttpTransport,
{
	/// Wires a client from already-built session components.
	pub fn new(
		transport: Arc<T>,
		config: Arc<SessionConfig>,
		limiter: RateLimiter,
		refresher: RefreshCoordinator<T>,
		csrf: Arc<dyn CsrfSource>,
	) -> Self {
		let store = refresher.store().clone();

		Self { transport, config, store, limiter, refresher, csrf }
	}

	/// Sends `call`, refreshing and replaying once if the access token is stale.
	///
	/// Non-success statuses other than the recovered 401 are returned as responses; use
	/// [`ApiResponse::error_for_status`] to turn them into errors.
	pub async fn send(&self, call: ApiCall) -> Result<ApiResponse> {
		let span = FlowSpan::new(KIND, "send");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.send_guarded(call)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Sends `call`, rejects non-success statuses, and decodes the JSON body.
	pub async fn send_json<R>(&self, call: ApiCall) -> Result<R>
	where
		R: DeserializeOwned,
	{
		self.send(call).await?.error_for_status()?.json()
	}

	/// Rate limiter the client gates calls through.
	pub fn limiter(&self) -> &RateLimiter {
		&self.limiter
	}

	async fn send_guarded(&self, call: ApiCall) -> Result<ApiResponse> {
		self.check_rate_limit(&call)?;

		let url = self.config.endpoint(&call.path)?;
		let token = if call.anonymous { None } else { self.store.access_token() };
		let response = self.dispatch(&call, &url, token.as_ref()).await?;

		if response.status != StatusCode::UNAUTHORIZED || token.is_none() || !call.retry_unauthorized
		{
			return Ok(response);
		}

		obs::record_transition(KIND, "unauthorized", "access token rejected, refreshing");

		if !self.refresher.refresh_token().await {
			return Err(Error::SessionExpired);
		}

		let token = self.store.access_token();

		self.dispatch(&call, &url, token.as_ref()).await
	}

	fn check_rate_limit(&self, call: &ApiCall) -> Result<()> {
		let Some(operation) = call.rate_limit.as_deref() else { return Ok(()) };
		let policy = self.config.rate_limits.require(operation)?;

		match self.limiter.evaluate(operation, policy) {
			RateLimitDecision::Allow => Ok(()),
			RateLimitDecision::Delay(directive) => {
				obs::record_rate_limited(operation);

				Err(Error::RateLimited {
					operation: operation.to_owned(),
					wait: directive.wait,
					message: directive.reason,
				})
			},
		}
	}

	async fn dispatch(
		&self,
		call: &ApiCall,
		url: &Url,
		token: Option<&Secret>,
	) -> Result<ApiResponse> {
		let request = self.build_request(call, url, token)?;
		let response = self.transport.execute(request).await.map_err(TransportError::network)?;

		Ok(ApiResponse::from_http(response))
	}

	fn build_request(
		&self,
		call: &ApiCall,
		url: &Url,
		token: Option<&Secret>,
	) -> Result<HttpRequest, ConfigError> {
		let mut builder = ::http::Request::builder()
			.method(call.method.clone())
			.uri(url.as_str())
			.header(ACCEPT, "application/json");

		for (name, value) in &call.headers {
			builder = builder.header(name, value);
		}

		if let Some(token) = token {
			builder = builder.header(AUTHORIZATION, format!("Bearer {}", token.expose()));
		}
		if call.is_state_changing() {
			if let Some(csrf) = self.csrf.csrf_token() {
				for name in CSRF_HEADERS {
					builder = builder.header(name, csrf.as_str());
				}
			}
		}

		Ok(builder.body(call.body.clone())?)
	}
}
impl<T> Clone for AuthorizedClient<T>
where
	T: HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			transport: Arc::clone(&self.transport),
			config: Arc::clone(&self.config),
			store: self.store.clone(),
			limiter: self.limiter.clone(),
			refresher: self.refresher.clone(),
			csrf: Arc::clone(&self.csrf),
		}
	}
}
impl<T> Debug for AuthorizedClient<T>
where
	T: HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorizedClient")
			.field("api_base", &self.config.api_base.as_str())
			.field("store", &self.store)
			.field("refresher", &self.refresher)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;
	use crate::{
		csrf::{DocumentCsrf, NoCsrf},
		limit::RateLimitPolicy,
		store::{MemoryStorage, StorageKeys},
		testing::{CountingRedirect, Reply, ScriptedTransport},
	};

	struct Fixture {
		client: AuthorizedClient<ScriptedTransport>,
		transport: Arc<ScriptedTransport>,
		store: CredentialStore,
		redirect: Arc<CountingRedirect>,
	}

	fn fixture(replies: Vec<Reply>, csrf: Arc<dyn CsrfSource>) -> Fixture {
		let config = SessionConfig::builder(
			Url::parse("https://gallery.example.com/api").expect("Fixture base URL should parse."),
		)
		.rate_limits(
			crate::limit::RateLimitTable::empty()
				.with_policy("upload", RateLimitPolicy::new(1, 60_000)),
		)
		.build()
		.expect("Fixture configuration should validate.");
		let transport = ScriptedTransport::new(replies);
		let store = CredentialStore::new(Arc::new(MemoryStorage::default()), StorageKeys::default());
		let redirect = Arc::new(CountingRedirect::default());
		let refresher =
			RefreshCoordinator::new(transport.clone(), store.clone(), redirect.clone(), &config)
				.expect("Coordinator should build from a valid configuration.");
		let client = AuthorizedClient::new(
			transport.clone(),
			Arc::new(config),
			RateLimiter::default(),
			refresher,
			csrf,
		);

		Fixture { client, transport, store, redirect }
	}

	fn sign_in(store: &CredentialStore, access: &str) {
		store.set_tokens(&Secret::new(access), Some(&Secret::new("R")), Some(Duration::hours(1)));
	}

	#[tokio::test]
	async fn bearer_token_attached_when_signed_in() {
		let fx = fixture(
			vec![Reply::json(200, json!({ "items": [] })), Reply::json(200, json!({}))],
			Arc::new(NoCsrf),
		);

		sign_in(&fx.store, "A");

		let response = fx.client.send(ApiCall::get("images?page=2")).await.expect("Call should succeed.");

		assert!(response.is_success());

		fx.client.send(ApiCall::get("health").anonymous()).await.expect("Call should succeed.");

		let requests = fx.transport.requests();

		assert_eq!(requests[0].uri, "https://gallery.example.com/api/images?page=2");
		assert_eq!(requests[0].header("authorization"), Some("Bearer A"));
		assert_eq!(requests[1].header("authorization"), None);
	}

	#[tokio::test]
	async fn csrf_headers_only_on_state_changing_verbs() {
		let csrf = Arc::new(DocumentCsrf::default());

		csrf.set_cookie_header(Some("XSRF-TOKEN=tok%2B1".into()));

		let fx = fixture(
			vec![
				Reply::json(200, json!({})),
				Reply::json(201, json!({})),
				Reply::json(204, json!({})),
			],
			csrf,
		);

		fx.client.send(ApiCall::get("images")).await.expect("GET should succeed.");
		fx.client
			.send(ApiCall::post("images").json(&json!({ "title": "cat" })).expect("Body should serialize."))
			.await
			.expect("POST should succeed.");
		fx.client.send(ApiCall::delete("images/7")).await.expect("DELETE should succeed.");

		let requests = fx.transport.requests();

		assert_eq!(requests[0].header("x-csrf-token"), None);
		assert_eq!(requests[0].header("x-xsrf-token"), None);
		assert_eq!(requests[1].header("x-csrf-token"), Some("tok+1"));
		assert_eq!(requests[1].header("x-xsrf-token"), Some("tok+1"));
		assert_eq!(requests[1].header("content-type"), Some("application/json"));
		assert_eq!(requests[1].json(), json!({ "title": "cat" }));
		assert_eq!(requests[2].header("x-csrf-token"), Some("tok+1"));
	}

	#[tokio::test]
	async fn rate_limited_call_never_reaches_transport() {
		let fx = fixture(vec![Reply::json(201, json!({}))], Arc::new(NoCsrf));
		let call = || ApiCall::post("images").with_rate_limit("upload");

		fx.client.send(call()).await.expect("First upload should pass.");

		let err = fx.client.send(call()).await.expect_err("Second upload should be limited.");

		match err {
			Error::RateLimited { operation, wait, message } => {
				assert_eq!(operation, "upload");
				assert!(wait > Duration::seconds(59) && wait <= Duration::seconds(60));
				assert_eq!(message, "Too many attempts. Please wait 60 seconds before trying again.");
			},
			other => panic!("Expected a rate-limit error, got {other:?}."),
		}

		assert_eq!(fx.transport.calls(), 1);
	}

	#[tokio::test]
	async fn unknown_rate_limit_key_is_a_config_error() {
		let fx = fixture(Vec::new(), Arc::new(NoCsrf));
		let err = fx
			.client
			.send(ApiCall::post("captions").with_rate_limit("regenerate_caption"))
			.await
			.expect_err("Missing policy should fail.");

		assert!(matches!(err, Error::Config(ConfigError::UnknownRateLimit { .. })));
		assert_eq!(fx.transport.calls(), 0);
	}

	#[tokio::test]
	async fn stale_token_is_refreshed_and_call_replayed_once() {
		let fx = fixture(
			vec![
				Reply::json(401, json!({ "message": "Token expired" })),
				Reply::json(200, json!({ "access_token": "fresh", "expires_in": 3600 })),
				Reply::json(200, json!({ "id": 7 })),
			],
			Arc::new(NoCsrf),
		);

		sign_in(&fx.store, "stale");

		let body: serde_json::Value = fx
			.client
			.send_json(ApiCall::get("images/7"))
			.await
			.expect("Replayed call should succeed.");

		assert_eq!(body, json!({ "id": 7 }));

		let requests = fx.transport.requests();

		assert_eq!(requests.len(), 3);
		assert_eq!(requests[0].header("authorization"), Some("Bearer stale"));
		assert!(requests[1].uri.ends_with("/auth/refresh"));
		assert_eq!(requests[2].header("authorization"), Some("Bearer fresh"));
	}

	#[tokio::test]
	async fn failed_refresh_surfaces_session_expired() {
		let fx = fixture(
			vec![Reply::json(401, json!({})), Reply::json(401, json!({ "error": "revoked" }))],
			Arc::new(NoCsrf),
		);

		sign_in(&fx.store, "stale");

		let err = fx.client.send(ApiCall::get("images")).await.expect_err("Call should fail.");

		assert!(matches!(err, Error::SessionExpired));
		assert!(!fx.store.is_authenticated());
		assert_eq!(fx.redirect.redirects(), 1);
		assert_eq!(fx.transport.calls(), 2);
	}

	#[tokio::test]
	async fn unauthenticated_401_is_returned_untouched() {
		let fx = fixture(
			vec![Reply::json(401, json!({ "message": "Bad password" })), Reply::json(401, json!({}))],
			Arc::new(NoCsrf),
		);
		let response =
			fx.client.send(ApiCall::post("auth/login")).await.expect("401 should be a response.");

		assert_eq!(response.status, StatusCode::UNAUTHORIZED);
		assert_eq!(response.error_message(), "Bad password");

		sign_in(&fx.store, "A");

		let response = fx
			.client
			.send(ApiCall::get("images").without_refresh())
			.await
			.expect("401 should be a response.");

		assert_eq!(response.status, StatusCode::UNAUTHORIZED);
		assert_eq!(fx.transport.calls(), 2);
	}

	#[tokio::test]
	async fn transport_failures_become_transport_errors() {
		let fx = fixture(vec![Reply::Fail("dns failure")], Arc::new(NoCsrf));
		let err = fx.client.send(ApiCall::get("images")).await.expect_err("Call should fail.");

		assert!(matches!(err, Error::Transport(TransportError::Network { .. })));
	}
}
