//! Composition root wiring every session component from one [`SessionConfig`].
//!
//! A [`Session`] owns exactly one credential store, rate limiter, refresh coordinator,
//! refresh scheduler, and authorized client. Components are handed out by reference;
//! clones of the session share all of them.

// std
use std::path::Path;
// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::{GrantError, Secret, SessionStatus, TokenGrant},
	client::{ApiCall, AuthorizedClient},
	config::SessionConfig,
	csrf::{CsrfSource, NoCsrf},
	http::{ApiResponse, HttpTransport},
	limit::{RateLimiter, operation},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	refresh::{LoginRedirect, NoopRedirect, RefreshCoordinator},
	scheduler::RefreshScheduler,
	store::{CredentialStore, FileStorage, SessionStorage},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

#[cfg(feature = "reqwest")]
/// Session specialized for the crate's default reqwest transport.
pub type ReqwestSession = Session<ReqwestTransport>;

/// Sign-in payload for `POST /auth/login`.
#[derive(Clone, Debug, Serialize)]
pub struct LoginRequest {
	/// Account e-mail.
	pub email: String,
	/// Account password.
	pub password: Secret,
}
impl LoginRequest {
	/// Creates a sign-in payload.
	pub fn new(email: impl Into<String>, password: impl Into<Secret>) -> Self {
		Self { email: email.into(), password: password.into() }
	}
}

/// Builder for [`Session`].
pub struct SessionBuilder<T>
where
	T: HttpTransport,
{
	config: SessionConfig,
	transport: Arc<T>,
	storage: Option<Arc<dyn SessionStorage>>,
	redirect: Arc<dyn LoginRedirect>,
	csrf: Arc<dyn CsrfSource>,
}
impl<T> SessionBuilder<T>
where
	T: HttpTransport,
{
	/// Starts a builder around a caller-provided transport.
	///
	/// Without a storage medium the session keeps nothing between calls; see
	/// [`CredentialStore::detached`].
	pub fn new(config: SessionConfig, transport: impl Into<Arc<T>>) -> Self {
		Self {
			config,
			transport: transport.into(),
			storage: None,
			redirect: Arc::new(NoopRedirect),
			csrf: Arc::new(NoCsrf),
		}
	}

	/// Persists credentials through `storage`.
	pub fn storage(mut self, storage: Arc<dyn SessionStorage>) -> Self {
		self.storage = Some(storage);

		self
	}

	/// Persists credentials in a JSON file, loading it eagerly.
	pub fn file_storage(self, path: impl AsRef<Path>) -> Result<Self> {
		let storage = FileStorage::open(path.as_ref())?;

		Ok(self.storage(Arc::new(storage)))
	}

	/// Installs the re-authentication hook.
	pub fn redirect(mut self, redirect: Arc<dyn LoginRedirect>) -> Self {
		self.redirect = redirect;

		self
	}

	/// Installs the CSRF token source.
	pub fn csrf(mut self, csrf: Arc<dyn CsrfSource>) -> Self {
		self.csrf = csrf;

		self
	}

	/// Wires the session. The scheduler stays stopped until [`Session::resume`] or a
	/// sign-in.
	pub fn build(self) -> Result<Session<T>> {
		let Self { config, transport, storage, redirect, csrf } = self;
		let keys = config.storage_keys.clone();
		let store = match storage {
			Some(storage) => CredentialStore::new(storage, keys),
			None => CredentialStore::detached(keys),
		};
		let refresher = RefreshCoordinator::new(transport.clone(), store.clone(), redirect, &config)?;
		let scheduler = RefreshScheduler::new(refresher.clone(), config.check_interval);
		let config = Arc::new(config);
		let limiter = RateLimiter::default();
		let client =
			AuthorizedClient::new(transport, config.clone(), limiter.clone(), refresher.clone(), csrf);

		Ok(Session { config, store, limiter, refresher, scheduler, client })
	}
}
#[cfg(feature = "reqwest")]
impl SessionBuilder<ReqwestTransport> {
	/// Starts a builder with a reqwest transport honoring `config.request_timeout`.
	pub fn with_reqwest(config: SessionConfig) -> Result<Self> {
		let transport = ReqwestTransport::build(config.request_timeout)?;

		Ok(Self::new(config, transport))
	}
}
impl<T> Debug for SessionBuilder<T>
where
	T: HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionBuilder")
			.field("config", &self.config)
			.field("persistent", &self.storage.is_some())
			.finish()
	}
}

/// Authenticated API session.
pub struct Session<T>
where
	T: HttpTransport,
{
	config: Arc<SessionConfig>,
	store: CredentialStore,
	limiter: RateLimiter,
	refresher: RefreshCoordinator<T>,
	scheduler: RefreshScheduler<T>,
	client: AuthorizedClient<T>,
}
impl<T> Session<T>
where
	T: HttpTransport,
{
	/// Starts a [`SessionBuilder`].
	pub fn builder(config: SessionConfig, transport: impl Into<Arc<T>>) -> SessionBuilder<T> {
		SessionBuilder::new(config, transport)
	}

	/// Configuration the session was built from.
	pub fn config(&self) -> &SessionConfig {
		&self.config
	}

	/// Credential store.
	pub fn store(&self) -> &CredentialStore {
		&self.store
	}

	/// Rate limiter shared with the authorized client.
	pub fn limiter(&self) -> &RateLimiter {
		&self.limiter
	}

	/// Refresh coordinator.
	pub fn refresher(&self) -> &RefreshCoordinator<T> {
		&self.refresher
	}

	/// Background refresh scheduler.
	pub fn scheduler(&self) -> &RefreshScheduler<T> {
		&self.scheduler
	}

	/// Authorized client.
	pub fn client(&self) -> &AuthorizedClient<T> {
		&self.client
	}

	/// Returns `true` iff an access token is stored.
	pub fn is_authenticated(&self) -> bool {
		self.store.is_authenticated()
	}

	/// Lifecycle status of the stored session.
	pub fn status(&self) -> SessionStatus {
		self.store.snapshot().status_at(OffsetDateTime::now_utc(), self.config.refresh_buffer)
	}

	/// Cached profile of the signed-in user.
	pub fn current_user(&self) -> Option<Value> {
		self.store.user_data()
	}

	/// Restarts background refreshes for a session persisted by an earlier run.
	///
	/// Returns `true` when a stored access token was found.
	pub fn resume(&self) -> bool {
		if !self.store.is_authenticated() {
			return false;
		}

		self.scheduler.start();

		true
	}

	/// Signs in, stores the issued tokens and profile, and starts background refreshes.
	///
	/// Returns the user profile attached to the response, if any.
	pub async fn login(&self, request: &LoginRequest) -> Result<Option<Value>> {
		const KIND: FlowKind = FlowKind::Login;

		let span = FlowSpan::new(KIND, "login");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.exchange_login(request)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Signs out.
	///
	/// The `POST /auth/logout` call is best effort: its failures are logged and the local
	/// session is always cleared, the attempt counter reset, and the scheduler stopped.
	pub async fn logout(&self) {
		const KIND: FlowKind = FlowKind::Logout;

		let span = FlowSpan::new(KIND, "logout");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		if self.store.is_authenticated() {
			let call = ApiCall::post("auth/logout").without_refresh();

			match span.instrument(self.client.send(call)).await.and_then(ApiResponse::error_for_status)
			{
				Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
				Err(e) => {
					obs::record_flow_outcome(KIND, FlowOutcome::Failure);
					obs::record_suppressed_error(KIND, "logout", &e);
				},
			}
		}

		self.store.clear_tokens();
		self.refresher.reset_attempts();
		self.scheduler.stop();
	}

	/// Sends an API call through the authorized client.
	pub async fn request(&self, call: ApiCall) -> Result<ApiResponse> {
		self.client.send(call).await
	}

	async fn exchange_login(&self, request: &LoginRequest) -> Result<Option<Value>> {
		let call = ApiCall::post("auth/login")
			.json(request)?
			.with_rate_limit(operation::LOGIN)
			.anonymous()
			.without_refresh();
		let response = self.client.send(call).await?;

		if matches!(response.status.as_u16(), 400 | 401) {
			return Err(Error::InvalidCredentials { reason: response.error_message() });
		}

		let response = response.error_for_status()?;
		let status = response.status.as_u16();
		let grant = TokenGrant::from_slice(&response.body).map_err(|e| match e {
			GrantError::Malformed(source) => Error::Decode { source, status: Some(status) },
			GrantError::MissingAccessToken =>
				Error::Api { status, message: GrantError::MissingAccessToken.to_string() },
		})?;

		self.store.set_tokens(&grant.access_token, grant.refresh_token.as_ref(), grant.expires_in);

		if let Some(user) = &grant.user {
			self.store.set_user_data(user);
		}

		self.refresher.reset_attempts();
		self.scheduler.start();

		Ok(grant.user)
	}
}
impl<T> Clone for Session<T>
where
	T: HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			config: Arc::clone(&self.config),
			store: self.store.clone(),
			limiter: self.limiter.clone(),
			refresher: self.refresher.clone(),
			scheduler: self.scheduler.clone(),
			client: self.client.clone(),
		}
	}
}
impl<T> Debug for Session<T>
where
	T: HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Session")
			.field("api_base", &self.config.api_base.as_str())
			.field("store", &self.store)
			.field("refresher", &self.refresher)
			.field("scheduler", &self.scheduler)
			.finish()
	}
}
