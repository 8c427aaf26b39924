//! Single-flight access-token refresh with a bounded attempt ceiling.
//!
//! [`RefreshCoordinator::refresh`] starts at most one `POST /auth/refresh` at a time. The
//! exchange runs on its own Tokio task and every concurrent caller awaits the same
//! [`Shared`] outcome, so a caller dropping its future never strands the others. Failed
//! attempts accumulate until the ceiling is reached; after that the coordinator drops the
//! session without contacting the API until a sign-in or sign-out resets the counter.

mod metrics;
mod redirect;

pub use metrics::RefreshMetrics;
pub use redirect::{LoginRedirect, NoopRedirect};

// std
use std::sync::Weak;
// crates.io
use ::http::{
	Method,
	header::{ACCEPT, CONTENT_TYPE},
};
use futures::future::{BoxFuture, FutureExt, Shared};
// self
use crate::{
	_prelude::*,
	auth::{GrantError, Secret, TokenGrant},
	config::SessionConfig,
	error::ConfigError,
	http::{HttpRequest, HttpTransport},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::CredentialStore,
};

const KIND: FlowKind = FlowKind::Refresh;

type PendingRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

/// Result of one refresh request as observed by every caller sharing it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
	/// A new access token was stored.
	Refreshed,
	/// The refresh failed; the credential side effects have already been applied.
	Failed(RefreshFailure),
}
impl RefreshOutcome {
	/// Returns `true` when a new access token was stored.
	pub fn is_refreshed(self) -> bool {
		matches!(self, Self::Refreshed)
	}
}

/// Classified refresh failures. They are logged and counted, never propagated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ThisError)]
pub enum RefreshFailure {
	/// No refresh token is stored.
	#[error("No refresh token is stored.")]
	NoCredential,
	/// The request could not be sent or no response arrived.
	#[error("Refresh request did not reach the API.")]
	Transport,
	/// The API answered with a non-success status.
	#[error("Refresh was rejected with status {status}.")]
	Rejected {
		/// HTTP status code.
		status: u16,
	},
	/// The success body was not a JSON object of a known shape.
	#[error("Refresh response is malformed.")]
	MalformedResponse,
	/// The success body did not carry an access token.
	#[error("Refresh response does not contain an access token.")]
	MissingAccessToken,
	/// The refresh task ended without producing an outcome.
	#[error("Refresh task was aborted.")]
	Aborted,
	/// The attempt ceiling was already reached; nothing was sent.
	#[error("Refresh attempt ceiling reached.")]
	Exhausted,
}
impl RefreshFailure {
	/// Returns `true` when the failure clears the credentials and raises the login redirect.
	///
	/// A success body without an access token keeps the stored session until the attempt
	/// ceiling is reached; an aborted task leaves the store untouched.
	pub fn ends_session(self) -> bool {
		!matches!(self, Self::MissingAccessToken | Self::Aborted)
	}
}

/// Coordinates token refreshes for one session. Clones share state.
pub struct RefreshCoordinator<T>
where
	T: HttpTransport,
{
	inner: Arc<CoordinatorInner<T>>,
}
impl<T> RefreshCoordinator<T>
where
	T: HttpTransport,
{
	/// Creates a coordinator refreshing through `transport` into `store`.
	pub fn new(
		transport: Arc<T>,
		store: CredentialStore,
		redirect: Arc<dyn LoginRedirect>,
		config: &SessionConfig,
	) -> Result<Self, ConfigError> {
		let endpoint = config.endpoint("auth/refresh")?;

		Ok(Self {
			inner: Arc::new(CoordinatorInner {
				transport,
				store,
				redirect,
				endpoint,
				refresh_buffer: config.refresh_buffer,
				max_attempts: config.max_refresh_attempts,
				state: Mutex::new(AttemptState::default()),
				metrics: RefreshMetrics::default(),
			}),
		})
	}

	/// Refreshes the access token, joining the in-flight refresh when one exists.
	pub async fn refresh(&self) -> RefreshOutcome {
		let pending = {
			let mut state = self.inner.state.lock();

			if let Some(pending) = state.pending.clone() {
				self.inner.metrics.record_joined();

				pending
			} else if state.attempts >= self.inner.max_attempts {
				drop(state);

				return self.inner.short_circuit();
			} else {
				state.attempts += 1;
				state.generation = state.generation.wrapping_add(1);

				let pending = self.inner.start(state.generation);

				state.pending = Some(pending.clone());

				pending
			}
		};

		pending.await
	}

	/// Refreshes the access token and reports whether a new one was stored.
	pub async fn refresh_token(&self) -> bool {
		self.refresh().await.is_refreshed()
	}

	/// Returns `true` iff the expiry is known and falls inside the refresh buffer.
	pub fn should_refresh_token(&self) -> bool {
		self.should_refresh_token_at(OffsetDateTime::now_utc())
	}

	/// Same as [`should_refresh_token`](Self::should_refresh_token) with an explicit clock
	/// reading.
	pub fn should_refresh_token_at(&self, now: OffsetDateTime) -> bool {
		self.inner.store.snapshot().should_refresh_at(now, self.inner.refresh_buffer)
	}

	/// Refreshes when the token is expired or about to expire.
	///
	/// Returns `false` without a network call when unauthenticated, `true` without a call
	/// when the token is still comfortably valid, and the refresh result otherwise.
	pub async fn refresh_if_needed(&self) -> bool {
		self.refresh_if_needed_at(OffsetDateTime::now_utc()).await
	}

	/// Same as [`refresh_if_needed`](Self::refresh_if_needed) with an explicit clock
	/// reading.
	pub async fn refresh_if_needed_at(&self, now: OffsetDateTime) -> bool {
		let credentials = self.inner.store.snapshot();

		if !credentials.is_authenticated() {
			return false;
		}
		if credentials.is_expired_at(now)
			|| credentials.should_refresh_at(now, self.inner.refresh_buffer)
		{
			return self.refresh_token().await;
		}

		true
	}

	/// Clears the failed-attempt counter.
	pub fn reset_attempts(&self) {
		self.inner.state.lock().attempts = 0;
	}

	/// Failed attempts since the last success or reset (the running attempt included).
	pub fn attempts(&self) -> u32 {
		self.inner.state.lock().attempts
	}

	/// Returns `true` while a refresh is in flight.
	pub fn is_refreshing(&self) -> bool {
		self.inner.state.lock().pending.is_some()
	}

	/// Refresh counters.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.inner.metrics
	}

	/// Credential store the coordinator writes to.
	pub fn store(&self) -> &CredentialStore {
		&self.inner.store
	}
}
impl<T> Clone for RefreshCoordinator<T>
where
	T: HttpTransport,
{
	fn clone(&self) -> Self {
		Self { inner: Arc::clone(&self.inner) }
	}
}
impl<T> Debug for RefreshCoordinator<T>
where
	T: HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.inner.state.lock();

		f.debug_struct("RefreshCoordinator")
			.field("endpoint", &self.inner.endpoint.as_str())
			.field("attempts", &state.attempts)
			.field("max_attempts", &self.inner.max_attempts)
			.field("refreshing", &state.pending.is_some())
			.finish()
	}
}

#[derive(Default)]
struct AttemptState {
	attempts: u32,
	generation: u64,
	pending: Option<PendingRefresh>,
}

struct CoordinatorInner<T>
where
	T: HttpTransport,
{
	transport: Arc<T>,
	store: CredentialStore,
	redirect: Arc<dyn LoginRedirect>,
	endpoint: Url,
	refresh_buffer: Duration,
	max_attempts: u32,
	state: Mutex<AttemptState>,
	metrics: RefreshMetrics,
}
impl<T> CoordinatorInner<T>
where
	T: HttpTransport,
{
	/// Spawns the exchange and wraps its handle in a shareable future.
	fn start(self: &Arc<Self>, generation: u64) -> PendingRefresh {
		let task = tokio::spawn(Arc::clone(self).run(generation));
		let weak = Arc::downgrade(self);

		async move {
			match task.await {
				Ok(outcome) => outcome,
				Err(e) => {
					obs::record_suppressed_error(KIND, "join", &e);
					Self::settle_aborted(&weak, generation);

					RefreshOutcome::Failed(RefreshFailure::Aborted)
				},
			}
		}
		.boxed()
		.shared()
	}

	async fn run(self: Arc<Self>, generation: u64) -> RefreshOutcome {
		let span = FlowSpan::new(KIND, "refresh");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.metrics.record_attempt();

		let outcome = span.instrument(self.exchange()).await;

		match outcome {
			RefreshOutcome::Refreshed => {
				self.metrics.record_success();
				obs::record_flow_outcome(KIND, FlowOutcome::Success);
			},
			RefreshOutcome::Failed(failure) => {
				self.metrics.record_failure();
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
				obs::record_suppressed_error(KIND, "refresh", &failure);

				let exhausted = self.state.lock().attempts >= self.max_attempts;

				if failure.ends_session() || exhausted {
					self.end_session();
				}
			},
		}

		let mut state = self.state.lock();

		if state.generation == generation {
			state.pending = None;
		}
		if outcome.is_refreshed() {
			state.attempts = 0;
		}

		outcome
	}

	async fn exchange(&self) -> RefreshOutcome {
		let Some(refresh_token) = self.store.refresh_token() else {
			return RefreshOutcome::Failed(RefreshFailure::NoCredential);
		};
		let request = match self.refresh_request(&refresh_token) {
			Ok(request) => request,
			Err(e) => {
				obs::record_suppressed_error(KIND, "build_request", &e);

				return RefreshOutcome::Failed(RefreshFailure::Transport);
			},
		};
		let response = match self.transport.execute(request).await {
			Ok(response) => response,
			Err(e) => {
				obs::record_suppressed_error(KIND, "execute", &e);

				return RefreshOutcome::Failed(RefreshFailure::Transport);
			},
		};
		let status = response.status();

		if !status.is_success() {
			return RefreshOutcome::Failed(RefreshFailure::Rejected { status: status.as_u16() });
		}

		match TokenGrant::from_slice(response.body()) {
			Ok(grant) => {
				self.store.set_tokens(
					&grant.access_token,
					grant.refresh_token.as_ref(),
					grant.expires_in,
				);

				RefreshOutcome::Refreshed
			},
			Err(GrantError::MissingAccessToken) =>
				RefreshOutcome::Failed(RefreshFailure::MissingAccessToken),
			Err(e) => {
				obs::record_suppressed_error(KIND, "decode", &e);

				RefreshOutcome::Failed(RefreshFailure::MalformedResponse)
			},
		}
	}

	fn refresh_request(&self, refresh_token: &Secret) -> Result<HttpRequest, ConfigError> {
		let body = serde_json::to_vec(&RefreshBody { refresh_token: refresh_token.expose() })
			.map_err(ConfigError::Serialize)?;

		Ok(::http::Request::builder()
			.method(Method::POST)
			.uri(self.endpoint.as_str())
			.header(CONTENT_TYPE, "application/json")
			.header(ACCEPT, "application/json")
			.body(body)?)
	}

	fn short_circuit(&self) -> RefreshOutcome {
		self.metrics.record_short_circuit();
		obs::record_transition(KIND, "short_circuit", "refresh attempt ceiling reached");
		self.end_session();

		RefreshOutcome::Failed(RefreshFailure::Exhausted)
	}

	fn end_session(&self) {
		self.store.clear_tokens();

		if !self.redirect.is_on_login_view() {
			self.redirect.redirect_to_login();
		}
	}

	fn settle_aborted(weak: &Weak<Self>, generation: u64) {
		let Some(inner) = weak.upgrade() else { return };
		let mut state = inner.state.lock();

		if state.generation == generation {
			state.pending = None;
		}
	}
}

#[derive(Serialize)]
struct RefreshBody<'a> {
	refresh_token: &'a str,
}
