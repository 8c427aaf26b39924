//! Rate-limit policies, the fixed policy table, and the decisions the limiter emits.

// self
use crate::{_prelude::*, error::ConfigError};

/// Operation keys the default policy table knows about.
pub mod operation {
	/// Sign-in attempts.
	pub const LOGIN: &str = "login";
	/// Account registration.
	pub const REGISTER: &str = "register";
	/// Image uploads (single or batch item).
	pub const UPLOAD: &str = "upload";
	/// Caption/tag regeneration requests.
	pub const REGENERATE_CAPTION: &str = "regenerate_caption";
}

/// Longest window a policy may declare.
pub const MAX_WINDOW_MS: u64 = 366 * 24 * 60 * 60 * 1_000;

/// Maximum number of calls admitted inside a trailing window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
	/// Calls admitted per window.
	pub max_calls: u32,
	/// Window length in milliseconds.
	pub window_ms: u64,
}
impl RateLimitPolicy {
	/// Creates a policy admitting `max_calls` per `window_ms` milliseconds.
	pub const fn new(max_calls: u32, window_ms: u64) -> Self {
		Self { max_calls, window_ms }
	}

	/// Window length as a duration.
	pub fn window(&self) -> Duration {
		Duration::milliseconds(i64::try_from(self.window_ms).unwrap_or(i64::MAX))
	}

	fn is_valid(&self) -> bool {
		self.max_calls > 0 && (1..=MAX_WINDOW_MS).contains(&self.window_ms)
	}
}

/// Fixed application table mapping operation keys to policies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RateLimitTable(HashMap<String, RateLimitPolicy>);
impl RateLimitTable {
	/// Table with no policies.
	pub fn empty() -> Self {
		Self(HashMap::new())
	}

	/// Adds or replaces the policy for `operation`.
	pub fn with_policy(mut self, operation: impl Into<String>, policy: RateLimitPolicy) -> Self {
		self.0.insert(operation.into(), policy);

		self
	}

	/// Looks up the policy for `operation`.
	pub fn get(&self, operation: &str) -> Option<&RateLimitPolicy> {
		self.0.get(operation)
	}

	/// Looks up the policy for `operation`, failing for unknown keys.
	pub fn require(&self, operation: &str) -> Result<&RateLimitPolicy, ConfigError> {
		self.get(operation)
			.ok_or_else(|| ConfigError::UnknownRateLimit { operation: operation.to_owned() })
	}

	/// Rejects policies that can never admit a call or whose window exceeds
	/// [`MAX_WINDOW_MS`].
	pub fn validate(&self) -> Result<(), ConfigError> {
		match self.0.iter().find(|(_, policy)| !policy.is_valid()) {
			Some((operation, _)) =>
				Err(ConfigError::InvalidRateLimit { operation: operation.clone() }),
			None => Ok(()),
		}
	}
}
impl Default for RateLimitTable {
	fn default() -> Self {
		Self::empty()
			.with_policy(operation::LOGIN, RateLimitPolicy::new(5, 5 * 60 * 1_000))
			.with_policy(operation::REGISTER, RateLimitPolicy::new(3, 60 * 60 * 1_000))
			.with_policy(operation::UPLOAD, RateLimitPolicy::new(10, 60 * 1_000))
			.with_policy(operation::REGENERATE_CAPTION, RateLimitPolicy::new(5, 60 * 1_000))
	}
}

/// Result emitted by [`RateLimiter::evaluate`](crate::limit::RateLimiter::evaluate).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
	/// The call may proceed immediately.
	Allow,
	/// The call exceeded its policy and must wait.
	Delay(RetryDirective),
}
impl RateLimitDecision {
	/// Returns `true` for [`RateLimitDecision::Delay`].
	pub fn is_limited(&self) -> bool {
		matches!(self, Self::Delay(_))
	}
}

/// Advises callers when to retry after a [`RateLimitDecision::Delay`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryDirective {
	/// Instant the oldest recorded call leaves the window.
	pub earliest_retry_at: OffsetDateTime,
	/// Time remaining until `earliest_retry_at`.
	pub wait: Duration,
	/// Human-readable wait message.
	pub reason: String,
}
impl RetryDirective {
	/// Builds a directive, rendering the wait in whole seconds (rounded up).
	pub fn new(earliest_retry_at: OffsetDateTime, now: OffsetDateTime) -> Self {
		let wait = (earliest_retry_at - now).max(Duration::ZERO);
		let mut seconds = wait.whole_seconds();

		if wait.subsec_nanoseconds() > 0 {
			seconds += 1;
		}

		let reason = format!(
			"Too many attempts. Please wait {seconds} second{} before trying again.",
			if seconds == 1 { "" } else { "s" }
		);

		Self { earliest_retry_at, wait, reason }
	}
}
