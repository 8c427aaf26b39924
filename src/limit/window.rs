//! Sliding-window call counter keyed by operation name.
//!
//! Every evaluation records the call first, lazily drops timestamps that fell out of the
//! trailing window, and then compares the surviving count against the policy. Limited
//! calls are recorded as well, so hammering a limited operation keeps it limited.

// crates.io
use time::PrimitiveDateTime;
// self
use crate::{
	_prelude::*,
	limit::{RateLimitDecision, RateLimitPolicy, RetryDirective},
};

/// In-memory sliding-window limiter. Clones share the same windows.
#[derive(Clone, Debug, Default)]
pub struct RateLimiter {
	windows: Arc<Mutex<HashMap<String, VecDeque<OffsetDateTime>>>>,
}
impl RateLimiter {
	/// Records a call under `key` and reports whether it exceeds `policy`.
	pub fn is_rate_limited(&self, key: &str, policy: &RateLimitPolicy) -> bool {
		self.is_rate_limited_at(key, policy, OffsetDateTime::now_utc())
	}

	/// Same as [`is_rate_limited`](Self::is_rate_limited) with an explicit clock reading.
	pub fn is_rate_limited_at(
		&self,
		key: &str,
		policy: &RateLimitPolicy,
		now: OffsetDateTime,
	) -> bool {
		self.evaluate_at(key, policy, now).is_limited()
	}

	/// Records a call under `key` and returns the decision with retry guidance.
	pub fn evaluate(&self, key: &str, policy: &RateLimitPolicy) -> RateLimitDecision {
		self.evaluate_at(key, policy, OffsetDateTime::now_utc())
	}

	/// Same as [`evaluate`](Self::evaluate) with an explicit clock reading.
	pub fn evaluate_at(
		&self,
		key: &str,
		policy: &RateLimitPolicy,
		now: OffsetDateTime,
	) -> RateLimitDecision {
		let window = policy.window();
		let mut windows = self.windows.lock();
		let calls = windows.entry(key.to_owned()).or_default();

		calls.retain(|at| now - *at < window);
		calls.push_back(now);

		let max_calls = usize::try_from(policy.max_calls).unwrap_or(usize::MAX);

		if calls.len() <= max_calls {
			return RateLimitDecision::Allow;
		}

		let oldest = calls.iter().min().copied().unwrap_or(now);
		// Windows that run past the calendar saturate at the last representable instant.
		let retry_at = oldest.checked_add(window).unwrap_or(PrimitiveDateTime::MAX.assume_utc());

		RateLimitDecision::Delay(RetryDirective::new(retry_at, now))
	}

	/// Number of calls currently recorded under `key` inside `policy`'s window.
	pub fn recorded_at(&self, key: &str, policy: &RateLimitPolicy, now: OffsetDateTime) -> usize {
		let window = policy.window();

		self.windows
			.lock()
			.get(key)
			.map(|calls| calls.iter().filter(|at| now - **at < window).count())
			.unwrap_or(0)
	}

	/// Forgets the history of one key.
	pub fn reset(&self, key: &str) {
		self.windows.lock().remove(key);
	}

	/// Forgets every key.
	pub fn clear_all(&self) {
		self.windows.lock().clear();
	}
}
