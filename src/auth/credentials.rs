//! Point-in-time view of the stored session and its expiry arithmetic.

// self
use crate::{_prelude::*, auth::Secret};

/// Lifecycle status of a session relative to an instant and a refresh buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
	/// No access token is stored.
	Anonymous,
	/// Token is valid and outside the refresh buffer (or its expiry is unknown).
	Active,
	/// Token is still valid but expires within the refresh buffer.
	Expiring,
	/// Token expiry has passed.
	Expired,
}

/// Ephemeral read copy of the credentials held by a
/// [`CredentialStore`](crate::store::CredentialStore).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionCredentials {
	/// Short-lived access token.
	pub access_token: Option<Secret>,
	/// Long-lived refresh token.
	pub refresh_token: Option<Secret>,
	/// Access-token expiry as Unix epoch seconds.
	pub expires_at: Option<i64>,
}
impl SessionCredentials {
	/// Returns `true` iff an access token is present.
	pub fn is_authenticated(&self) -> bool {
		self.access_token.is_some()
	}

	/// Seconds left until expiry, negative once expired; `None` when the expiry is unknown.
	pub fn remaining_at(&self, now: OffsetDateTime) -> Option<i64> {
		self.expires_at.map(|expires_at| expires_at.saturating_sub(now.unix_timestamp()))
	}

	/// Returns `true` if the expiry is known and has passed at `now`.
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		self.remaining_at(now).is_some_and(|remaining| remaining <= 0)
	}

	/// Returns `true` iff the expiry is known and `0 < expiry - now < buffer`.
	pub fn should_refresh_at(&self, now: OffsetDateTime, buffer: Duration) -> bool {
		self.remaining_at(now)
			.is_some_and(|remaining| remaining > 0 && remaining < buffer.whole_seconds())
	}

	/// Computes the lifecycle status at a given instant.
	pub fn status_at(&self, now: OffsetDateTime, buffer: Duration) -> SessionStatus {
		if !self.is_authenticated() {
			return SessionStatus::Anonymous;
		}
		if self.is_expired_at(now) {
			return SessionStatus::Expired;
		}
		if self.should_refresh_at(now, buffer) {
			return SessionStatus::Expiring;
		}

		SessionStatus::Active
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	const BUFFER: Duration = Duration::seconds(300);

	fn expiring_at(expires_at: Option<i64>) -> SessionCredentials {
		SessionCredentials {
			access_token: Some(Secret::new("access")),
			refresh_token: Some(Secret::new("refresh")),
			expires_at,
		}
	}

	#[test]
	fn should_refresh_only_inside_open_buffer() {
		let now = macros::datetime!(2025-06-01 12:00 UTC);
		let base = now.unix_timestamp();

		assert!(!expiring_at(None).should_refresh_at(now, BUFFER));
		assert!(!expiring_at(Some(base - 10)).should_refresh_at(now, BUFFER));
		assert!(!expiring_at(Some(base)).should_refresh_at(now, BUFFER));
		assert!(expiring_at(Some(base + 1)).should_refresh_at(now, BUFFER));
		assert!(expiring_at(Some(base + 299)).should_refresh_at(now, BUFFER));
		assert!(!expiring_at(Some(base + 300)).should_refresh_at(now, BUFFER));
		assert!(!expiring_at(Some(base + 3_600)).should_refresh_at(now, BUFFER));
	}

	#[test]
	fn status_transitions_cover_all_states() {
		let now = macros::datetime!(2025-06-01 12:00 UTC);
		let base = now.unix_timestamp();

		assert_eq!(SessionCredentials::default().status_at(now, BUFFER), SessionStatus::Anonymous);
		assert_eq!(expiring_at(None).status_at(now, BUFFER), SessionStatus::Active);
		assert_eq!(expiring_at(Some(base + 3_600)).status_at(now, BUFFER), SessionStatus::Active);
		assert_eq!(expiring_at(Some(base + 60)).status_at(now, BUFFER), SessionStatus::Expiring);
		assert_eq!(expiring_at(Some(base)).status_at(now, BUFFER), SessionStatus::Expired);
	}
}
