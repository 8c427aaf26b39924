//! Fail-soft credential store layered over a [`SessionStorage`] medium.
//!
//! Every read and write tolerates a missing or failing medium: reads fall back to
//! `None`, writes become no-ops, and the failure is logged through
//! [`obs::record_suppressed_error`]. Nothing here returns an error to the caller.

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::{Secret, SessionCredentials},
	obs::{self, FlowKind},
	store::{SessionStorage, StorageKeys},
};

/// Sole owner of the persisted access token, refresh token, expiry, and user profile.
///
/// Clones share the same medium; only [`set_tokens`](Self::set_tokens),
/// [`set_user_data`](Self::set_user_data), and [`clear_tokens`](Self::clear_tokens) mutate it.
#[derive(Clone)]
pub struct CredentialStore {
	storage: Option<Arc<dyn SessionStorage>>,
	keys: Arc<StorageKeys>,
}
impl CredentialStore {
	/// Creates a store persisting through `storage` under the provided key names.
	pub fn new(storage: Arc<dyn SessionStorage>, keys: StorageKeys) -> Self {
		Self { storage: Some(storage), keys: Arc::new(keys) }
	}

	/// Creates a store with no persistence medium; reads return `None`, writes are dropped.
	pub fn detached(keys: StorageKeys) -> Self {
		Self { storage: None, keys: Arc::new(keys) }
	}

	/// Key names in use.
	pub fn keys(&self) -> &StorageKeys {
		&self.keys
	}

	/// Current access token.
	pub fn access_token(&self) -> Option<Secret> {
		self.read(&self.keys.access_token).map(Secret::new)
	}

	/// Current refresh token.
	pub fn refresh_token(&self) -> Option<Secret> {
		self.read(&self.keys.refresh_token).map(Secret::new)
	}

	/// Access-token expiry as Unix epoch seconds.
	pub fn expires_at(&self) -> Option<i64> {
		let raw = self.read(&self.keys.expires_at)?;

		match raw.trim().parse::<i64>() {
			Ok(value) => Some(value),
			Err(e) => {
				obs::record_suppressed_error(FlowKind::Storage, "expires_at", &e);

				None
			},
		}
	}

	/// Returns `true` iff an access token is present.
	pub fn is_authenticated(&self) -> bool {
		self.access_token().is_some()
	}

	/// Ephemeral copy of all token fields.
	pub fn snapshot(&self) -> SessionCredentials {
		SessionCredentials {
			access_token: self.access_token(),
			refresh_token: self.refresh_token(),
			expires_at: self.expires_at(),
		}
	}

	/// Stores a new access token.
	///
	/// An absent `refresh` keeps the stored refresh token; an absent `expires_in` keeps the
	/// stored expiry.
	pub fn set_tokens(
		&self,
		access: &Secret,
		refresh: Option<&Secret>,
		expires_in: Option<Duration>,
	) {
		self.set_tokens_at(access, refresh, expires_in, OffsetDateTime::now_utc());
	}

	/// Same as [`set_tokens`](Self::set_tokens) with an explicit clock reading.
	pub fn set_tokens_at(
		&self,
		access: &Secret,
		refresh: Option<&Secret>,
		expires_in: Option<Duration>,
		now: OffsetDateTime,
	) {
		self.write(&self.keys.access_token, access.expose());

		if let Some(refresh) = refresh {
			self.write(&self.keys.refresh_token, refresh.expose());
		}
		if let Some(expires_in) = expires_in {
			let expires_at = now.unix_timestamp().saturating_add(expires_in.whole_seconds());

			self.write(&self.keys.expires_at, &expires_at.to_string());
		}
	}

	/// Removes every session field, user profile included.
	pub fn clear_tokens(&self) {
		self.remove(&self.keys.access_token);
		self.remove(&self.keys.refresh_token);
		self.remove(&self.keys.expires_at);
		self.remove(&self.keys.user_data);
	}

	/// Cached profile of the signed-in user.
	pub fn user_data(&self) -> Option<Value> {
		let raw = self.read(&self.keys.user_data)?;

		match serde_json::from_str(&raw) {
			Ok(value) => Some(value),
			Err(e) => {
				obs::record_suppressed_error(FlowKind::Storage, "user_data", &e);

				None
			},
		}
	}

	/// Caches the profile of the signed-in user.
	pub fn set_user_data(&self, user: &Value) {
		match serde_json::to_string(user) {
			Ok(raw) => self.write(&self.keys.user_data, &raw),
			Err(e) => obs::record_suppressed_error(FlowKind::Storage, "set_user_data", &e),
		}
	}

	fn read(&self, key: &str) -> Option<String> {
		let storage = self.storage.as_ref()?;

		match storage.get_item(key) {
			Ok(value) => value.filter(|value| !value.is_empty()),
			Err(e) => {
				obs::record_suppressed_error(FlowKind::Storage, "get_item", &e);

				None
			},
		}
	}

	fn write(&self, key: &str, value: &str) {
		let Some(storage) = self.storage.as_ref() else { return };

		if let Err(e) = storage.set_item(key, value) {
			obs::record_suppressed_error(FlowKind::Storage, "set_item", &e);
		}
	}

	fn remove(&self, key: &str) {
		let Some(storage) = self.storage.as_ref() else { return };

		if let Err(e) = storage.remove_item(key) {
			obs::record_suppressed_error(FlowKind::Storage, "remove_item", &e);
		}
	}
}
impl Debug for CredentialStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialStore")
			.field("keys", &self.keys)
			.field("persistent", &self.storage.is_some())
			.finish()
	}
}
