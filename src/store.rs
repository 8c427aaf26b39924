//! Storage contracts, built-in storage media, and the fail-soft credential store.

pub mod credentials;
pub mod file;
pub mod memory;

pub use credentials::CredentialStore;
pub use file::FileStorage;
pub use memory::MemoryStorage;

// self
use crate::_prelude::*;

/// Durable key/value medium the credential store persists through.
///
/// Mirrors the browser `localStorage` surface. Implementations report failures; the
/// [`CredentialStore`] decides to swallow them.
pub trait SessionStorage
where
	Self: Send + Sync,
{
	/// Reads the value stored under `key`.
	fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;

	/// Stores `value` under `key`, replacing any previous value.
	fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;

	/// Removes `key`; removing a missing key succeeds.
	fn remove_item(&self, key: &str) -> Result<(), StoreError>;
}

/// Error type produced by [`SessionStorage`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage medium.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Key names the session is persisted under.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageKeys {
	/// Access token key; changes to it drive cross-context login/logout propagation.
	pub access_token: String,
	/// Refresh token key.
	pub refresh_token: String,
	/// Expiry (epoch seconds) key.
	pub expires_at: String,
	/// Cached user profile key.
	pub user_data: String,
}
impl Default for StorageKeys {
	fn default() -> Self {
		Self {
			access_token: "access_token".into(),
			refresh_token: "refresh_token".into(),
			expires_at: "token_expiry".into(),
			user_data: "user_data".into(),
		}
	}
}
