// std
use std::sync::Arc;
// crates.io
use serde_json::json;
use time::{Duration, macros};
// self
use session_guard::{
	auth::{Secret, SessionStatus},
	store::{CredentialStore, FileStorage, MemoryStorage, SessionStorage, StorageKeys},
};

fn temp_path(name: &str) -> std::path::PathBuf {
	std::env::temp_dir().join(format!("session-guard-store-{name}-{}.json", std::process::id()))
}

fn custom_keys() -> StorageKeys {
	StorageKeys {
		access_token: "gallery.access".into(),
		refresh_token: "gallery.refresh".into(),
		expires_at: "gallery.expiry".into(),
		user_data: "gallery.user".into(),
	}
}

#[test]
fn memory_medium_uses_configured_keys() {
	let medium = MemoryStorage::default();
	let store = CredentialStore::new(Arc::new(medium.clone()), custom_keys());
	let now = macros::datetime!(2025-11-10 12:00 UTC);

	store.set_tokens_at(&Secret::new("access-1"), Some(&Secret::new("refresh-1")), Some(Duration::minutes(3)), now);

	assert_eq!(
		medium.get_item("gallery.access").expect("Memory medium should be readable."),
		Some("access-1".to_owned())
	);
	assert_eq!(
		medium.get_item("gallery.expiry").expect("Memory medium should be readable."),
		Some((now.unix_timestamp() + 180).to_string())
	);
	assert_eq!(
		store.snapshot().status_at(now, Duration::seconds(300)),
		SessionStatus::Expiring
	);
	assert_eq!(
		store.snapshot().status_at(now + Duration::minutes(3), Duration::seconds(300)),
		SessionStatus::Expired
	);
}

#[test]
fn file_medium_survives_reopen_and_clear() {
	let path = temp_path("reopen");

	let _ = std::fs::remove_file(&path);

	{
		let medium = FileStorage::open(&path).expect("File medium should open.");
		let store = CredentialStore::new(Arc::new(medium), StorageKeys::default());

		store.set_tokens(&Secret::new("access-1"), Some(&Secret::new("refresh-1")), None);
		store.set_user_data(&json!({ "id": 7, "name": "Ada" }));
	}

	let medium = FileStorage::open(&path).expect("File medium should reopen.");
	let store = CredentialStore::new(Arc::new(medium), StorageKeys::default());

	assert!(store.is_authenticated());
	assert_eq!(store.refresh_token().as_ref().map(Secret::expose), Some("refresh-1"));
	assert!(store.expires_at().is_none());
	assert_eq!(store.user_data(), Some(json!({ "id": 7, "name": "Ada" })));

	store.clear_tokens();

	let reopened = FileStorage::open(&path).expect("File medium should reopen after clearing.");

	assert_eq!(reopened.get_item("access_token").expect("File medium should be readable."), None);
	assert_eq!(reopened.get_item("user_data").expect("File medium should be readable."), None);

	let _ = std::fs::remove_file(&path);
}

#[test]
fn detached_store_behaves_as_signed_out() {
	let store = CredentialStore::detached(StorageKeys::default());

	store.set_tokens(&Secret::new("access-1"), None, Some(Duration::hours(1)));

	assert!(!store.is_authenticated());
	assert_eq!(
		store.snapshot().status_at(macros::datetime!(2025-11-10 12:00 UTC), Duration::seconds(300)),
		SessionStatus::Anonymous
	);
}
