//! Thread-safe in-memory [`SessionStorage`] for tests, demos, and headless clients.

// self
use crate::{
	_prelude::*,
	store::{SessionStorage, StoreError},
};

/// Storage medium that keeps items in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage(Arc<RwLock<HashMap<String, String>>>);
impl MemoryStorage {
	/// Number of stored items.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}
impl SessionStorage for MemoryStorage {
	fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
		Ok(self.0.read().get(key).cloned())
	}

	fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
		self.0.write().insert(key.to_owned(), value.to_owned());

		Ok(())
	}

	fn remove_item(&self, key: &str) -> Result<(), StoreError> {
		self.0.write().remove(key);

		Ok(())
	}
}
