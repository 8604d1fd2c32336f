//! Thread-safe in-memory [`KeyValueStore`] for tests and short-lived processes.

// self
use crate::{
	_prelude::*,
	store::{KeyValueStore, StoreError, StoreFuture},
};

type EntryMap = Arc<RwLock<HashMap<String, String>>>;

/// Keeps entries in-process; clones share the same map.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(EntryMap);
impl MemoryStore {
	/// Returns the value stored under `key`.
	pub fn get(&self, key: &str) -> Option<String> {
		self.0.read().get(key).cloned()
	}

	/// Number of stored entries.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	fn get_now(map: &EntryMap, keys: &[String]) -> Vec<Option<String>> {
		let guard = map.read();

		keys.iter().map(|key| guard.get(key).cloned()).collect()
	}

	fn set_now(map: &EntryMap, entries: Vec<(String, String)>) -> Result<(), StoreError> {
		map.write().extend(entries);

		Ok(())
	}

	fn remove_now(map: &EntryMap, keys: &[String]) -> Result<(), StoreError> {
		let mut guard = map.write();

		for key in keys {
			guard.remove(key);
		}

		Ok(())
	}
}
impl KeyValueStore for MemoryStore {
	fn get_many<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, Vec<Option<String>>> {
		Box::pin(async move { Ok(Self::get_now(&self.0, keys)) })
	}

	fn set_many(&self, entries: Vec<(String, String)>) -> StoreFuture<'_, ()> {
		let map = self.0.clone();

		Box::pin(async move { Self::set_now(&map, entries) })
	}

	fn remove_many<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, ()> {
		Box::pin(async move { Self::remove_now(&self.0, keys) })
	}
}
