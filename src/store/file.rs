//! File-backed [`KeyValueStore`] for desktop shells and CLI tools.

// std
use std::{
	collections::BTreeMap,
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	store::{KeyValueStore, StoreError, StoreFuture},
};

/// Persists all entries to a JSON object after each mutation.
///
/// Writes go to a sibling `.tmp` file that is synced and renamed over the target, so a crash
/// leaves either the previous or the next snapshot on disk.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<BTreeMap<String, String>>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Location of the snapshot file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<BTreeMap<String, String>, StoreError> {
		if !path.exists() {
			return Ok(BTreeMap::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.iter().all(u8::is_ascii_whitespace) {
			return Ok(BTreeMap::new());
		}

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, contents: &BTreeMap<String, String>) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(contents).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}

	/// Applies `mutate` to a copy of the snapshot and publishes it only if the disk write wins.
	fn commit(&self, mutate: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<(), StoreError> {
		let mut guard = self.inner.write();
		let mut next = guard.clone();

		mutate(&mut next);

		if next == *guard {
			return Ok(());
		}

		self.persist_locked(&next)?;
		*guard = next;

		Ok(())
	}
}
impl KeyValueStore for FileStore {
	fn get_many<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, Vec<Option<String>>> {
		Box::pin(async move {
			let guard = self.inner.read();

			Ok(keys.iter().map(|key| guard.get(key).cloned()).collect())
		})
	}

	fn set_many(&self, entries: Vec<(String, String)>) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.commit(|map| map.extend(entries)) })
	}

	fn remove_many<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.commit(|map| {
				for key in keys {
					map.remove(key);
				}
			})
		})
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, process};
	// crates.io
	use tokio::runtime::Runtime;
	// self
	use super::*;

	fn temp_path() -> PathBuf {
		let unique = format!(
			"portfolio_gateway_file_store_{}_{}.json",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique)
	}

	#[test]
	fn entries_survive_reopen_and_removal_is_persisted() {
		let path = temp_path();
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");
		let keys = vec!["portfolio.access_token".to_string(), "portfolio.user".to_string()];

		rt.block_on(store.set_many(vec![
			(keys[0].clone(), "access".into()),
			(keys[1].clone(), "{\"id\":\"u-1\"}".into()),
		]))
		.expect("Failed to write entries to the file store.");
		drop(store);

		let reopened = FileStore::open(&path).expect("Failed to reopen file store snapshot.");
		let values = rt
			.block_on(reopened.get_many(&keys))
			.expect("Failed to read entries from the reopened file store.");

		assert_eq!(values, vec![Some("access".into()), Some("{\"id\":\"u-1\"}".into())]);

		rt.block_on(reopened.remove_many(&keys))
			.expect("Failed to remove entries from the file store.");

		let reloaded = FileStore::open(&path).expect("Failed to reopen file store snapshot.");

		assert_eq!(
			rt.block_on(reloaded.get_many(&keys)).expect("Reading removed keys should succeed."),
			vec![None, None],
		);

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}

	#[test]
	fn corrupt_snapshot_is_reported() {
		let path = temp_path();

		fs::write(&path, b"[not json").expect("Failed to write corrupt snapshot.");

		let err = FileStore::open(&path).expect_err("Corrupt snapshots should fail to open.");

		assert!(matches!(err, StoreError::Serialization { .. }));

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}
}
