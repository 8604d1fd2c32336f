//! Scoped key-value persistence for the session and the built-in backends.
//!
//! The session is persisted as four string entries under fixed names: access token, refresh
//! token, serialized user identity, and the expiry as unix seconds. [`SessionStore`] writes and
//! clears them as one batch; [`KeyValueStore`] backends apply a batch under a single lock.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	session::{Session, TokenSecret, UserIdentity},
};

/// Boxed future returned by [`KeyValueStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// String key-value capability the gateway persists its session into.
pub trait KeyValueStore
where
	Self: Send + Sync,
{
	/// Reads the values for `keys`, in order; missing keys yield `None`.
	fn get_many<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, Vec<Option<String>>>;

	/// Writes every entry as one batch.
	fn set_many(&self, entries: Vec<(String, String)>) -> StoreFuture<'_, ()>;

	/// Removes every key as one batch; absent keys are ignored.
	fn remove_many<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, ()>;
}

/// Error type produced by [`KeyValueStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Stored data could not be encoded or decoded.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Fixed entry names for one session scope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionKeys {
	/// Access token entry.
	pub access_token: String,
	/// Refresh token entry (empty string when no refresh token was issued).
	pub refresh_token: String,
	/// Serialized [`UserIdentity`] entry.
	pub user: String,
	/// Expiry entry, unix seconds.
	pub token_expiry: String,
}
impl SessionKeys {
	/// Builds the entry names under `scope`, e.g. `portfolio.access_token`.
	pub fn scoped(scope: &str) -> Self {
		Self {
			access_token: format!("{scope}.access_token"),
			refresh_token: format!("{scope}.refresh_token"),
			user: format!("{scope}.user"),
			token_expiry: format!("{scope}.token_expiry"),
		}
	}

	/// All four names, in storage order.
	pub fn all(&self) -> [String; 4] {
		[
			self.access_token.clone(),
			self.refresh_token.clone(),
			self.user.clone(),
			self.token_expiry.clone(),
		]
	}
}

/// Reads and writes a [`Session`] through a [`KeyValueStore`].
#[derive(Clone)]
pub struct SessionStore {
	backend: Arc<dyn KeyValueStore>,
	keys: SessionKeys,
}
impl SessionStore {
	/// Creates a session store over `backend` under `scope`.
	pub fn new(backend: Arc<dyn KeyValueStore>, scope: &str) -> Self {
		Self { backend, keys: SessionKeys::scoped(scope) }
	}

	/// Entry names used by this store.
	pub fn keys(&self) -> &SessionKeys {
		&self.keys
	}

	/// Loads the persisted session.
	///
	/// Returns `Ok(None)` when no entry exists. A partial or undecodable record is cleared and
	/// also reported as `Ok(None)`; only backend failures surface as errors.
	pub async fn load(&self) -> Result<Option<Session>, StoreError> {
		let keys = self.keys.all();
		let values = self.backend.get_many(&keys).await?;

		if values.iter().all(Option::is_none) {
			return Ok(None);
		}

		match decode(values) {
			Ok(session) => Ok(Some(session)),
			Err(err) => {
				#[cfg(feature = "tracing")]
				tracing::warn!(error = %err, "Discarding unreadable persisted session.");
				#[cfg(not(feature = "tracing"))]
				let _ = err;

				self.backend.remove_many(&keys).await?;

				Ok(None)
			},
		}
	}

	/// Persists all four entries of `session` as one batch.
	pub async fn save(&self, session: &Session) -> Result<(), StoreError> {
		let user = serde_json::to_string(&session.user).map_err(|e| {
			StoreError::Serialization { message: format!("Failed to encode user identity: {e}") }
		})?;
		let entries = vec![
			(self.keys.access_token.clone(), session.access_token.expose().to_owned()),
			(
				self.keys.refresh_token.clone(),
				session.refresh_token.as_ref().map(|t| t.expose().to_owned()).unwrap_or_default(),
			),
			(self.keys.user.clone(), user),
			(self.keys.token_expiry.clone(), session.expires_at.unix_timestamp().to_string()),
		];

		self.backend.set_many(entries).await
	}

	/// Removes all four entries as one batch.
	pub async fn clear(&self) -> Result<(), StoreError> {
		self.backend.remove_many(&self.keys.all()).await
	}
}
impl Debug for SessionStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionStore").field("keys", &self.keys).finish()
	}
}

fn decode(values: Vec<Option<String>>) -> Result<Session, StoreError> {
	let missing = |name: &str| StoreError::Serialization {
		message: format!("Persisted session is missing its {name} entry"),
	};
	let mut values = values.into_iter();
	let access = values.next().flatten().ok_or_else(|| missing("access token"))?;
	let refresh = values.next().flatten().ok_or_else(|| missing("refresh token"))?;
	let user = values.next().flatten().ok_or_else(|| missing("user"))?;
	let expiry = values.next().flatten().ok_or_else(|| missing("token expiry"))?;
	let user: UserIdentity = serde_json::from_str(&user).map_err(|e| StoreError::Serialization {
		message: format!("Failed to decode user identity: {e}"),
	})?;
	let expires_at = expiry
		.trim()
		.parse::<i64>()
		.ok()
		.and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
		.ok_or_else(|| StoreError::Serialization {
			message: format!("Token expiry `{expiry}` is not a unix timestamp"),
		})?;

	Session::new(TokenSecret::new(access), Some(TokenSecret::new(refresh)), expires_at, user)
		.map_err(|e| StoreError::Serialization { message: e.to_string() })
}
