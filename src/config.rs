//! Gateway configuration: API location, auth endpoints, persistence scope, and refresh limits.

// self
use crate::{_prelude::*, error::ConfigError};

/// Settings consumed by [`Gateway`](crate::gateway::Gateway) and
/// [`HttpAuthService`](crate::auth::HttpAuthService).
///
/// Deserializable from JSON (see [`GatewayConfig::from_json`]); every field except `base_url` has
/// a default.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
	/// Absolute base URL of the portfolio API; relative paths are joined onto it.
	pub base_url: Url,
	/// Path of the Auth Service login operation.
	#[serde(default = "GatewayConfig::default_login_path")]
	pub login_path: String,
	/// Path of the Auth Service refresh operation.
	#[serde(default = "GatewayConfig::default_refresh_path")]
	pub refresh_path: String,
	/// Prefix of the four persisted session entries.
	#[serde(default = "GatewayConfig::default_store_scope")]
	pub store_scope: String,
	/// Deadline for the refresh call; `None` inherits the transport's own timeouts.
	#[serde(default, with = "optional_seconds")]
	pub refresh_timeout: Option<Duration>,
	/// Buffered session-ended events per subscriber.
	#[serde(default = "GatewayConfig::default_signal_capacity")]
	pub signal_capacity: usize,
}
impl GatewayConfig {
	const DEFAULT_LOGIN_PATH: &'static str = "auth/login";
	const DEFAULT_REFRESH_PATH: &'static str = "auth/refresh";
	const DEFAULT_SIGNAL_CAPACITY: usize = 16;
	const DEFAULT_STORE_SCOPE: &'static str = "portfolio";

	/// Creates a config with default paths, scope, and no refresh deadline.
	pub fn new(base_url: Url) -> Self {
		Self {
			base_url,
			login_path: Self::default_login_path(),
			refresh_path: Self::default_refresh_path(),
			store_scope: Self::default_store_scope(),
			refresh_timeout: None,
			signal_capacity: Self::DEFAULT_SIGNAL_CAPACITY,
		}
	}

	/// Parses and validates a JSON config document.
	pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
		let mut de = serde_json::Deserializer::from_str(raw);
		let config: Self = serde_path_to_error::deserialize(&mut de)
			.map_err(|source| ConfigError::Parse { source })?;

		config.validate()?;

		Ok(config)
	}

	/// Overrides the login path.
	pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
		self.login_path = path.into();

		self
	}

	/// Overrides the refresh path.
	pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
		self.refresh_path = path.into();

		self
	}

	/// Overrides the persisted-entry prefix.
	pub fn with_store_scope(mut self, scope: impl Into<String>) -> Self {
		self.store_scope = scope.into();

		self
	}

	/// Bounds the refresh call; waiters are rejected with a timeout error past it.
	pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
		self.refresh_timeout = Some(timeout);

		self
	}

	/// Overrides the per-subscriber session-ended buffer.
	pub fn with_signal_capacity(mut self, capacity: usize) -> Self {
		self.signal_capacity = capacity;

		self
	}

	/// Checks invariants the gateway relies on.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.base_url.cannot_be_a_base() || !matches!(self.base_url.scheme(), "http" | "https")
		{
			return Err(ConfigError::InvalidBaseUrl { url: self.base_url.to_string() });
		}
		if self.store_scope.is_empty() || self.store_scope.chars().any(char::is_whitespace) {
			return Err(ConfigError::InvalidStoreScope { scope: self.store_scope.clone() });
		}
		if self.signal_capacity == 0 {
			return Err(ConfigError::ZeroSignalCapacity);
		}
		if self.refresh_timeout.is_some_and(|timeout| !timeout.is_positive()) {
			return Err(ConfigError::NonPositiveTimeout);
		}

		self.endpoint(&self.login_path)?;
		self.endpoint(&self.refresh_path)?;

		Ok(())
	}

	/// Resolves an API path against the base URL.
	///
	/// The base URL is treated as a directory (`https://host/api` and `https://host/api/` both
	/// resolve `investments` to `https://host/api/investments`). Absolute URLs pass through.
	pub fn endpoint(&self, path: &str) -> Result<Url, ConfigError> {
		let mut base = self.base_url.clone();

		if !base.path().ends_with('/') {
			let dir = format!("{}/", base.path());

			base.set_path(&dir);
		}

		base.join(path.trim_start_matches('/'))
			.map_err(|source| ConfigError::InvalidEndpoint { path: path.to_owned(), source })
	}

	fn default_login_path() -> String {
		Self::DEFAULT_LOGIN_PATH.into()
	}

	fn default_refresh_path() -> String {
		Self::DEFAULT_REFRESH_PATH.into()
	}

	fn default_store_scope() -> String {
		Self::DEFAULT_STORE_SCOPE.into()
	}

	fn default_signal_capacity() -> usize {
		Self::DEFAULT_SIGNAL_CAPACITY
	}
}

mod optional_seconds {
	// self
	use crate::_prelude::*;

	pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		value.map(|d| d.as_seconds_f64()).serialize(serializer)
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		use serde::de::Error as _;

		Option::<f64>::deserialize(deserializer)?
			.map(|secs| {
				Duration::checked_seconds_f64(secs)
					.ok_or_else(|| D::Error::custom(format!("{secs} is not a representable duration")))
			})
			.transpose()
	}
}
