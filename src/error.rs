//! Gateway-level error types shared across transport, auth, session, and storage layers.

// self
use crate::_prelude::*;

/// Gateway-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical gateway error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Session persistence failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration or payload validation problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, body read).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Response body could not be decoded into the requested type.
	#[error("Response body (status {status}) could not be decoded.")]
	Decode {
		/// Structured parsing failure including the JSON path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status of the decoded response.
		status: u16,
	},

	/// The session could not be refreshed and has been cleared.
	#[error("Session expired: {reason}.")]
	SessionExpired {
		/// Why the refresh failed.
		reason: String,
	},
	/// The refresh call did not finish before the configured deadline.
	#[error("Token refresh did not complete within {after}.")]
	RefreshTimedOut {
		/// Configured refresh deadline.
		after: Duration,
	},
	/// The request was still rejected after being replayed with a refreshed token.
	#[error("Request remained unauthorized after a token refresh (status {status}).")]
	Unauthorized {
		/// HTTP status of the final rejection.
		status: u16,
	},
	/// Auth service rejected the credentials or the refresh token.
	#[error("Auth service rejected the grant: {reason}.")]
	InvalidGrant {
		/// Service-supplied reason string.
		reason: String,
	},
	/// Upstream answered with a non-success status.
	#[error("Upstream responded with status {status}.")]
	Status {
		/// HTTP status code.
		status: u16,
		/// Lossy UTF-8 preview of the response body.
		body: String,
	},
}
impl Error {
	/// Returns `true` for errors that ended the session (the caller should sign in again).
	pub fn is_session_expired(&self) -> bool {
		matches!(self, Self::SessionExpired { .. })
	}
}

/// Configuration and validation failures raised by the gateway.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Configuration document could not be parsed.
	#[error("Gateway configuration is invalid.")]
	Parse {
		/// Structured parsing failure including the offending field path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Base URL cannot carry relative API paths.
	#[error("Base URL `{url}` must be an absolute http(s) URL.")]
	InvalidBaseUrl {
		/// Offending URL.
		url: String,
	},
	/// An API path cannot be joined onto the base URL.
	#[error("Path `{path}` cannot be joined onto the base URL.")]
	InvalidEndpoint {
		/// Offending path.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Store scope is empty or contains whitespace.
	#[error("Store scope `{scope}` must be non-empty and free of whitespace.")]
	InvalidStoreScope {
		/// Offending scope.
		scope: String,
	},
	/// Session-ended signal needs room for at least one event.
	#[error("Session signal capacity must be greater than zero.")]
	ZeroSignalCapacity,
	/// A refresh or transport deadline is zero or negative.
	#[error("Timeouts must be positive durations.")]
	NonPositiveTimeout,
	/// Request body could not be serialized.
	#[error("Request body could not be serialized.")]
	RequestBody(#[from] serde_json::Error),
	/// Auth service payload does not form a usable session.
	#[error("Unable to build a session from the token grant.")]
	InvalidSession(#[from] crate::session::SessionError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::store::StoreError;

	#[test]
	fn store_error_converts_into_gateway_error_with_source() {
		let store_error = StoreError::Backend { message: "disk full".into() };
		let err: Error = store_error.clone().into();

		assert!(matches!(err, Error::Storage(_)));
		assert!(err.to_string().contains("disk full"));

		let source = StdError::source(&err)
			.expect("Gateway error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn session_expired_is_flagged() {
		let err = Error::SessionExpired { reason: "refresh token revoked".into() };

		assert!(err.is_session_expired());
		assert_eq!(err.to_string(), "Session expired: refresh token revoked.");
		assert!(!Error::Unauthorized { status: 401 }.is_session_expired());
	}
}
