//! Transport primitives: replayable request descriptors, buffered responses, and the
//! [`HttpTransport`] seam the gateway sends through.
//!
//! An [`ApiRequest`] owns everything needed to send it again (method, URL, headers, body), which
//! is what lets the gateway replay a request after a token refresh without asking the caller to
//! rebuild it. Responses are fully buffered so the gateway can inspect the status and hand the
//! same value back untouched.

// crates.io
use http::{
	HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
	header::{CONTENT_TYPE, RETRY_AFTER},
};
use serde::de::DeserializeOwned;
use time::format_description::well_known::Rfc2822;
// self
use crate::{_prelude::*, error::ConfigError};

/// Boxed future returned by [`HttpTransport::execute`].
pub type TransportFuture<'a, E> = Pin<Box<dyn Future<Output = Result<ApiResponse, E>> + 'a + Send>>;

/// Abstraction over HTTP stacks able to execute an [`ApiRequest`].
///
/// This is the gateway's only dependency on an HTTP client. Implementations must be
/// `Send + Sync + 'static` so the gateway can share them with its background refresh task.
/// Requests arrive with credentials already attached; transports must not add or strip the
/// `Authorization` header, and must report every HTTP status (including 401) as `Ok`.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// Sends `request` and buffers the response.
	fn execute(&self, request: ApiRequest) -> TransportFuture<'_, Self::TransportError>;
}

/// Outbound request descriptor that can be sent more than once.
#[derive(Clone, Debug)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute request URL.
	pub url: Url,
	/// Request headers.
	pub headers: HeaderMap,
	/// Optional request body.
	pub body: Option<Vec<u8>>,
	retried: bool,
}
impl ApiRequest {
	/// Creates a body-less request.
	pub fn new(method: Method, url: Url) -> Self {
		Self { method, url, headers: HeaderMap::new(), body: None, retried: false }
	}

	/// Shorthand for a `GET` request.
	pub fn get(url: Url) -> Self {
		Self::new(Method::GET, url)
	}

	/// Adds or replaces a header.
	pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.headers.insert(name, value);

		self
	}

	/// Sets a raw body.
	pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = Some(body.into());

		self
	}

	/// Serializes `body` as JSON and sets the matching content type.
	pub fn with_json<T>(self, body: &T) -> Result<Self, ConfigError>
	where
		T: ?Sized + Serialize,
	{
		let bytes = serde_json::to_vec(body)?;

		Ok(self
			.with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
			.with_body(bytes))
	}

	/// Returns `true` once the gateway has re-sent this request after an authorization failure.
	pub fn is_retried(&self) -> bool {
		self.retried
	}

	pub(crate) fn into_retry(mut self) -> Self {
		self.retried = true;

		self
	}
}

/// Fully buffered HTTP response.
#[derive(Clone, Debug)]
pub struct ApiResponse {
	/// Response status.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Response body bytes.
	pub body: Vec<u8>,
}
impl ApiResponse {
	/// Creates a response from its parts.
	pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
		Self { status, headers: HeaderMap::new(), body: body.into() }
	}

	/// Returns `true` for the authorization failure the gateway recovers from (HTTP 401).
	pub fn is_unauthorized(&self) -> bool {
		self.status == StatusCode::UNAUTHORIZED
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		self.status.is_success()
	}

	/// Lossy UTF-8 view of the body.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	/// Decodes the body as JSON, reporting the failing field path on error.
	pub fn json<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let mut de = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut de)
			.map_err(|source| Error::Decode { source, status: self.status.as_u16() })
	}

	/// Converts non-2xx responses into [`Error::Status`].
	pub fn error_for_status(self) -> Result<Self> {
		if self.is_success() {
			Ok(self)
		} else {
			Err(Error::Status { status: self.status.as_u16(), body: self.text() })
		}
	}

	/// `Retry-After` hint as a relative duration (delta-seconds or HTTP date).
	pub fn retry_after(&self) -> Option<Duration> {
		parse_retry_after(&self.headers)
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Configure any custom client with the timeouts the deployment needs; the refresh call inherits
/// them unless a gateway-level refresh deadline is set.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a client whose every request, the refresh call included, is bounded by `timeout`.
	pub fn with_timeout(timeout: Duration) -> Result<Self, ConfigError> {
		if !timeout.is_positive() {
			return Err(ConfigError::NonPositiveTimeout);
		}

		let timeout =
			std::time::Duration::try_from(timeout).map_err(|_| ConfigError::NonPositiveTimeout)?;
		let client = ReqwestClient::builder().timeout(timeout).build()?;

		Ok(Self(client))
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	type TransportError = ReqwestError;

	fn execute(&self, request: ApiRequest) -> TransportFuture<'_, Self::TransportError> {
		let client = self.0.clone();

		Box::pin(async move {
			let ApiRequest { method, url, headers, body, .. } = request;
			let mut builder = client.request(method, url).headers(headers);

			if let Some(body) = body {
				builder = builder.body(body);
			}

			let response = builder.send().await?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let body = response.bytes().await?.to_vec();

			Ok(ApiResponse { status, headers, body })
		})
	}
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u32>() {
		return Some(Duration::seconds(secs.into()));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url() -> Url {
		Url::parse("https://api.example.com/api/investments").expect("Fixture URL should parse.")
	}

	#[test]
	fn json_body_sets_content_type() {
		let request = ApiRequest::new(Method::POST, url())
			.with_json(&serde_json::json!({ "name": "Fund IV" }))
			.expect("JSON body should serialize.");

		assert_eq!(
			request.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
			Some("application/json"),
		);
		assert_eq!(request.body.as_deref(), Some(br#"{"name":"Fund IV"}"#.as_slice()));
		assert!(!request.is_retried());
		assert!(request.into_retry().is_retried());
	}

	#[test]
	fn decode_errors_carry_field_path() {
		#[derive(Debug, Deserialize)]
		struct Investment {
			#[allow(dead_code)]
			commitment: f64,
		}

		let response = ApiResponse::new(StatusCode::OK, br#"{"commitment":"lots"}"#.to_vec());
		let err = response.json::<Investment>().expect_err("Mistyped field should fail.");

		match err {
			Error::Decode { source, status } => {
				assert_eq!(status, 200);
				assert_eq!(source.path().to_string(), "commitment");
			},
			other => panic!("Unexpected error: {other:?}"),
		}
	}

	#[test]
	fn error_for_status_keeps_body_preview() {
		let err = ApiResponse::new(StatusCode::UNPROCESSABLE_ENTITY, b"bad vintage".to_vec())
			.error_for_status()
			.expect_err("422 should convert into an error.");

		assert!(matches!(err, Error::Status { status: 422, ref body } if body == "bad vintage"));
		assert!(ApiResponse::new(StatusCode::NO_CONTENT, Vec::new()).error_for_status().is_ok());
	}

	#[cfg(feature = "reqwest")]
	#[test]
	fn reqwest_transport_requires_positive_timeouts() {
		assert!(ReqwestTransport::with_timeout(Duration::seconds(10)).is_ok());
		assert!(matches!(
			ReqwestTransport::with_timeout(Duration::seconds(-1)),
			Err(ConfigError::NonPositiveTimeout)
		));
		assert!(matches!(
			ReqwestTransport::with_timeout(Duration::ZERO),
			Err(ConfigError::NonPositiveTimeout)
		));
	}

	#[test]
	fn retry_after_accepts_delta_seconds() {
		let mut response = ApiResponse::new(StatusCode::TOO_MANY_REQUESTS, Vec::new());

		response.headers.insert(RETRY_AFTER, HeaderValue::from_static("120"));

		assert_eq!(response.retry_after(), Some(Duration::minutes(2)));

		response.headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));

		assert_eq!(response.retry_after(), None);
	}
}
