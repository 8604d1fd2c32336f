//! Auth Service contract (login + refresh) and its HTTP implementation.
//!
//! The gateway depends on the two operations only through [`AuthService`], so tests and embedders
//! can swap in their own implementation. [`HttpAuthService`] talks JSON to the portfolio API's
//! auth endpoints through the same [`HttpTransport`] the gateway uses, without bearer headers.

// crates.io
use http::{Method, StatusCode};
// self
use crate::{
	_prelude::*,
	config::GatewayConfig,
	error::{ConfigError, TransportError},
	session::{LoginCredentials, TokenGrant, TokenSecret},
	transport::{ApiRequest, ApiResponse, HttpTransport},
};
#[cfg(feature = "reqwest")] use crate::transport::ReqwestTransport;

/// Boxed future returned by [`AuthService`] operations.
pub type AuthFuture<'a> = Pin<Box<dyn Future<Output = Result<TokenGrant>> + 'a + Send>>;

/// Upstream collaborator that issues and rotates tokens.
pub trait AuthService
where
	Self: Send + Sync,
{
	/// Exchanges user credentials for a grant.
	fn login<'a>(&'a self, credentials: &'a LoginCredentials) -> AuthFuture<'a>;

	/// Exchanges a refresh token for a new grant.
	///
	/// An invalid or expired refresh token must be reported as [`Error::InvalidGrant`].
	fn refresh<'a>(&'a self, refresh_token: &'a TokenSecret) -> AuthFuture<'a>;
}

#[cfg(feature = "reqwest")]
/// Auth service specialized for the crate's default reqwest transport.
pub type ReqwestAuthService = HttpAuthService<ReqwestTransport>;

/// JSON-over-HTTP [`AuthService`].
///
/// `login` posts `{"email","password"}` and `refresh` posts `{"refresh_token"}`; both expect a
/// [`TokenGrant`] body on success. 400, 401, and 403 answers are read as a rejected grant.
pub struct HttpAuthService<C>
where
	C: ?Sized + HttpTransport,
{
	transport: Arc<C>,
	login_url: Url,
	refresh_url: Url,
}
impl<C> HttpAuthService<C>
where
	C: ?Sized + HttpTransport,
{
	/// Builds the service from the configured login and refresh paths.
	pub fn new(config: &GatewayConfig, transport: impl Into<Arc<C>>) -> Result<Self, ConfigError> {
		Ok(Self {
			transport: transport.into(),
			login_url: config.endpoint(&config.login_path)?,
			refresh_url: config.endpoint(&config.refresh_path)?,
		})
	}

	async fn exchange<T>(&self, url: &Url, body: &T) -> Result<TokenGrant>
	where
		T: ?Sized + Serialize + Sync,
	{
		let request = ApiRequest::new(Method::POST, url.clone()).with_json(body)?;
		let response =
			self.transport.execute(request).await.map_err(TransportError::network)?;

		match response.status {
			status if status.is_success() => response.json(),
			StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN =>
				Err(Error::InvalidGrant { reason: rejection_reason(&response) }),
			status => Err(Error::Status { status: status.as_u16(), body: response.text() }),
		}
	}
}
impl<C> AuthService for HttpAuthService<C>
where
	C: ?Sized + HttpTransport,
{
	fn login<'a>(&'a self, credentials: &'a LoginCredentials) -> AuthFuture<'a> {
		Box::pin(self.exchange(&self.login_url, credentials))
	}

	fn refresh<'a>(&'a self, refresh_token: &'a TokenSecret) -> AuthFuture<'a> {
		#[derive(Serialize)]
		struct RefreshBody<'t> {
			refresh_token: &'t str,
		}

		Box::pin(async move {
			self.exchange(&self.refresh_url, &RefreshBody { refresh_token: refresh_token.expose() })
				.await
		})
	}
}
impl<C> Debug for HttpAuthService<C>
where
	C: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HttpAuthService")
			.field("login_url", &self.login_url.as_str())
			.field("refresh_url", &self.refresh_url.as_str())
			.finish()
	}
}

/// Picks the most specific message the service sent (`detail`, `error_description`, `error`,
/// `message`), falling back to the status reason.
fn rejection_reason(response: &ApiResponse) -> String {
	const FIELDS: [&str; 4] = ["detail", "error_description", "error", "message"];

	let parsed = serde_json::from_slice::<serde_json::Value>(&response.body).ok();
	let from_body = parsed.as_ref().and_then(|value| {
		FIELDS.iter().find_map(|field| value.get(*field).and_then(serde_json::Value::as_str))
	});

	match from_body {
		Some(reason) => reason.to_owned(),
		None => response.status.canonical_reason().unwrap_or("rejected").to_owned(),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn rejection_reason_prefers_body_fields() {
		let detail = ApiResponse::new(
			StatusCode::UNAUTHORIZED,
			br#"{"detail":"Refresh token expired","error":"invalid_grant"}"#.to_vec(),
		);
		let oauth_style =
			ApiResponse::new(StatusCode::BAD_REQUEST, br#"{"error":"invalid_grant"}"#.to_vec());
		let empty = ApiResponse::new(StatusCode::FORBIDDEN, Vec::new());

		assert_eq!(rejection_reason(&detail), "Refresh token expired");
		assert_eq!(rejection_reason(&oauth_style), "invalid_grant");
		assert_eq!(rejection_reason(&empty), "Forbidden");
	}
}
