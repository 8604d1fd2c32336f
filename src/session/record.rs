//! The installed session record and its construction rules.

// crates.io
use http::HeaderValue;
// self
use crate::{
	_prelude::*,
	session::{TokenGrant, TokenSecret, UserIdentity},
};

/// Errors produced while turning tokens into a [`Session`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum SessionError {
	/// The access token was empty.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// The access token cannot be carried in an `Authorization` header.
	#[error("Access token contains characters that are not valid in a header.")]
	InvalidAccessToken,
	/// The grant carried a zero or negative lifetime.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
	/// The grant lifetime overflows the supported time range.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
}

/// Credentials of the signed-in user.
///
/// A session is immutable; login and refresh build a new one and swap it in whole, so a reader
/// never observes a mix of old and new tokens.
#[derive(Clone)]
pub struct Session {
	/// Access token attached to outbound requests.
	pub access_token: TokenSecret,
	/// Refresh token, if the Auth Service issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Access-token expiry instant.
	pub expires_at: OffsetDateTime,
	/// Signed-in user.
	pub user: UserIdentity,
	authorization: HeaderValue,
}
impl Session {
	/// Builds a session from its parts, validating the access token.
	pub fn new(
		access_token: TokenSecret,
		refresh_token: Option<TokenSecret>,
		expires_at: OffsetDateTime,
		user: UserIdentity,
	) -> Result<Self, SessionError> {
		if access_token.is_empty() {
			return Err(SessionError::MissingAccessToken);
		}

		let authorization =
			access_token.to_bearer().map_err(|_| SessionError::InvalidAccessToken)?;
		let refresh_token = refresh_token.filter(|token| !token.is_empty());

		Ok(Self { access_token, refresh_token, expires_at, user, authorization })
	}

	/// Builds a session from a login grant received at `now`.
	pub fn from_grant(grant: TokenGrant, now: OffsetDateTime) -> Result<Self, SessionError> {
		let expires_at = expiry_from(now, grant.expires_in)?;

		Self::new(
			grant.access_token.into(),
			grant.refresh_token.map(TokenSecret::from),
			expires_at,
			grant.user,
		)
	}

	/// Builds the successor of this session from a refresh grant received at `now`.
	///
	/// A grant without a refresh token keeps the current one.
	pub fn rotate(&self, grant: TokenGrant, now: OffsetDateTime) -> Result<Self, SessionError> {
		let expires_at = expiry_from(now, grant.expires_in)?;
		let refresh_token = grant
			.refresh_token
			.filter(|token| !token.is_empty())
			.map(TokenSecret::from)
			.or_else(|| self.refresh_token.clone());

		Self::new(grant.access_token.into(), refresh_token, expires_at, grant.user)
	}

	/// Precomputed `Authorization: Bearer …` header value (marked sensitive).
	pub fn authorization(&self) -> &HeaderValue {
		&self.authorization
	}

	/// Returns `true` once the access token has passed its expiry instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at
	}
}
impl Debug for Session {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Session")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("expires_at", &self.expires_at)
			.field("user", &self.user)
			.finish()
	}
}

fn expiry_from(now: OffsetDateTime, expires_in: i64) -> Result<OffsetDateTime, SessionError> {
	if expires_in <= 0 {
		return Err(SessionError::NonPositiveExpiresIn);
	}

	now.checked_add(Duration::seconds(expires_in)).ok_or(SessionError::ExpiresInOutOfRange)
}
