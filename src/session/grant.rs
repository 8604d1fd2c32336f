//! Payloads exchanged with the Auth Service.

// self
use crate::{_prelude::*, session::UserIdentity};

/// Token payload returned by both `login` and `refresh`.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenGrant {
	/// Newly issued access token.
	pub access_token: String,
	/// Rotated refresh token; `None` keeps the previous one on refresh.
	#[serde(default)]
	pub refresh_token: Option<String>,
	/// Access-token lifetime in seconds.
	pub expires_in: i64,
	/// Signed-in user.
	pub user: UserIdentity,
}
impl Debug for TokenGrant {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenGrant")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("expires_in", &self.expires_in)
			.field("user", &self.user)
			.finish()
	}
}

/// Email + password pair submitted to the Auth Service.
#[derive(Clone, Serialize)]
pub struct LoginCredentials {
	/// Account email.
	pub email: String,
	/// Account password.
	pub password: String,
}
impl LoginCredentials {
	/// Creates a credential pair.
	pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
		Self { email: email.into(), password: password.into() }
	}
}
impl Debug for LoginCredentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LoginCredentials")
			.field("email", &self.email)
			.field("password", &"<redacted>")
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn grant_without_refresh_token_deserializes() {
		let grant: TokenGrant = serde_json::from_str(
			r#"{"access_token":"a-1","expires_in":900,"user":{"id":"u-1"}}"#,
		)
		.expect("Grant without refresh_token should deserialize.");

		assert_eq!(grant.refresh_token, None);
		assert_eq!(grant.expires_in, 900);
		assert!(!format!("{grant:?}").contains("a-1"));
	}

	#[test]
	fn credentials_debug_hides_password() {
		let credentials = LoginCredentials::new("lp@fund.example", "hunter2");
		let rendered = format!("{credentials:?}");

		assert!(rendered.contains("lp@fund.example"));
		assert!(!rendered.contains("hunter2"));
	}
}
