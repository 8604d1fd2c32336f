//! Signed-in user record returned by the Auth Service and persisted with the session.

// crates.io
use serde_json::{Map, Value};
// self
use crate::_prelude::*;

/// User identity attached to a session.
///
/// Unknown fields are kept in [`UserIdentity::extra`] so a record written by a newer backend
/// round-trips through the store untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
	/// Backend user identifier; numeric identifiers are normalized to strings.
	#[serde(deserialize_with = "string_or_number")]
	pub id: String,
	/// Sign-in email, if the backend exposes it.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
	/// Display name, if the backend exposes it.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	/// Remaining fields, preserved as-is.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}
impl UserIdentity {
	/// Creates an identity with only the identifier populated.
	pub fn new(id: impl Into<String>) -> Self {
		Self { id: id.into(), email: None, name: None, extra: Map::new() }
	}

	/// Sets the sign-in email.
	pub fn with_email(mut self, email: impl Into<String>) -> Self {
		self.email = Some(email.into());

		self
	}

	/// Sets the display name.
	pub fn with_name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());

		self
	}
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
	D: serde::Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Raw {
		Text(String),
		Number(serde_json::Number),
	}

	Ok(match Raw::deserialize(deserializer)? {
		Raw::Text(text) => text,
		Raw::Number(number) => number.to_string(),
	})
}
