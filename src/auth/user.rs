//! Identity types returned by the remote's login and register endpoints.

// std
use std::ops::Deref;
// self
use crate::_prelude::*;

/// Remote-assigned user identifier.
///
/// The remote emits numeric database ids while other deployments emit strings; both decode to
/// the same textual form.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "String")]
pub struct UserId(String);
impl UserId {
	/// Wraps an identifier string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}
}
impl Deref for UserId {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl AsRef<str> for UserId {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl From<UserId> for String {
	fn from(value: UserId) -> Self {
		value.0
	}
}
impl TryFrom<serde_json::Value> for UserId {
	type Error = UserIdError;

	fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
		match value {
			serde_json::Value::Number(number) if number.is_u64() || number.is_i64() =>
				Ok(Self(number.to_string())),
			serde_json::Value::String(text) if text.trim().is_empty() => Err(UserIdError::Empty),
			serde_json::Value::String(text) => Ok(Self(text)),
			_ => Err(UserIdError::Unsupported),
		}
	}
}
impl Debug for UserId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "UserId({})", self.0)
	}
}
impl Display for UserId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Error returned when a user identifier cannot be decoded.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum UserIdError {
	/// The identifier was empty or whitespace.
	#[error("User identifier cannot be empty.")]
	Empty,
	/// The identifier was neither an integer nor a string.
	#[error("User identifier must be an integer or a string.")]
	Unsupported,
}

/// Profile of the authenticated user, as returned by login.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
	/// Remote-assigned identifier.
	pub id: UserId,
	/// Display name (the login username).
	#[serde(alias = "username")]
	pub name: String,
}

/// Account summary returned by registration; fields vary between deployments.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredUser {
	/// Remote-assigned identifier, when echoed back.
	#[serde(default)]
	pub id: Option<UserId>,
	/// Registered username.
	#[serde(default, alias = "username")]
	pub name: Option<String>,
}
