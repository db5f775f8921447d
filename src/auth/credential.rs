//! Redacted credential wrapper shared by the store, the coordinator, and the pipeline.

// crates.io
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

/// The two credential kinds persisted per session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CredentialKind {
	/// Short-lived credential attached to every API call.
	Access,
	/// Longer-lived credential used only to obtain a new access credential.
	Renewal,
}
impl CredentialKind {
	/// Returns a stable label suitable for span fields and store keys.
	pub const fn as_str(self) -> &'static str {
		match self {
			CredentialKind::Access => "access",
			CredentialKind::Renewal => "renewal",
		}
	}
}
impl Display for CredentialKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Opaque bearer credential that keeps the secret out of logs.
///
/// Formatting prints a short SHA-256 fingerprint instead of the token so rotations can be
/// correlated in traces without leaking material.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);
impl Credential {
	const FINGERPRINT_BYTES: usize = 4;

	/// Wraps a new credential string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Returns `true` when the wrapped token is empty or whitespace.
	pub fn is_blank(&self) -> bool {
		self.0.trim().is_empty()
	}

	/// Value for an `Authorization` header.
	pub fn bearer_header(&self) -> String {
		format!("Bearer {}", self.0)
	}

	/// Short hex digest of the token, safe to log.
	pub fn fingerprint(&self) -> String {
		let digest = Sha256::digest(self.0.as_bytes());

		digest[..Self::FINGERPRINT_BYTES].iter().map(|byte| format!("{byte:02x}")).collect()
	}
}
impl From<String> for Credential {
	fn from(value: String) -> Self {
		Self(value)
	}
}
impl From<&str> for Credential {
	fn from(value: &str) -> Self {
		Self(value.to_owned())
	}
}
impl AsRef<str> for Credential {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("Credential").field(&format_args!("sha256:{}", self.fingerprint())).finish()
	}
}
impl Display for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "<redacted sha256:{}>", self.fingerprint())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn formatters_redact_secret() {
		let credential = Credential::new("super-secret");
		let debug = format!("{credential:?}");
		let display = format!("{credential}");

		assert!(!debug.contains("super-secret"));
		assert!(!display.contains("super-secret"));
		assert!(debug.starts_with("Credential(sha256:"));
		assert_eq!(credential.fingerprint().len(), 8);
	}

	#[test]
	fn fingerprint_tracks_rotation() {
		let first = Credential::new("A1");
		let second = Credential::new("A2");

		assert_eq!(first.fingerprint(), Credential::new("A1").fingerprint());
		assert_ne!(first.fingerprint(), second.fingerprint());
		assert_eq!(second.bearer_header(), "Bearer A2");
	}

	#[test]
	fn serializes_as_plain_string() {
		let payload = serde_json::to_string(&Credential::new("R1"))
			.expect("Credential should serialize to JSON.");

		assert_eq!(payload, "\"R1\"");
		assert!(Credential::new("  ").is_blank());
	}
}
