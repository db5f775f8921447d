//! Expiry oracle that reads the `exp` claim embedded in JWT-shaped credentials.
//!
//! Signatures are never verified; the remote remains the authority on validity. The oracle only
//! decides whether a credential is worth presenting, and every decode problem resolves toward
//! "not usable" so an unreadable credential is never trusted.

// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::{_prelude::*, auth::Credential};

/// Reasons a credential's expiry claim could not be read.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ClaimsError {
	/// Token does not have the `header.payload.signature` shape.
	#[error("Credential is not a three-segment token.")]
	Malformed,
	/// Payload segment is not valid base64url.
	#[error("Credential payload is not valid base64url.")]
	Encoding,
	/// Payload is not a JSON object.
	#[error("Credential payload is not a JSON object.")]
	Payload,
	/// Payload has no numeric `exp` claim.
	#[error("Credential payload has no usable exp claim.")]
	MissingExpiry,
}

#[derive(Deserialize)]
struct ExpiryClaims {
	exp: Option<f64>,
}

/// Answers whether a credential is still usable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExpiryOracle {
	leeway: Duration,
}
impl ExpiryOracle {
	/// Creates an oracle that treats credentials as expired `leeway` before their claim says.
	pub fn new(leeway: Duration) -> Self {
		Self { leeway: if leeway.is_negative() { Duration::ZERO } else { leeway } }
	}

	/// Configured leeway.
	pub fn leeway(&self) -> Duration {
		self.leeway
	}

	/// Decodes the expiry instant embedded in the credential.
	pub fn expires_at(credential: &Credential) -> Result<OffsetDateTime, ClaimsError> {
		let mut segments = credential.expose().split('.');
		let (Some(_header), Some(payload), Some(_signature), None) =
			(segments.next(), segments.next(), segments.next(), segments.next())
		else {
			return Err(ClaimsError::Malformed);
		};
		let bytes = URL_SAFE_NO_PAD
			.decode(payload.trim_end_matches('='))
			.map_err(|_| ClaimsError::Encoding)?;
		let claims: ExpiryClaims =
			serde_json::from_slice(&bytes).map_err(|_| ClaimsError::Payload)?;
		let exp = claims.exp.filter(|exp| exp.is_finite()).ok_or(ClaimsError::MissingExpiry)?;

		OffsetDateTime::from_unix_timestamp(exp.floor() as i64)
			.map_err(|_| ClaimsError::MissingExpiry)
	}

	/// Returns `true` when the credential is present and unexpired right now.
	pub fn is_usable(&self, credential: Option<&Credential>) -> bool {
		self.is_usable_at(credential, OffsetDateTime::now_utc())
	}

	/// Returns `true` when the credential is present and unexpired at `now`.
	pub fn is_usable_at(&self, credential: Option<&Credential>, now: OffsetDateTime) -> bool {
		let Some(credential) = credential else {
			return false;
		};

		match Self::expires_at(credential) {
			Ok(expires_at) => self.deadline(expires_at).is_some_and(|deadline| deadline > now),
			Err(_) => false,
		}
	}

	/// Returns `true` only when the claim decodes and lies in the past at `now`.
	///
	/// Opaque credentials answer `false`, which keeps proactive renewal from firing on tokens
	/// the oracle cannot read. A claim too early to subtract the leeway from counts as expired.
	pub fn is_known_expired_at(&self, credential: &Credential, now: OffsetDateTime) -> bool {
		Self::expires_at(credential)
			.map(|expires_at| self.deadline(expires_at).is_none_or(|deadline| deadline <= now))
			.unwrap_or(false)
	}

	fn deadline(&self, expires_at: OffsetDateTime) -> Option<OffsetDateTime> {
		expires_at.checked_sub(self.leeway)
	}
}
