//! Storage contract and built-in stores for session credentials.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{Credential, CredentialKind},
};

/// Boxed future returned by [`CredentialStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Secure storage for the access and renewal credential of one session.
///
/// Each operation completes or fails as a unit; implementations never expose a half-written
/// credential. Saving a credential replaces the previous value of the same kind.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Reads the stored access credential.
	fn get_access(&self) -> StoreFuture<'_, Option<Credential>>;

	/// Persists or replaces the access credential.
	fn save_access(&self, credential: Credential) -> StoreFuture<'_, ()>;

	/// Reads the stored renewal credential.
	fn get_renewal(&self) -> StoreFuture<'_, Option<Credential>>;

	/// Persists or replaces the renewal credential.
	fn save_renewal(&self, credential: Credential) -> StoreFuture<'_, ()>;

	/// Deletes both credentials.
	fn delete_all(&self) -> StoreFuture<'_, ()>;
}

/// Snapshot of both credential slots, shared by the built-in stores.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
	/// Access credential slot.
	#[serde(default)]
	pub access: Option<Credential>,
	/// Renewal credential slot.
	#[serde(default)]
	pub renewal: Option<Credential>,
}
impl StoredCredentials {
	/// Returns the slot for `kind`.
	pub fn get(&self, kind: CredentialKind) -> Option<&Credential> {
		match kind {
			CredentialKind::Access => self.access.as_ref(),
			CredentialKind::Renewal => self.renewal.as_ref(),
		}
	}

	/// Replaces the slot for `kind`.
	pub fn set(&mut self, kind: CredentialKind, credential: Credential) {
		match kind {
			CredentialKind::Access => self.access = Some(credential),
			CredentialKind::Renewal => self.renewal = Some(credential),
		}
	}

	/// Returns `true` when neither slot holds a credential.
	pub fn is_empty(&self) -> bool {
		self.access.is_none() && self.renewal.is_none()
	}
}

/// Error type produced by [`CredentialStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
