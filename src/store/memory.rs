//! Thread-safe in-memory [`CredentialStore`] for tests, demos, and ephemeral sessions.

// self
use crate::{
	_prelude::*,
	auth::{Credential, CredentialKind},
	store::{CredentialStore, StoreError, StoredCredentials, StoreFuture},
};

type Slots = Arc<RwLock<StoredCredentials>>;

/// Storage backend that keeps both credentials in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Slots);
impl MemoryStore {
	/// Creates a store pre-populated with the provided credentials.
	pub fn seeded(access: Option<Credential>, renewal: Option<Credential>) -> Self {
		Self(Arc::new(RwLock::new(StoredCredentials { access, renewal })))
	}

	/// Copies the current contents without going through the async contract.
	pub fn snapshot(&self) -> StoredCredentials {
		self.0.read().clone()
	}

	fn read_now(slots: Slots, kind: CredentialKind) -> Option<Credential> {
		slots.read().get(kind).cloned()
	}

	fn save_now(
		slots: Slots,
		kind: CredentialKind,
		credential: Credential,
	) -> Result<(), StoreError> {
		slots.write().set(kind, credential);

		Ok(())
	}
}
impl CredentialStore for MemoryStore {
	fn get_access(&self) -> StoreFuture<'_, Option<Credential>> {
		let slots = self.0.clone();

		Box::pin(async move { Ok(Self::read_now(slots, CredentialKind::Access)) })
	}

	fn save_access(&self, credential: Credential) -> StoreFuture<'_, ()> {
		let slots = self.0.clone();

		Box::pin(async move { Self::save_now(slots, CredentialKind::Access, credential) })
	}

	fn get_renewal(&self) -> StoreFuture<'_, Option<Credential>> {
		let slots = self.0.clone();

		Box::pin(async move { Ok(Self::read_now(slots, CredentialKind::Renewal)) })
	}

	fn save_renewal(&self, credential: Credential) -> StoreFuture<'_, ()> {
		let slots = self.0.clone();

		Box::pin(async move { Self::save_now(slots, CredentialKind::Renewal, credential) })
	}

	fn delete_all(&self) -> StoreFuture<'_, ()> {
		let slots = self.0.clone();

		Box::pin(async move {
			*slots.write() = StoredCredentials::default();

			Ok(())
		})
	}
}
