//! File-backed [`CredentialStore`] that survives process restarts.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::{Credential, CredentialKind},
	store::{CredentialStore, StoreError, StoreFuture, StoredCredentials},
};

/// Persists both credentials to a JSON file after each mutation.
///
/// Writes go to a sibling temporary file that is synced and renamed over the snapshot, so a
/// crash never leaves a partially written credential behind.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<StoredCredentials>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Location of the snapshot file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<StoredCredentials, StoreError> {
		if !path.exists() {
			return Ok(StoredCredentials::default());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() {
			return Ok(StoredCredentials::default());
		}

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, contents: &StoredCredentials) -> Result<(), StoreError> {
		if contents.is_empty() {
			return match fs::remove_file(&self.path) {
				Ok(()) => Ok(()),
				Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
				Err(e) => Err(StoreError::Backend {
					message: format!("Failed to remove {}: {e}", self.path.display()),
				}),
			};
		}

		Self::ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(contents).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize credential snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}

	fn save_kind(&self, kind: CredentialKind, credential: Credential) -> Result<(), StoreError> {
		let mut guard = self.inner.write();
		let mut next = guard.clone();

		next.set(kind, credential);
		self.persist_locked(&next)?;
		*guard = next;

		Ok(())
	}
}
impl CredentialStore for FileStore {
	fn get_access(&self) -> StoreFuture<'_, Option<Credential>> {
		Box::pin(async move { Ok(self.inner.read().access.clone()) })
	}

	fn save_access(&self, credential: Credential) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.save_kind(CredentialKind::Access, credential) })
	}

	fn get_renewal(&self) -> StoreFuture<'_, Option<Credential>> {
		Box::pin(async move { Ok(self.inner.read().renewal.clone()) })
	}

	fn save_renewal(&self, credential: Credential) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.save_kind(CredentialKind::Renewal, credential) })
	}

	fn delete_all(&self) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();
			let empty = StoredCredentials::default();

			self.persist_locked(&empty)?;
			*guard = empty;

			Ok(())
		})
	}
}
