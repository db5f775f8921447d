//! Client-side session broker for desktop apps talking to JWT-protected APIs.
//!
//! The crate keeps one access credential fresh across concurrent requests: a single-flight
//! [`renewal::RenewalCoordinator`], a replay-once request pipeline on [`client::ApiClient`], and
//! pluggable [`store::CredentialStore`] backends.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod obs;
pub mod renewal;
pub mod store;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// crates.io
	use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
	// self
	use crate::{
		client::ApiClient,
		config::ClientConfig,
		http::ReqwestTransport,
		store::{CredentialStore, MemoryStore},
	};

	/// Client type alias used by reqwest-backed integration tests.
	pub type ReqwestTestClient = ApiClient<ReqwestTransport>;

	/// Builds a JWT-shaped token whose payload carries the provided `exp` claim.
	///
	/// The signature segment is a fixed placeholder; the broker never verifies signatures.
	pub fn mint_jwt(subject: &str, expires_at: OffsetDateTime) -> String {
		let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
		let claims = serde_json::json!({
			"sub": subject,
			"exp": expires_at.unix_timestamp(),
		});
		let payload = URL_SAFE_NO_PAD.encode(claims.to_string());

		format!("{header}.{payload}.c2lnbmF0dXJl")
	}

	/// Mints a token that stays valid for the next hour.
	pub fn fresh_jwt(subject: &str) -> String {
		mint_jwt(subject, OffsetDateTime::now_utc() + Duration::hours(1))
	}

	/// Mints a token that expired an hour ago.
	pub fn expired_jwt(subject: &str) -> String {
		mint_jwt(subject, OffsetDateTime::now_utc() - Duration::hours(1))
	}

	/// Builds a configuration pointing at the provided mock server base URL.
	pub fn test_config(base_url: &str) -> ClientConfig {
		let base_url = Url::parse(base_url).expect("Mock server base URL should parse.");

		ClientConfig::builder(base_url).build().expect("Test configuration should be valid.")
	}

	/// Builds a reqwest transport that trusts the mock server's self-signed certificate.
	pub fn test_reqwest_transport(config: &ClientConfig) -> ReqwestTransport {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestTransport::with_client(client, config.base_url.clone())
	}

	/// Constructs an [`ApiClient`] backed by an in-memory store and the reqwest transport used
	/// across integration tests.
	pub fn build_reqwest_test_client(
		config: ClientConfig,
	) -> (ReqwestTestClient, Arc<MemoryStore>) {
		let store_backend = Arc::new(MemoryStore::default());
		let store: Arc<dyn CredentialStore> = store_backend.clone();
		let transport = test_reqwest_transport(&config);
		let client = ApiClient::with_transport(config, store, transport);

		(client, store_backend)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, BTreeSet, VecDeque},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize, de::DeserializeOwned};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
