//! API client that owns the transport, credential store, renewal coordinator, and session state
//! for one remote.

pub mod pipeline;
pub mod session;

pub use pipeline::*;
pub use session::*;

// self
use crate::{
	_prelude::*,
	auth::ExpiryOracle,
	config::ClientConfig,
	http::ApiTransport,
	renewal::{RenewalCoordinator, RenewalMetrics},
	store::CredentialStore,
};
#[cfg(feature = "reqwest")] use crate::{error::ConfigError, http::ReqwestTransport};

#[cfg(feature = "reqwest")]
/// Client specialized for the crate's default reqwest transport.
pub type ReqwestApiClient = ApiClient<ReqwestTransport>;

/// Coordinates every call against a single remote API.
///
/// One client owns exactly one renewal coordinator, so requests issued through clones of the same
/// client share a single-flight renewal while independent clients never observe each other.
/// Clones are cheap and share all state.
pub struct ApiClient<T>
where
	T: ?Sized + ApiTransport,
{
	config: ClientConfig,
	oracle: ExpiryOracle,
	transport: Arc<T>,
	store: Arc<dyn CredentialStore>,
	coordinator: Arc<RenewalCoordinator<T>>,
	stages: Vec<Arc<dyn RequestStage>>,
	events: Arc<dyn SessionEvents>,
	state: Arc<Mutex<SessionState>>,
	session_guard: Arc<AsyncMutex<()>>,
}
impl<T> ApiClient<T>
where
	T: ?Sized + ApiTransport,
{
	/// Creates a client that reuses the caller-provided transport.
	pub fn with_transport(
		config: ClientConfig,
		store: Arc<dyn CredentialStore>,
		transport: impl Into<Arc<T>>,
	) -> Self {
		let transport = transport.into();
		let coordinator = Arc::new(RenewalCoordinator::new(
			transport.clone(),
			store.clone(),
			config.endpoints.refresh.clone(),
		));

		Self {
			oracle: config.expiry_oracle(),
			config,
			transport,
			store,
			coordinator,
			stages: Vec::new(),
			events: Arc::new(NoopEvents),
			state: Default::default(),
			session_guard: Default::default(),
		}
	}

	/// Appends an outbound stage; stages run in registration order before the bearer is attached.
	pub fn with_stage(mut self, stage: impl 'static + RequestStage) -> Self {
		self.stages.push(Arc::new(stage));

		self
	}

	/// Replaces the sink notified when sessions start and end.
	pub fn with_events(mut self, events: Arc<dyn SessionEvents>) -> Self {
		self.events = events;

		self
	}

	/// Validated configuration this client was built with.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// Credential store shared by the pipeline and the coordinator.
	pub fn store(&self) -> &Arc<dyn CredentialStore> {
		&self.store
	}

	/// Renewal coordinator owned by this client.
	pub fn coordinator(&self) -> &RenewalCoordinator<T> {
		&self.coordinator
	}

	/// Renewal counters for this client.
	pub fn renewal_metrics(&self) -> Arc<RenewalMetrics> {
		self.coordinator.metrics()
	}
}
#[cfg(feature = "reqwest")]
impl ApiClient<ReqwestTransport> {
	/// Creates a client that provisions its own reqwest transport from `config`.
	pub fn new(config: ClientConfig, store: Arc<dyn CredentialStore>) -> Result<Self, ConfigError> {
		let transport = ReqwestTransport::from_config(&config)?;

		Ok(Self::with_transport(config, store, transport))
	}
}
impl<T> Clone for ApiClient<T>
where
	T: ?Sized + ApiTransport,
{
	fn clone(&self) -> Self {
		Self {
			config: self.config.clone(),
			oracle: self.oracle,
			transport: self.transport.clone(),
			store: self.store.clone(),
			coordinator: self.coordinator.clone(),
			stages: self.stages.clone(),
			events: self.events.clone(),
			state: self.state.clone(),
			session_guard: self.session_guard.clone(),
		}
	}
}
impl<T> Debug for ApiClient<T>
where
	T: ?Sized + ApiTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiClient")
			.field("base_url", &self.config.base_url.as_str())
			.field("state", &*self.state.lock())
			.field("stages", &self.stages.len())
			.field("coordinator", &self.coordinator)
			.finish()
	}
}
