//! Single-flight renewal of the access credential.
//!
//! [`RenewalCoordinator::ensure_fresh_credential`] lets many concurrent callers ask for a fresh
//! access credential while at most one renewal exchange is in flight. The first caller leads the
//! exchange; everyone who arrives while it runs parks on a oneshot channel and receives the exact
//! outcome the leader observed. Outcomes are persisted (success) or the stored session is cleared
//! (failure) before any waiter is woken, so a woken waiter always reads a consistent store.
//!
//! Login and logout start a new session generation through [`RenewalCoordinator::supersede`]. A
//! cycle that began under an older generation touches nothing in the store and settles as
//! [`RenewalError::Superseded`].

mod metrics;

pub use metrics::RenewalMetrics;

// crates.io
use futures::channel::oneshot;
// self
use crate::{
	_prelude::*,
	auth::Credential,
	http::{ApiRequest, ApiTransport},
	obs::{self, OpKind, debug_event, warn_event},
	store::{CredentialStore, StoreError},
};

type RenewalOutcome = Result<Credential, RenewalError>;

/// Why a renewal cycle failed.
///
/// Every caller that joined the cycle receives a clone of the same value.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum RenewalError {
	/// The store holds no renewal credential.
	#[error("No renewal credential is stored.")]
	NoRenewalCredential,
	/// The renewal endpoint answered with a non-success status.
	#[error("Renewal endpoint rejected the renewal credential with status {status}.")]
	Rejected {
		/// HTTP status returned by the remote.
		status: u16,
		/// Remote-supplied message, when present.
		message: Option<String>,
	},
	/// The renewal endpoint could not be reached.
	#[error("Renewal endpoint could not be reached: {message}")]
	Network {
		/// Transport failure, flattened with its sources.
		message: String,
	},
	/// The renewal endpoint answered 2xx without a usable access credential.
	#[error("Renewal endpoint returned an unusable response: {message}")]
	Malformed {
		/// Decode failure description.
		message: String,
	},
	/// The store failed while reading or persisting credentials.
	#[error("Credential store failed during renewal: {message}")]
	Storage {
		/// Store failure description.
		message: String,
	},
	/// The leading caller was dropped before the exchange completed.
	#[error("Renewal was abandoned before it completed.")]
	Abandoned,
	/// A login or logout replaced the session while the exchange was in flight.
	#[error("Renewal was discarded because the session changed.")]
	Superseded,
}
impl RenewalError {
	/// Returns `true` when the failure tore down the stored session.
	///
	/// Abandoned and superseded cycles never reached a verdict for the current session, so the
	/// stored credentials are left alone.
	pub fn ends_session(&self) -> bool {
		!matches!(self, Self::Abandoned | Self::Superseded)
	}
}
impl From<StoreError> for RenewalError {
	fn from(e: StoreError) -> Self {
		Self::Storage { message: e.to_string() }
	}
}

#[derive(Debug, Deserialize)]
struct RenewalGrant {
	token: String,
	#[serde(default, alias = "refreshToken")]
	refresh_token: Option<String>,
}

#[derive(Debug, Default)]
struct RenewalState {
	in_flight: bool,
	waiters: VecDeque<oneshot::Sender<RenewalOutcome>>,
}

enum Ticket {
	Lead,
	Wait(oneshot::Receiver<RenewalOutcome>),
}

/// Clears the in-flight flag and wakes every waiter exactly once.
///
/// Dropping an unsettled lease (the leading future was cancelled) rejects the waiters with
/// [`RenewalError::Abandoned`] so nobody parks forever.
struct InFlightLease<'a> {
	state: &'a Mutex<RenewalState>,
	settled: bool,
}
impl InFlightLease<'_> {
	fn settle(mut self, outcome: &RenewalOutcome) {
		self.settled = true;

		broadcast(self.state, outcome);
	}
}
impl Drop for InFlightLease<'_> {
	fn drop(&mut self) {
		if !self.settled {
			broadcast(self.state, &Err(RenewalError::Abandoned));
		}
	}
}

fn broadcast(state: &Mutex<RenewalState>, outcome: &RenewalOutcome) {
	let waiters = {
		let mut state = state.lock();

		state.in_flight = false;

		std::mem::take(&mut state.waiters)
	};

	for waiter in waiters {
		// A waiter that was dropped no longer cares about the outcome.
		let _ = waiter.send(outcome.clone());
	}
}

/// Coordinates renewal exchanges for one session.
pub struct RenewalCoordinator<T>
where
	T: ?Sized + ApiTransport,
{
	transport: Arc<T>,
	store: Arc<dyn CredentialStore>,
	endpoint: String,
	metrics: Arc<RenewalMetrics>,
	state: Mutex<RenewalState>,
	generation: AsyncMutex<u64>,
}
impl<T> RenewalCoordinator<T>
where
	T: ?Sized + ApiTransport,
{
	/// Creates a coordinator that renews against `endpoint` (a path on the transport's base URL).
	pub fn new(
		transport: impl Into<Arc<T>>,
		store: Arc<dyn CredentialStore>,
		endpoint: impl Into<String>,
	) -> Self {
		Self {
			transport: transport.into(),
			store,
			endpoint: endpoint.into(),
			metrics: Default::default(),
			state: Default::default(),
			generation: Default::default(),
		}
	}

	/// Starts a new session generation and holds it until the returned guard drops.
	///
	/// Store writes made while the guard is held cannot interleave with a renewal persisting or
	/// clearing credentials, and any cycle already in flight settles as
	/// [`RenewalError::Superseded`].
	pub async fn supersede(&self) -> async_lock::MutexGuard<'_, u64> {
		let mut generation = self.generation.lock().await;

		*generation = generation.wrapping_add(1);

		generation
	}

	/// Returns `true` while a renewal exchange is in flight.
	pub fn is_renewing(&self) -> bool {
		self.state.lock().in_flight
	}

	/// Number of callers currently parked on the in-flight exchange.
	pub fn waiting(&self) -> usize {
		self.state.lock().waiters.len()
	}

	/// Counters for led, coalesced, and settled exchanges.
	pub fn metrics(&self) -> Arc<RenewalMetrics> {
		self.metrics.clone()
	}

	/// Resolves with a fresh access credential, starting an exchange only if none is in flight.
	///
	/// On failure both stored credentials are deleted before the error is returned to this
	/// caller or any waiter.
	pub async fn ensure_fresh_credential(&self) -> RenewalOutcome {
		let receiver = match self.enter() {
			Ticket::Lead => return self.lead().await,
			Ticket::Wait(receiver) => receiver,
		};

		self.metrics.record_coalesced();

		debug_event!("Joined an in-flight credential renewal.");

		// A cancelled sender means the lease was dropped without settling.
		receiver.await.unwrap_or(Err(RenewalError::Abandoned))
	}

	fn enter(&self) -> Ticket {
		let mut state = self.state.lock();

		if state.in_flight {
			let (sender, receiver) = oneshot::channel();

			state.waiters.push_back(sender);

			Ticket::Wait(receiver)
		} else {
			state.in_flight = true;

			Ticket::Lead
		}
	}

	async fn lead(&self) -> RenewalOutcome {
		let lease = InFlightLease { state: &self.state, settled: false };
		let generation = *self.generation.lock().await;

		self.metrics.record_attempt();

		let outcome =
			obs::observe(OpKind::Renewal, "ensure_fresh_credential", self.cycle(generation)).await;

		match &outcome {
			Ok(_) => self.metrics.record_success(),
			Err(_) => self.metrics.record_failure(),
		}

		lease.settle(&outcome);

		outcome
	}

	async fn cycle(&self, generation: u64) -> RenewalOutcome {
		let exchanged = self.exchange().await;
		let current = self.generation.lock().await;

		if *current != generation {
			debug_event!("Session changed during renewal; discarding the outcome.");

			return Err(RenewalError::Superseded);
		}

		let outcome = match exchanged {
			Ok((access, rotated)) => self.persist(access, rotated).await,
			Err(e) => Err(e),
		};

		if outcome.is_err() {
			warn_event!(
				error = ?outcome.as_ref().err(),
				"Credential renewal failed; clearing the stored session."
			);

			if self.store.delete_all().await.is_err() {
				warn_event!("Stored credentials could not be deleted after a failed renewal.");
			}
		}

		drop(current);

		outcome
	}

	async fn exchange(&self) -> Result<(Credential, Option<Credential>), RenewalError> {
		let renewal = self
			.store
			.get_renewal()
			.await?
			.filter(|credential| !credential.is_blank())
			.ok_or(RenewalError::NoRenewalCredential)?;
		let request = ApiRequest::post(self.endpoint.clone()).with_bearer(renewal);
		let response = self
			.transport
			.execute(request)
			.await
			.map_err(|e| RenewalError::Network { message: error_chain(&e) })?;

		if !response.is_success() {
			return Err(RenewalError::Rejected {
				status: response.status,
				message: response.message(),
			});
		}

		let grant: RenewalGrant = response
			.json_body()
			.map_err(|e| RenewalError::Malformed { message: error_chain(&e) })?;
		let access = Credential::new(grant.token);

		if access.is_blank() {
			return Err(RenewalError::Malformed { message: "Access credential is empty.".into() });
		}

		Ok((access, grant.refresh_token.map(Credential::new).filter(|c| !c.is_blank())))
	}

	async fn persist(&self, access: Credential, rotated: Option<Credential>) -> RenewalOutcome {
		self.store.save_access(access.clone()).await?;

		if let Some(rotated) = rotated {
			self.store.save_renewal(rotated).await?;
		}

		debug_event!(credential = %access.fingerprint(), "Access credential renewed.");

		Ok(access)
	}
}
impl<T> Debug for RenewalCoordinator<T>
where
	T: ?Sized + ApiTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.state.lock();

		f.debug_struct("RenewalCoordinator")
			.field("endpoint", &self.endpoint)
			.field("in_flight", &state.in_flight)
			.field("waiting", &state.waiters.len())
			.finish()
	}
}

fn error_chain(error: &dyn StdError) -> String {
	let mut message = error.to_string();
	let mut source = error.source();

	while let Some(cause) = source {
		message.push_str(": ");
		message.push_str(&cause.to_string());

		source = cause.source();
	}

	message
}
