//! Request pipeline: attach the access credential, dispatch, and replay once after renewal.
//!
//! Every call runs the registered [`RequestStage`]s, attaches the stored access credential, and
//! dispatches through the transport. A response whose status the [`AuthFailurePolicy`] classifies
//! as an authentication failure is recovered at most once:
//!
//! - if the store holds no access credential, the session is gone and the failure is returned;
//! - if another call already rotated the stored credential and no renewal is running, the call is
//!   replayed with the stored credential;
//! - otherwise the call joins (or leads) the single-flight renewal and replays with its result.
//!
//! A second authentication failure on the same call is returned as
//! [`Error::AuthenticationFailure`].
//!
//! [`AuthFailurePolicy`]: crate::config::AuthFailurePolicy

pub mod stage;

pub use stage::*;

// self
use crate::{
	_prelude::*,
	auth::Credential,
	client::{ApiClient, SessionEnd},
	http::{ApiRequest, ApiResponse, ApiTransport},
	obs::{self, OpKind, debug_event},
};

/// Outbound call captured so it can be replayed after renewal.
#[derive(Clone, Debug)]
pub struct PendingRequest {
	request: ApiRequest,
	retried: bool,
}
impl PendingRequest {
	/// Captures a prepared request that has not been replayed yet.
	pub fn new(request: ApiRequest) -> Self {
		Self { request, retried: false }
	}

	/// Request as it will be dispatched next.
	pub fn request(&self) -> &ApiRequest {
		&self.request
	}

	/// Returns `true` once the request has used its single replay.
	pub fn is_retried(&self) -> bool {
		self.retried
	}

	fn replay_with(&mut self, credential: Credential) {
		self.retried = true;
		self.request.bearer = Some(credential);
	}
}

impl<T> ApiClient<T>
where
	T: ?Sized + ApiTransport,
{
	/// Dispatches `request` with the current access credential.
	///
	/// Non-authentication statuses, including other 4xx/5xx answers, resolve as `Ok`.
	pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
		obs::observe(OpKind::Request, "send", self.send_now(request)).await
	}

	/// Dispatches `request` and decodes a 2xx JSON body; other statuses become [`Error::Api`].
	pub async fn send_json<R>(&self, request: ApiRequest) -> Result<R>
	where
		R: DeserializeOwned,
	{
		let response = self.send(request).await?;

		if !response.is_success() {
			return Err(Error::Api { status: response.status, message: response.message() });
		}

		Ok(response.json_body()?)
	}

	async fn send_now(&self, request: ApiRequest) -> Result<ApiResponse> {
		let mut request = request;

		for stage in &self.stages {
			request = stage.prepare(request)?;
		}

		request.bearer = self.outbound_credential().await?;

		let mut pending = PendingRequest::new(request);

		loop {
			let response = self.transport.execute(pending.request().clone()).await?;

			if !self.config.auth_failure.is_auth_failure(response.status) {
				return Ok(response);
			}
			if pending.is_retried() {
				debug_event!(status = response.status, "Replayed request was rejected again.");

				return Err(authentication_failure(&response));
			}

			let credential = self.recover(&pending, &response).await?;

			pending.replay_with(credential);
		}
	}

	async fn outbound_credential(&self) -> Result<Option<Credential>> {
		let access = self.store.get_access().await?.filter(|credential| !credential.is_blank());

		match access {
			Some(credential)
				if self.config.proactive_renewal
					&& self.oracle.is_known_expired_at(&credential, OffsetDateTime::now_utc()) =>
				self.renew().await.map(Some),
			access => Ok(access),
		}
	}

	async fn recover(
		&self,
		pending: &PendingRequest,
		response: &ApiResponse,
	) -> Result<Credential> {
		let carried = pending.request().bearer.as_ref();
		let stored = self.store.get_access().await?.filter(|credential| !credential.is_blank());

		match (carried, stored) {
			// The session was cleared (logout or a failed renewal) or never existed.
			(_, None) => Err(authentication_failure(response)),
			(carried, Some(stored))
				if carried != Some(&stored) && !self.coordinator.is_renewing() =>
			{
				debug_event!(
					credential = %stored.fingerprint(),
					"Replaying with an access credential rotated by another request."
				);

				Ok(stored)
			},
			_ => self.renew().await,
		}
	}

	pub(crate) async fn renew(&self) -> Result<Credential> {
		match self.coordinator.ensure_fresh_credential().await {
			Ok(credential) => Ok(credential),
			Err(e) => {
				if e.ends_session() {
					self.end_session(SessionEnd::RenewalFailed);
				}

				Err(Error::RenewalFailed(e))
			},
		}
	}
}

fn authentication_failure(response: &ApiResponse) -> Error {
	Error::AuthenticationFailure { status: response.status, message: response.message() }
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;
	use crate::{
		config::{AuthFailurePolicy, ClientConfig},
		http::TransportFuture,
		renewal::RenewalError,
		store::{CredentialStore, MemoryStore},
	};

	/// Accepts exactly one access credential on `/review`; `/auth/refresh` hands out `renewed`.
	struct FakeRemote {
		valid: String,
		renewed: String,
		refresh_status: u16,
		rejection_status: u16,
		refresh_calls: AtomicUsize,
		api_calls: AtomicUsize,
		seen: Mutex<Vec<ApiRequest>>,
	}
	impl FakeRemote {
		fn new(valid: &str, renewed: &str) -> Self {
			Self {
				valid: valid.into(),
				renewed: renewed.into(),
				refresh_status: 200,
				rejection_status: 401,
				refresh_calls: AtomicUsize::new(0),
				api_calls: AtomicUsize::new(0),
				seen: Mutex::new(Vec::new()),
			}
		}
	}
	impl ApiTransport for FakeRemote {
		fn execute(&self, request: ApiRequest) -> TransportFuture<'_> {
			Box::pin(async move {
				self.seen.lock().push(request.clone());

				let bearer = request.bearer.as_ref().map(|credential| credential.expose().to_owned());

				if request.path == "/auth/refresh" {
					self.refresh_calls.fetch_add(1, Ordering::SeqCst);

					tokio::time::sleep(std::time::Duration::from_millis(20)).await;

					if self.refresh_status != 200 {
						return Ok(ApiResponse::json(
							self.refresh_status,
							&serde_json::json!({ "msg": "Token has been revoked" }),
						));
					}

					return Ok(ApiResponse::json(200, &serde_json::json!({ "token": self.renewed })));
				}

				self.api_calls.fetch_add(1, Ordering::SeqCst);

				if bearer.as_deref() == Some(self.valid.as_str()) {
					Ok(ApiResponse::json(200, &serde_json::json!({ "ok": true })))
				} else {
					Ok(ApiResponse::json(
						self.rejection_status,
						&serde_json::json!({ "msg": "Token has expired" }),
					))
				}
			})
		}
	}

	fn config() -> ClientConfig {
		ClientConfig::builder(Url::parse("http://127.0.0.1:5000/").expect("Fixture URL should parse."))
			.build()
			.expect("Fixture configuration should validate.")
	}

	fn fixture(remote: FakeRemote, store: &MemoryStore) -> (ApiClient<FakeRemote>, Arc<FakeRemote>) {
		let remote = Arc::new(remote);
		let store: Arc<dyn CredentialStore> = Arc::new(store.clone());

		(ApiClient::with_transport(config(), store, remote.clone()), remote)
	}

	fn seeded(access: &str) -> MemoryStore {
		MemoryStore::seeded(Some(Credential::new(access)), Some(Credential::new("R1")))
	}

	#[tokio::test]
	async fn valid_credential_is_attached() {
		let store = seeded("A1");
		let (client, remote) = fixture(FakeRemote::new("A1", "A2"), &store);
		let response = client.send(ApiRequest::get("/review")).await.expect("Request should succeed.");

		assert_eq!(response.status, 200);
		assert_eq!(remote.refresh_calls.load(Ordering::SeqCst), 0);
		assert_eq!(remote.seen.lock()[0].bearer, Some(Credential::new("A1")));
	}

	#[tokio::test]
	async fn rejected_credential_is_renewed_and_replayed_once() {
		let store = seeded("A1");
		let (client, remote) = fixture(FakeRemote::new("A2", "A2"), &store);
		let body: serde_json::Value = client
			.send_json(ApiRequest::get("/review"))
			.await
			.expect("Replay should succeed after renewal.");

		assert_eq!(body, serde_json::json!({ "ok": true }));
		assert_eq!(remote.refresh_calls.load(Ordering::SeqCst), 1);
		assert_eq!(remote.api_calls.load(Ordering::SeqCst), 2);
		assert_eq!(store.snapshot().access, Some(Credential::new("A2")));
	}

	#[tokio::test]
	async fn second_rejection_is_not_renewed_again() {
		let store = seeded("A1");
		let (client, remote) = fixture(FakeRemote::new("never-valid", "A2"), &store);
		let err = client
			.send(ApiRequest::get("/review"))
			.await
			.expect_err("A replay that fails authentication should not be retried.");

		assert!(matches!(
			err,
			Error::AuthenticationFailure { status: 401, message: Some(ref message) }
				if message == "Token has expired"
		));
		assert_eq!(remote.refresh_calls.load(Ordering::SeqCst), 1);
		assert_eq!(remote.api_calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn missing_session_propagates_original_failure() {
		let store = MemoryStore::default();
		let (client, remote) = fixture(FakeRemote::new("A1", "A2"), &store);
		let err = client
			.send(ApiRequest::get("/review"))
			.await
			.expect_err("Requests without a session should fail.");

		assert!(matches!(err, Error::AuthenticationFailure { status: 401, .. }));
		assert_eq!(remote.refresh_calls.load(Ordering::SeqCst), 0);
		assert!(remote.seen.lock()[0].bearer.is_none());
	}

	#[tokio::test]
	async fn rotated_credential_skips_renewal() {
		let store = seeded("A1");
		let (client, remote) = fixture(FakeRemote::new("A2", "A3"), &store);
		let stale = ApiRequest::get("/review").with_bearer(Credential::new("A1"));
		let mut pending = PendingRequest::new(stale);

		store.save_access(Credential::new("A2")).await.expect("Store write should succeed.");

		let rejection = ApiResponse::json(401, &serde_json::json!({}));
		let credential =
			client.recover(&pending, &rejection).await.expect("Recovery should succeed.");

		assert_eq!(credential, Credential::new("A2"));
		assert_eq!(remote.refresh_calls.load(Ordering::SeqCst), 0);

		pending.replay_with(credential);

		assert!(pending.is_retried());
	}

	#[tokio::test]
	async fn cleared_session_is_not_renewed_again() {
		let store = seeded("A1");
		let (client, remote) = fixture(FakeRemote::new("A2", "A2"), &store);
		let pending = PendingRequest::new(ApiRequest::get("/review").with_bearer(Credential::new("A1")));

		store.delete_all().await.expect("Clearing the store should succeed.");

		let rejection = ApiResponse::json(401, &serde_json::json!({ "msg": "Token has expired" }));
		let err = client
			.recover(&pending, &rejection)
			.await
			.expect_err("Recovery without a stored session should fail.");

		assert!(matches!(err, Error::AuthenticationFailure { status: 401, .. }));
		assert_eq!(remote.refresh_calls.load(Ordering::SeqCst), 0);
		assert_eq!(client.renewal_metrics().attempts(), 0);
	}

	#[tokio::test]
	async fn renewal_failure_clears_session_for_every_caller() {
		let store = seeded("A1");
		let mut remote = FakeRemote::new("A2", "A2");

		remote.refresh_status = 401;

		let (client, remote) = fixture(remote, &store);
		let outcomes = futures::future::join_all(
			(0..5).map(|_| client.send(ApiRequest::get("/review"))),
		)
		.await;

		assert_eq!(remote.refresh_calls.load(Ordering::SeqCst), 1);
		assert!(outcomes.iter().all(|outcome| matches!(
			outcome,
			Err(Error::RenewalFailed(RenewalError::Rejected { status: 401, .. }))
		)));
		assert!(store.snapshot().is_empty());
	}

	#[tokio::test]
	async fn policy_controls_which_statuses_renew() {
		let store = seeded("A1");
		let mut remote = FakeRemote::new("A2", "A2");

		remote.rejection_status = 422;

		let (client, remote) = fixture(remote, &store);

		client.send(ApiRequest::get("/review")).await.expect("422 should renew by default.");

		assert_eq!(remote.refresh_calls.load(Ordering::SeqCst), 1);

		let store = seeded("A1");
		let mut remote = FakeRemote::new("A2", "A2");

		remote.rejection_status = 422;

		let remote = Arc::new(remote);
		let config = ClientConfig::builder(config().base_url)
			.auth_failure(AuthFailurePolicy::strict())
			.build()
			.expect("Strict configuration should validate.");
		let client: ApiClient<FakeRemote> =
			ApiClient::with_transport(config, Arc::new(store), remote.clone());
		let response = client.send(ApiRequest::get("/review")).await.expect("Send should resolve.");

		assert_eq!(response.status, 422);
		assert_eq!(remote.refresh_calls.load(Ordering::SeqCst), 0);
	}

	#[cfg(feature = "reqwest")]
	#[tokio::test]
	async fn proactive_renewal_replaces_expired_credential_before_dispatch() {
		let expired = crate::_preludet::expired_jwt("1");
		let store = seeded(&expired);
		let remote = Arc::new(FakeRemote::new("A2", "A2"));
		let config = ClientConfig::builder(config().base_url)
			.proactive_renewal(true)
			.build()
			.expect("Proactive configuration should validate.");
		let client: ApiClient<FakeRemote> =
			ApiClient::with_transport(config, Arc::new(store.clone()), remote.clone());

		client.send(ApiRequest::get("/review")).await.expect("Request should succeed.");

		assert_eq!(remote.refresh_calls.load(Ordering::SeqCst), 1);
		assert_eq!(remote.api_calls.load(Ordering::SeqCst), 1);
		assert_eq!(store.snapshot().access, Some(Credential::new("A2")));
	}

	#[tokio::test]
	async fn stages_run_before_bearer_attachment() {
		let store = seeded("A1");
		let (client, remote) = fixture(FakeRemote::new("A1", "A2"), &store);
		let client = client.with_stage(StaticHeaders::new().with("x-client", "desktop")).with_stage(
			|request: ApiRequest| -> Result<ApiRequest> {
				Ok(request.with_bearer(Credential::new("ignored")))
			},
		);

		client.send(ApiRequest::get("/review")).await.expect("Request should succeed.");

		let seen = remote.seen.lock();

		assert_eq!(seen[0].headers.get("x-client").map(String::as_str), Some("desktop"));
		assert_eq!(seen[0].bearer, Some(Credential::new("A1")));
	}
}
