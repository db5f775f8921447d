#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
// self
use session_broker::{
	_preludet::*,
	auth::Credential,
	client::{SessionEnd, SessionEvents, SessionResume, SessionState},
	error::Error,
	http::ApiRequest,
	renewal::RenewalError,
	store::CredentialStore,
};

const HISTORY: &str = "/review/history";

#[derive(Default)]
struct RecordingEvents {
	ended: Mutex<Vec<SessionEnd>>,
}
impl SessionEvents for RecordingEvents {
	fn session_ended(&self, reason: SessionEnd) {
		self.ended.lock().push(reason);
	}
}

async fn seed(store: &dyn CredentialStore, access: &str, renewal: &str) {
	store
		.save_access(Credential::new(access))
		.await
		.expect("Seeding the access credential should succeed.");
	store
		.save_renewal(Credential::new(renewal))
		.await
		.expect("Seeding the renewal credential should succeed.");
}

#[tokio::test]
async fn concurrent_rejections_share_one_renewal() {
	let server = MockServer::start_async().await;
	let (client, store) = build_reqwest_test_client(test_config(&server.base_url()));

	seed(store.as_ref(), "A1", "R1").await;

	let stale = server
		.mock_async(|when, then| {
			when.method(GET).path(HISTORY).header("authorization", "Bearer A1");
			then.status(401).json_body(serde_json::json!({ "msg": "Token has expired" }));
		})
		.await;
	let fresh = server
		.mock_async(|when, then| {
			when.method(GET).path(HISTORY).header("authorization", "Bearer A2");
			then.status(200).json_body(serde_json::json!({ "reviews": [] }));
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh").header("authorization", "Bearer R1");
			then.status(200)
				.json_body(serde_json::json!({ "token": "A2" }))
				.delay(std::time::Duration::from_millis(200));
		})
		.await;
	let outcomes =
		futures::future::join_all((0..5).map(|_| client.send(ApiRequest::get(HISTORY)))).await;

	for outcome in outcomes {
		let response = outcome.expect("Every request should succeed after renewal.");

		assert_eq!(response.status, 200);
	}

	refresh.assert_calls_async(1).await;
	stale.assert_calls_async(5).await;
	fresh.assert_calls_async(5).await;

	assert_eq!(store.snapshot().access, Some(Credential::new("A2")));
	assert_eq!(store.snapshot().renewal, Some(Credential::new("R1")));
	assert_eq!(client.renewal_metrics().attempts(), 1);
	assert!(!client.coordinator().is_renewing());
}

#[tokio::test]
async fn renewal_failure_fails_every_request_and_ends_session_once() {
	let server = MockServer::start_async().await;
	let events = Arc::new(RecordingEvents::default());
	let (client, store) = build_reqwest_test_client(test_config(&server.base_url()));
	let client = client.with_events(events.clone());
	let access = fresh_jwt("1");

	seed(store.as_ref(), &access, "R1").await;

	let _revoked = server
		.mock_async(|when, then| {
			when.method(GET).path(HISTORY);
			then.status(401).json_body(serde_json::json!({ "msg": "Token has been revoked" }));
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(401)
				.json_body(serde_json::json!({ "msg": "Token has been revoked" }))
				.delay(std::time::Duration::from_millis(300));
		})
		.await;

	assert!(client.resume().await.is_ok());
	assert!(client.state().is_authenticated());

	let outcomes =
		futures::future::join_all((0..4).map(|_| client.send(ApiRequest::get(HISTORY)))).await;

	for outcome in outcomes {
		let err = outcome.expect_err("Every request should fail once renewal fails.");

		assert!(matches!(err, Error::RenewalFailed(RenewalError::Rejected { status: 401, .. })));
		assert_eq!(err.user_message(), "Your session has expired. Please sign in again.");
	}

	refresh.assert_calls_async(1).await;

	assert!(store.snapshot().is_empty());
	assert!(!client.state().is_authenticated());
	assert_eq!(client.renewal_metrics().attempts(), 1);
	assert_eq!(events.ended.lock().as_slice(), &[SessionEnd::RenewalFailed]);
}

#[tokio::test]
async fn logout_during_renewal_stays_logged_out() {
	let server = MockServer::start_async().await;
	let events = Arc::new(RecordingEvents::default());
	let (client, store) = build_reqwest_test_client(test_config(&server.base_url()));
	let client = client.with_events(events.clone());

	seed(store.as_ref(), &fresh_jwt("1"), &fresh_jwt("1-renewal")).await;

	let _stale = server
		.mock_async(|when, then| {
			when.method(GET).path(HISTORY);
			then.status(401).json_body(serde_json::json!({ "msg": "Token has expired" }));
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(200)
				.json_body(serde_json::json!({ "token": fresh_jwt("1-renewed") }))
				.delay(std::time::Duration::from_millis(200));
		})
		.await;

	assert!(client.resume().await.is_ok());

	let (outcome, ()) = tokio::join!(client.send(ApiRequest::get(HISTORY)), async {
		while !client.coordinator().is_renewing() {
			tokio::time::sleep(std::time::Duration::from_millis(5)).await;
		}

		client.logout().await.expect("Logout should succeed during renewal.");
	});
	let err = outcome.expect_err("A request renewed across a logout should fail.");

	assert!(matches!(err, Error::RenewalFailed(RenewalError::Superseded)));
	assert_eq!(err.user_message(), "Something went wrong. Please try again.");
	assert!(store.snapshot().is_empty());
	assert_eq!(
		client.resume().await.expect("Resume should not fail after logout."),
		SessionResume::NoSession
	);
	assert_eq!(client.state(), SessionState::Absent);
	assert_eq!(events.ended.lock().as_slice(), &[SessionEnd::Logout]);

	refresh.assert_calls_async(1).await;
}

#[tokio::test]
async fn second_rejection_is_not_renewed_again() {
	let server = MockServer::start_async().await;
	let (client, store) = build_reqwest_test_client(test_config(&server.base_url()));

	seed(store.as_ref(), "A1", "R1").await;

	let rejected = server
		.mock_async(|when, then| {
			when.method(GET).path(HISTORY);
			then.status(401).json_body(serde_json::json!({ "msg": "Token has expired" }));
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(200).json_body(serde_json::json!({ "token": "A2" }));
		})
		.await;
	let err = client
		.send(ApiRequest::get(HISTORY))
		.await
		.expect_err("A replay rejected again should fail.");

	assert!(matches!(err, Error::AuthenticationFailure { status: 401, .. }));

	rejected.assert_calls_async(2).await;
	refresh.assert_calls_async(1).await;

	assert_eq!(store.snapshot().access, Some(Credential::new("A2")));
}

#[tokio::test]
async fn login_then_stale_credential_is_renewed_and_replayed() {
	let server = MockServer::start_async().await;
	let (client, store) = build_reqwest_test_client(test_config(&server.base_url()));
	let login = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/auth/login")
				.json_body(serde_json::json!({ "username": "alice", "password": "pw" }));
			then.status(200).json_body(serde_json::json!({
				"token": "A1",
				"refresh_token": "R1",
				"user": { "id": 1, "name": "alice" },
			}));
		})
		.await;
	let stale = server
		.mock_async(|when, then| {
			when.method(GET).path(HISTORY).header("authorization", "Bearer A1");
			then.status(401).json_body(serde_json::json!({ "msg": "Token has expired" }));
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh").header("authorization", "Bearer R1");
			then.status(200).json_body(serde_json::json!({ "token": "A2" }));
		})
		.await;
	let fresh = server
		.mock_async(|when, then| {
			when.method(GET).path(HISTORY).header("authorization", "Bearer A2");
			then.status(200).json_body(serde_json::json!({ "reviews": [{ "id": 7 }] }));
		})
		.await;
	let grant = client.login("alice", "pw").await.expect("Login should succeed.");

	assert_eq!(grant.user.map(|user| user.name), Some("alice".to_owned()));
	assert_eq!(store.snapshot().access, Some(Credential::new("A1")));
	assert_eq!(store.snapshot().renewal, Some(Credential::new("R1")));

	let body: serde_json::Value =
		client.send_json(ApiRequest::get(HISTORY)).await.expect("Replay should succeed.");

	assert_eq!(body["reviews"][0]["id"], 7);

	login.assert_calls_async(1).await;
	stale.assert_calls_async(1).await;
	refresh.assert_calls_async(1).await;
	fresh.assert_calls_async(1).await;

	assert_eq!(store.snapshot().access, Some(Credential::new("A2")));
	assert_eq!(store.snapshot().renewal, Some(Credential::new("R1")));
}

#[tokio::test]
async fn other_statuses_pass_through_without_renewal() {
	let server = MockServer::start_async().await;
	let (client, store) = build_reqwest_test_client(test_config(&server.base_url()));

	seed(store.as_ref(), "A1", "R1").await;

	let _broken = server
		.mock_async(|when, then| {
			when.method(POST).path("/review");
			then.status(500).json_body(serde_json::json!({ "error": "Model unavailable" }));
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(200).json_body(serde_json::json!({ "token": "A2" }));
		})
		.await;
	let request = ApiRequest::post("/review")
		.with_json(&serde_json::json!({ "code": "fn main() {}" }))
		.expect("Review payload should serialize.");
	let response = client.send(request.clone()).await.expect("Server errors resolve as Ok.");

	assert_eq!(response.status, 500);

	let err = client
		.send_json::<serde_json::Value>(request)
		.await
		.expect_err("Typed sends should reject server errors.");

	assert!(matches!(&err, Error::Api { status: 500, .. }));
	assert_eq!(err.user_message(), "Model unavailable");

	refresh.assert_calls_async(0).await;
}
