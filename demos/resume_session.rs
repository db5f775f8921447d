//! Demonstrates a desktop session that survives a restart.
//!
//! 1. Log in against a mocked remote and persist both credentials to a [`FileStore`].
//! 2. Call a protected endpoint with a stale access credential; the client renews once and
//!    replays the call.
//! 3. Build a second client over the same file to simulate an app restart and resume without
//!    logging in again.

// std
use std::sync::Arc;
// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use color_eyre::Result;
use httpmock::prelude::*;
use time::{Duration, OffsetDateTime};
use url::Url;
// self
use session_broker::{
	client::{ApiClient, SessionResume, StaticHeaders},
	config::ClientConfig,
	http::{ApiRequest, ReqwestTransport},
	reqwest::{Client, redirect::Policy},
	store::{CredentialStore, FileStore},
};

fn jwt(subject: &str, lifetime: Duration) -> String {
	let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
	let exp = (OffsetDateTime::now_utc() + lifetime).unix_timestamp();
	let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"{subject}","exp":{exp}}}"#));

	format!("{header}.{payload}.c2lnbmF0dXJl")
}

// The mock server presents a self-signed certificate.
fn mock_transport(config: &ClientConfig) -> Result<ReqwestTransport> {
	let client = Client::builder()
		.danger_accept_invalid_certs(true)
		.danger_accept_invalid_hostnames(true)
		.redirect(Policy::none())
		.build()?;

	Ok(ReqwestTransport::with_client(client, config.base_url.clone()))
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let stale = jwt("alice-stale", Duration::minutes(15));
	let renewed = jwt("alice-renewed", Duration::minutes(15));
	let renewal = jwt("alice-renewal", Duration::days(7));

	server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/login");
			then.status(200).json_body(serde_json::json!({
				"token": stale,
				"refresh_token": renewal,
				"user": { "id": 1, "name": "alice" },
			}));
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/review/history")
				.header("authorization", format!("Bearer {stale}"));
			then.status(401).json_body(serde_json::json!({ "msg": "Token has expired" }));
		})
		.await;

	let refresh_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/auth/refresh")
				.header("authorization", format!("Bearer {renewal}"));
			then.status(200).json_body(serde_json::json!({ "token": renewed }));
		})
		.await;

	server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/review/history")
				.header("authorization", format!("Bearer {renewed}"));
			then.status(200).json_body(serde_json::json!({ "reviews": [] }));
		})
		.await;

	let path = std::env::temp_dir().join("session_broker_demo.json");
	let config = ClientConfig::builder(Url::parse(&server.base_url())?).build()?;
	let store: Arc<dyn CredentialStore> = Arc::new(FileStore::open(&path)?);
	let transport = mock_transport(&config)?;
	let client: ApiClient<ReqwestTransport> =
		ApiClient::with_transport(config.clone(), store, transport.clone())
			.with_stage(StaticHeaders::new().with("x-client", "session-broker-demo"));
	let grant = client.login("alice", "pw").await?;

	println!("Logged in as {:?}.", grant.user.map(|user| user.name));

	let history: serde_json::Value =
		client.send_json(ApiRequest::get("/review/history")).await?;

	println!("History after one renewal: {history}.");
	println!("Renewal exchanges: {}.", client.renewal_metrics().attempts());

	let restarted: ApiClient<ReqwestTransport> = ApiClient::with_transport(
		config,
		Arc::new(FileStore::open(&path)?) as Arc<dyn CredentialStore>,
		transport,
	);

	match restarted.resume().await? {
		SessionResume::Resumed(credential) => println!("Resumed with {credential}."),
		SessionResume::NoSession => println!("No stored session; the user must log in."),
	}

	refresh_mock.assert_calls_async(1).await;
	restarted.logout().await?;

	Ok(())
}
