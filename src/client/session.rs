//! Session controller: login, registration, startup resume, and logout.
//!
//! Login, resume, and logout are serialized per client so two of them never interleave their
//! store writes. Registration only creates an account and leaves the session untouched.

// self
use crate::{
	_prelude::*,
	auth::{Credential, RegisteredUser, UserProfile},
	client::ApiClient,
	http::{ApiRequest, ApiResponse, ApiTransport},
	obs::{self, OpKind, warn_event},
};

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionEnd {
	/// The user logged out.
	Logout,
	/// Credential renewal failed and the stored credentials were deleted.
	RenewalFailed,
}
impl SessionEnd {
	/// Returns a stable label suitable for span fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			SessionEnd::Logout => "logout",
			SessionEnd::RenewalFailed => "renewal_failed",
		}
	}
}

/// In-memory view of the session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
	/// No credentials are held.
	#[default]
	Absent,
	/// Credentials are held; `user` is known only after an interactive login.
	Authenticated {
		/// Profile returned by login, when this session started with one.
		user: Option<UserProfile>,
	},
}
impl SessionState {
	/// Returns `true` for [`SessionState::Authenticated`].
	pub fn is_authenticated(&self) -> bool {
		matches!(self, Self::Authenticated { .. })
	}
}

/// Receives session lifecycle notifications, typically to drive navigation in the host app.
///
/// Callbacks run synchronously on the task that changed the state and must not block.
pub trait SessionEvents
where
	Self: Send + Sync,
{
	/// A login or resume succeeded.
	fn session_started(&self, _user: Option<&UserProfile>) {}

	/// The session moved from authenticated to absent. Fires once per session.
	fn session_ended(&self, _reason: SessionEnd) {}
}

/// Event sink that ignores every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopEvents;
impl SessionEvents for NoopEvents {}

/// Username/password pair posted to the login and register endpoints.
#[derive(Clone, Serialize)]
pub struct LoginRequest {
	/// Account name.
	pub username: String,
	/// Account password.
	pub password: String,
}
impl LoginRequest {
	/// Creates a request for the provided account.
	pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
		Self { username: username.into(), password: password.into() }
	}
}
impl Debug for LoginRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LoginRequest")
			.field("username", &self.username)
			.field("password", &"<redacted>")
			.finish()
	}
}

/// Credentials and profile issued by a successful login.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AuthGrant {
	/// Access credential.
	pub token: Credential,
	/// Renewal credential, when the remote issues one.
	#[serde(default, alias = "refreshToken")]
	pub refresh_token: Option<Credential>,
	/// Authenticated user's profile.
	#[serde(default)]
	pub user: Option<UserProfile>,
}

/// Body returned by a successful registration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct RegisterResponse {
	/// Human-readable confirmation.
	#[serde(default)]
	pub message: Option<String>,
	/// Summary of the created account.
	#[serde(default)]
	pub user: Option<RegisteredUser>,
}

/// Outcome of [`ApiClient::resume`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionResume {
	/// A usable access credential is stored (possibly after one renewal).
	Resumed(Credential),
	/// Neither stored credential is usable; the user must log in.
	NoSession,
}

impl<T> ApiClient<T>
where
	T: ?Sized + ApiTransport,
{
	/// Exchanges a username and password for a session and persists the issued credentials.
	pub async fn login(
		&self,
		username: impl Into<String>,
		password: impl Into<String>,
	) -> Result<AuthGrant> {
		let credentials = LoginRequest::new(username, password);

		obs::observe(OpKind::Login, "login", async move {
			let _session = self.session_guard.lock().await;
			let request =
				ApiRequest::post(self.config.endpoints.login.clone()).with_json(&credentials)?;
			let response = self.transport.execute(request).await?;

			if !response.is_success() {
				return Err(rejection(&response, "Login"));
			}

			let grant = response
				.json_body::<AuthGrant>()
				.ok()
				.filter(|grant| !grant.token.is_blank())
				.ok_or_else(|| malformed(&response, "Login"))?;
			let _generation = self.coordinator.supersede().await;

			match grant.refresh_token.clone().filter(|credential| !credential.is_blank()) {
				Some(renewal) => {
					self.store.save_access(grant.token.clone()).await?;
					self.store.save_renewal(renewal).await?;
				},
				None => {
					// A renewal credential from an earlier session must not outlive this login.
					self.store.delete_all().await?;
					self.store.save_access(grant.token.clone()).await?;
				},
			}

			self.start_session(grant.user.clone());

			Ok(grant)
		})
		.await
	}

	/// Creates an account. The session is not touched.
	pub async fn register(
		&self,
		username: impl Into<String>,
		password: impl Into<String>,
	) -> Result<RegisterResponse> {
		let credentials = LoginRequest::new(username, password);

		obs::observe(OpKind::Register, "register", async move {
			let request =
				ApiRequest::post(self.config.endpoints.register.clone()).with_json(&credentials)?;
			let response = self.transport.execute(request).await?;

			if !response.is_success() {
				return Err(rejection(&response, "Registration"));
			}
			if response.body.iter().all(u8::is_ascii_whitespace) {
				return Ok(RegisterResponse::default());
			}

			response.json_body().map_err(|_| malformed(&response, "Registration"))
		})
		.await
	}

	/// Restores a session from stored credentials at startup.
	///
	/// A usable access credential resumes without any network call. Otherwise a usable renewal
	/// credential drives exactly one renewal. With neither, the outcome is
	/// [`SessionResume::NoSession`] and nothing is deleted.
	pub async fn resume(&self) -> Result<SessionResume> {
		obs::observe(OpKind::Resume, "resume", async move {
			let _session = self.session_guard.lock().await;
			let now = OffsetDateTime::now_utc();

			if let Some(access) = self
				.store
				.get_access()
				.await?
				.filter(|credential| self.oracle.is_usable_at(Some(credential), now))
			{
				self.start_session(None);

				return Ok(SessionResume::Resumed(access));
			}

			let renewal = self.store.get_renewal().await?;

			if !self.oracle.is_usable_at(renewal.as_ref(), now) {
				return Ok(SessionResume::NoSession);
			}

			let access = self.renew().await?;

			self.start_session(None);

			Ok(SessionResume::Resumed(access))
		})
		.await
	}

	/// Deletes both stored credentials. No remote call is made.
	///
	/// A renewal still in flight is discarded instead of writing its credential back.
	pub async fn logout(&self) -> Result<()> {
		obs::observe(OpKind::Logout, "logout", async move {
			let _session = self.session_guard.lock().await;
			let _generation = self.coordinator.supersede().await;

			self.store.delete_all().await?;
			self.end_session(SessionEnd::Logout);

			Ok(())
		})
		.await
	}

	/// Current in-memory session state.
	pub fn state(&self) -> SessionState {
		self.state.lock().clone()
	}

	fn start_session(&self, user: Option<UserProfile>) {
		*self.state.lock() = SessionState::Authenticated { user: user.clone() };

		self.events.session_started(user.as_ref());
	}

	/// Moves to [`SessionState::Absent`], notifying the sink only on the authenticated edge.
	pub(crate) fn end_session(&self, reason: SessionEnd) {
		let previous = std::mem::take(&mut *self.state.lock());

		if previous.is_authenticated() {
			warn_event!(reason = reason.as_str(), "Session ended.");

			self.events.session_ended(reason);
		}
	}
}

fn rejection(response: &ApiResponse, operation: &str) -> Error {
	let status = response.status;

	if (400..500).contains(&status) {
		Error::InvalidCredentials {
			message: response.message().unwrap_or_else(|| "Invalid credentials.".into()),
		}
	} else {
		Error::UnexpectedAuthError {
			status: Some(status),
			message: response
				.message()
				.unwrap_or_else(|| format!("{operation} failed with status {status}.")),
		}
	}
}

fn malformed(response: &ApiResponse, operation: &str) -> Error {
	Error::UnexpectedAuthError {
		status: Some(response.status),
		message: format!("{operation} response was malformed."),
	}
}
