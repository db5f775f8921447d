//! Client configuration: remote location, endpoint paths, and renewal policy.

// self
use crate::{_prelude::*, auth::ExpiryOracle, error::ConfigError};

/// Paths of the remote's authentication endpoints, relative to the base URL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthEndpoints {
	/// Username/password login.
	pub login: String,
	/// Account registration.
	pub register: String,
	/// Access-credential renewal.
	pub refresh: String,
}
impl Default for AuthEndpoints {
	fn default() -> Self {
		Self {
			login: "/auth/login".into(),
			register: "/auth/register".into(),
			refresh: "/auth/refresh".into(),
		}
	}
}

/// Set of response statuses that mean "credential invalid or expired".
///
/// The default treats both `401` and `422` as authentication failures because the remote's JWT
/// layer answers `422` for malformed or badly signed tokens. Remotes that use `422` for ordinary
/// validation errors should switch to [`AuthFailurePolicy::strict`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthFailurePolicy(BTreeSet<u16>);
impl AuthFailurePolicy {
	/// Status for a missing or rejected credential.
	pub const UNAUTHENTICATED: u16 = 401;
	/// Status the remote also uses for unprocessable credentials.
	pub const UNPROCESSABLE: u16 = 422;

	/// Only `401` triggers renewal.
	pub fn strict() -> Self {
		Self(BTreeSet::from([Self::UNAUTHENTICATED]))
	}

	/// Builds a policy from an explicit status list.
	pub fn from_statuses(statuses: impl IntoIterator<Item = u16>) -> Self {
		Self(statuses.into_iter().collect())
	}

	/// Returns `true` when `status` signals an authentication failure.
	pub fn is_auth_failure(&self, status: u16) -> bool {
		self.0.contains(&status)
	}

	/// Iterates the configured statuses in ascending order.
	pub fn statuses(&self) -> impl Iterator<Item = u16> + '_ {
		self.0.iter().copied()
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.0.is_empty() {
			return Err(ConfigError::EmptyAuthFailurePolicy);
		}
		if let Some(status) = self.statuses().find(|status| !(400..500).contains(status)) {
			return Err(ConfigError::InvalidAuthFailureStatus { status });
		}

		Ok(())
	}
}
impl Default for AuthFailurePolicy {
	fn default() -> Self {
		Self(BTreeSet::from([Self::UNAUTHENTICATED, Self::UNPROCESSABLE]))
	}
}

/// Validated configuration shared by the transport, the coordinator, and the session controller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
	/// Root URL every request path is joined onto.
	pub base_url: Url,
	/// Authentication endpoint paths.
	#[serde(default)]
	pub endpoints: AuthEndpoints,
	/// Statuses that trigger the renew-and-replay path.
	#[serde(default)]
	pub auth_failure: AuthFailurePolicy,
	/// Seconds subtracted from a credential's expiry claim.
	#[serde(default)]
	pub expiry_leeway_secs: u32,
	/// Per-request timeout applied by the reqwest transport.
	#[serde(default)]
	pub request_timeout_secs: Option<u64>,
	/// Renew before dispatch when the stored access credential is known to be expired.
	#[serde(default)]
	pub proactive_renewal: bool,
}
impl ClientConfig {
	/// Returns a builder seeded with defaults for everything except the base URL.
	pub fn builder(base_url: Url) -> ClientConfigBuilder {
		ClientConfigBuilder::new(base_url)
	}

	/// Parses and validates a JSON configuration document.
	pub fn from_json_slice(bytes: &[u8]) -> Result<Self, ConfigError> {
		let mut de = serde_json::Deserializer::from_slice(bytes);
		let config: Self = serde_path_to_error::deserialize(&mut de)
			.map_err(|source| ConfigError::Parse { source })?;

		config.validate()?;

		Ok(config)
	}

	/// Expiry oracle configured with this client's leeway.
	pub fn expiry_oracle(&self) -> ExpiryOracle {
		ExpiryOracle::new(Duration::seconds(i64::from(self.expiry_leeway_secs)))
	}

	/// Request timeout, when configured.
	pub fn request_timeout(&self) -> Option<std::time::Duration> {
		self.request_timeout_secs.map(std::time::Duration::from_secs)
	}

	/// Validates invariants for the configuration.
	fn validate(&self) -> Result<(), ConfigError> {
		match self.base_url.scheme() {
			"http" | "https" => {},
			_ => return Err(ConfigError::UnsupportedScheme { url: self.base_url.to_string() }),
		}

		if self.base_url.cannot_be_a_base() {
			return Err(ConfigError::CannotBeABase { url: self.base_url.to_string() });
		}

		validate_path("login", &self.endpoints.login)?;
		validate_path("register", &self.endpoints.register)?;
		validate_path("refresh", &self.endpoints.refresh)?;

		self.auth_failure.validate()
	}
}

/// Builder for [`ClientConfig`] values.
#[derive(Debug)]
pub struct ClientConfigBuilder {
	config: ClientConfig,
}
impl ClientConfigBuilder {
	/// Creates a new builder seeded with the provided base URL.
	pub fn new(base_url: Url) -> Self {
		Self {
			config: ClientConfig {
				base_url,
				endpoints: AuthEndpoints::default(),
				auth_failure: AuthFailurePolicy::default(),
				expiry_leeway_secs: 0,
				request_timeout_secs: None,
				proactive_renewal: false,
			},
		}
	}

	/// Overrides the authentication endpoint paths.
	pub fn endpoints(mut self, endpoints: AuthEndpoints) -> Self {
		self.config.endpoints = endpoints;

		self
	}

	/// Overrides the authentication-failure policy.
	pub fn auth_failure(mut self, policy: AuthFailurePolicy) -> Self {
		self.config.auth_failure = policy;

		self
	}

	/// Sets the expiry leeway in seconds.
	pub fn expiry_leeway_secs(mut self, secs: u32) -> Self {
		self.config.expiry_leeway_secs = secs;

		self
	}

	/// Sets the per-request timeout in seconds.
	pub fn request_timeout_secs(mut self, secs: u64) -> Self {
		self.config.request_timeout_secs = Some(secs);

		self
	}

	/// Enables or disables proactive renewal before dispatch.
	pub fn proactive_renewal(mut self, enabled: bool) -> Self {
		self.config.proactive_renewal = enabled;

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<ClientConfig, ConfigError> {
		self.config.validate()?;

		Ok(self.config)
	}
}

fn validate_path(endpoint: &'static str, path: &str) -> Result<(), ConfigError> {
	if path.len() > 1 && path.starts_with('/') && !path.chars().any(char::is_whitespace) {
		Ok(())
	} else {
		Err(ConfigError::InvalidEndpointPath { endpoint, path: path.to_owned() })
	}
}
