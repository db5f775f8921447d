//! Broker-level error types shared across the pipeline, the session controller, and stores.

// self
use crate::{_prelude::*, renewal::RenewalError};

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical broker error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Response body could not be decoded.
	#[error(transparent)]
	Response(#[from] ResponseError),

	/// Remote rejected the request's credential and no further renewal is permitted.
	#[error("Remote rejected the request credential with status {status}.")]
	AuthenticationFailure {
		/// HTTP status returned by the remote.
		status: u16,
		/// Remote-supplied message, when present.
		message: Option<String>,
	},
	/// Credential renewal failed; the session has been cleared.
	#[error("Credential renewal failed: {0}")]
	RenewalFailed(#[from] RenewalError),
	/// Remote rejected the supplied username/password.
	#[error("{message}")]
	InvalidCredentials {
		/// Remote-supplied message, or a generic fallback.
		message: String,
	},
	/// Login or registration failed for a reason other than bad credentials.
	#[error("Authentication request failed unexpectedly: {message}")]
	UnexpectedAuthError {
		/// HTTP status, when the remote answered.
		status: Option<u16>,
		/// Remote-supplied message, or a generic fallback.
		message: String,
	},
	/// Remote answered a non-authentication call with a non-success status.
	#[error("Remote returned status {status}.")]
	Api {
		/// HTTP status returned by the remote.
		status: u16,
		/// Remote-supplied message, when present.
		message: Option<String>,
	},
}
impl Error {
	/// Returns `true` for any renewal failure; see [`RenewalError::ends_session`] for whether the
	/// session was torn down.
	pub fn is_renewal_failure(&self) -> bool {
		matches!(self, Self::RenewalFailed(_))
	}

	/// Returns `true` when the remote was unreachable.
	pub fn is_network(&self) -> bool {
		matches!(self, Self::Transport(_))
	}

	/// Message suitable for showing to the user.
	///
	/// Remote-supplied messages win; everything else collapses to a generic sentence.
	pub fn user_message(&self) -> String {
		match self {
			Self::InvalidCredentials { message } => message.clone(),
			Self::UnexpectedAuthError { message, .. } => message.clone(),
			Self::AuthenticationFailure { message: Some(message), .. }
			| Self::Api { message: Some(message), .. } => message.clone(),
			Self::Transport(_) => "The server could not be reached.".into(),
			Self::RenewalFailed(e) if e.ends_session() =>
				"Your session has expired. Please sign in again.".into(),
			_ => "Something went wrong. Please try again.".into(),
		}
	}
}

/// Configuration and validation failures raised by the broker.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Base URL uses a scheme other than http or https.
	#[error("Base URL must use http or https: {url}.")]
	UnsupportedScheme {
		/// URL that failed validation.
		url: String,
	},
	/// Base URL cannot have paths joined onto it.
	#[error("Base URL cannot be used as a base: {url}.")]
	CannotBeABase {
		/// URL that failed validation.
		url: String,
	},
	/// Endpoint path is empty or relative.
	#[error("The {endpoint} endpoint must be an absolute path: {path:?}.")]
	InvalidEndpointPath {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Path that failed validation.
		path: String,
	},
	/// Authentication-failure policy lists no status codes.
	#[error("Authentication-failure policy must list at least one status code.")]
	EmptyAuthFailurePolicy,
	/// Authentication-failure policy lists a status outside the 4xx range.
	#[error("Status {status} cannot signal an authentication failure.")]
	InvalidAuthFailureStatus {
		/// Rejected status code.
		status: u16,
	},
	/// Configuration document could not be parsed.
	#[error("Configuration document is malformed.")]
	Parse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Request path could not be joined onto the base URL.
	#[error("Request path {path:?} cannot be joined onto the base URL.")]
	InvalidRequestPath {
		/// Offending path.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Request body could not be serialized.
	#[error("Request body could not be serialized.")]
	RequestBody(#[source] serde_json::Error),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Failures decoding a remote response body.
#[derive(Debug, ThisError)]
pub enum ResponseError {
	/// Body was not the JSON shape the caller expected.
	#[error("Remote returned malformed JSON.")]
	Parse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status of the response.
		status: u16,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the remote.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Request did not complete within the configured timeout.
	#[error("Request timed out while calling the remote.")]
	Timeout {
		/// Transport-specific timeout error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the remote.")]
	Io(#[from] std::io::Error),
	/// Request could not be turned into a URL the transport can dial.
	#[error("Request could not be prepared for dispatch.")]
	Request(#[source] ConfigError),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Wraps a transport-specific timeout error.
	pub fn timeout(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Timeout { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() { Self::timeout(e) } else { Self::network(e) }
	}
}
