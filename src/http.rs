//! Transport primitives for calls against the remote API.
//!
//! The module exposes [`ApiTransport`] alongside the transport-neutral [`ApiRequest`] and
//! [`ApiResponse`] values so downstream crates (and tests) can plug in their own HTTP stack. The
//! pipeline hands the transport a fully prepared request: stages have run and the bearer
//! credential, if any, is already set. Transports never interpret statuses; authentication
//! failures are classified one layer up.

// self
use crate::{
	_prelude::*,
	auth::Credential,
	error::{ConfigError, ResponseError, TransportError},
};
#[cfg(feature = "reqwest")] use crate::config::ClientConfig;

/// Boxed future returned by [`ApiTransport::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP stacks capable of executing [`ApiRequest`]s.
///
/// Implementations must be `Send + Sync + 'static` so one transport can be shared by the
/// pipeline, the renewal coordinator, and the session controller of the same client.
pub trait ApiTransport
where
	Self: 'static + Send + Sync,
{
	/// Dispatches the request and resolves with whatever status the remote answered.
	fn execute(&self, request: ApiRequest) -> TransportFuture<'_>;
}

/// HTTP methods used against the remote.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
	/// `GET`.
	Get,
	/// `POST`.
	Post,
	/// `PUT`.
	Put,
	/// `PATCH`.
	Patch,
	/// `DELETE`.
	Delete,
}
impl Method {
	/// Returns the canonical method token.
	pub const fn as_str(self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Post => "POST",
			Method::Put => "PUT",
			Method::Patch => "PATCH",
			Method::Delete => "DELETE",
		}
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Transport-neutral outbound request.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute path joined onto the configured base URL.
	pub path: String,
	/// Query parameters in insertion order.
	pub query: Vec<(String, String)>,
	/// Extra headers; the pipeline owns `Authorization`.
	pub headers: BTreeMap<String, String>,
	/// JSON body, if any.
	pub body: Option<serde_json::Value>,
	/// Bearer credential attached by the pipeline.
	pub bearer: Option<Credential>,
}
impl ApiRequest {
	/// Creates a request with no query, headers, body, or credential.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self {
			method,
			path: path.into(),
			query: Vec::new(),
			headers: BTreeMap::new(),
			body: None,
			bearer: None,
		}
	}

	/// Shorthand for a `GET` request.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::Get, path)
	}

	/// Shorthand for a `POST` request.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::Post, path)
	}

	/// Shorthand for a `DELETE` request.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::Delete, path)
	}

	/// Appends a query parameter.
	pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.push((key.into(), value.into()));

		self
	}

	/// Sets or replaces a header.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.insert(name.into(), value.into());

		self
	}

	/// Sets a raw JSON body.
	pub fn with_body(mut self, body: serde_json::Value) -> Self {
		self.body = Some(body);

		self
	}

	/// Serializes `body` as the JSON payload.
	pub fn with_json<B>(self, body: &B) -> Result<Self, ConfigError>
	where
		B: ?Sized + Serialize,
	{
		let value = serde_json::to_value(body).map_err(ConfigError::RequestBody)?;

		Ok(self.with_body(value))
	}

	/// Sets the bearer credential.
	pub fn with_bearer(mut self, credential: Credential) -> Self {
		self.bearer = Some(credential);

		self
	}

	/// Resolves the request path against `base`, keeping any path prefix `base` carries.
	pub fn url(&self, base: &Url) -> Result<Url, ConfigError> {
		let mut base = base.clone();

		if !base.path().ends_with('/') {
			let path = format!("{}/", base.path());

			base.set_path(&path);
		}

		let mut url = base
			.join(self.path.trim_start_matches('/'))
			.map_err(|source| ConfigError::InvalidRequestPath { path: self.path.clone(), source })?;

		if !self.query.is_empty() {
			url.query_pairs_mut().extend_pairs(self.query.iter());
		}

		Ok(url)
	}
}

/// Status, headers, and raw body of a remote response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response headers with lower-cased names.
	pub headers: BTreeMap<String, String>,
	/// Raw body bytes.
	pub body: Vec<u8>,
}
impl ApiResponse {
	/// Creates a response with the provided status and body.
	pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
		Self { status, headers: BTreeMap::new(), body: body.into() }
	}

	/// Convenience constructor for JSON bodies.
	pub fn json(status: u16, body: &serde_json::Value) -> Self {
		Self::new(status, body.to_string()).with_header("content-type", "application/json")
	}

	/// Sets or replaces a header.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.insert(name.into().to_ascii_lowercase(), value.into());

		self
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Decodes the body, reporting the JSON path of any mismatch.
	pub fn json_body<T>(&self) -> Result<T, ResponseError>
	where
		T: DeserializeOwned,
	{
		let mut de = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut de)
			.map_err(|source| ResponseError::Parse { source, status: self.status })
	}

	/// Extracts the remote's human-readable message from `message`, `error`, or `msg`.
	pub fn message(&self) -> Option<String> {
		let value: serde_json::Value = serde_json::from_slice(&self.body).ok()?;

		["message", "error", "msg"].into_iter().find_map(|field| {
			value.get(field).and_then(serde_json::Value::as_str).map(str::to_owned)
		})
	}
}

/// Reqwest-backed [`ApiTransport`] bound to one base URL.
///
/// Redirects are not followed so a redirected login never resends credentials to another
/// origin.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
	client: ReqwestClient,
	base_url: Url,
}
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient, base_url: Url) -> Self {
		Self { client, base_url }
	}

	/// Builds a transport honoring the configured base URL and timeout.
	pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
		let mut builder = ReqwestClient::builder().redirect(reqwest::redirect::Policy::none());

		if let Some(timeout) = config.request_timeout() {
			builder = builder.timeout(timeout);
		}

		Ok(Self::with_client(builder.build()?, config.base_url.clone()))
	}

	/// Base URL every request is resolved against.
	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	async fn execute_now(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
		let url = request.url(&self.base_url).map_err(TransportError::Request)?;
		let method = match request.method {
			Method::Get => reqwest::Method::GET,
			Method::Post => reqwest::Method::POST,
			Method::Put => reqwest::Method::PUT,
			Method::Patch => reqwest::Method::PATCH,
			Method::Delete => reqwest::Method::DELETE,
		};
		let mut builder = self.client.request(method, url);

		for (name, value) in &request.headers {
			builder = builder.header(name, value);
		}
		if let Some(credential) = &request.bearer {
			builder = builder.bearer_auth(credential.expose());
		}
		if let Some(body) = &request.body {
			builder = builder
				.header(reqwest::header::CONTENT_TYPE, "application/json")
				.body(body.to_string());
		}

		let response = builder.send().await?;
		let status = response.status().as_u16();
		let headers = response
			.headers()
			.iter()
			.filter_map(|(name, value)| {
				value.to_str().ok().map(|value| (name.as_str().to_owned(), value.to_owned()))
			})
			.collect();
		let body = response.bytes().await?.to_vec();

		Ok(ApiResponse { status, headers, body })
	}
}
#[cfg(feature = "reqwest")]
impl ApiTransport for ReqwestTransport {
	fn execute(&self, request: ApiRequest) -> TransportFuture<'_> {
		Box::pin(self.execute_now(request))
	}
}
