//! Outbound request stages that run before the pipeline attaches the bearer credential.

// self
use crate::{_prelude::*, http::ApiRequest};

/// Transforms an outbound request before dispatch.
///
/// Stages run in registration order on the first dispatch only; a replay after renewal reuses
/// the prepared request and swaps the bearer credential. Any bearer a stage sets is overwritten.
pub trait RequestStage
where
	Self: Send + Sync,
{
	/// Returns the request to dispatch, or an error that aborts the call.
	fn prepare(&self, request: ApiRequest) -> Result<ApiRequest>;
}
impl<F> RequestStage for F
where
	F: Send + Sync + Fn(ApiRequest) -> Result<ApiRequest>,
{
	fn prepare(&self, request: ApiRequest) -> Result<ApiRequest> {
		self(request)
	}
}

/// Stage that sets a fixed group of headers on every request.
#[derive(Clone, Debug, Default)]
pub struct StaticHeaders {
	headers: BTreeMap<String, String>,
}
impl StaticHeaders {
	/// Creates an empty header set.
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds or replaces a header.
	pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.insert(name.into(), value.into());

		self
	}
}
impl RequestStage for StaticHeaders {
	fn prepare(&self, request: ApiRequest) -> Result<ApiRequest> {
		let request = self.headers.iter().fold(request, |request, (name, value)| {
			request.with_header(name.clone(), value.clone())
		});

		Ok(request)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn static_headers_apply_every_entry() {
		let stage = StaticHeaders::new().with("x-client", "desktop").with("accept-language", "en");
		let request =
			stage.prepare(ApiRequest::get("/review/history")).expect("Stage should not fail.");

		assert_eq!(request.headers.get("x-client").map(String::as_str), Some("desktop"));
		assert_eq!(request.headers.len(), 2);
	}

	#[test]
	fn closures_are_stages() {
		let stage =
			|request: ApiRequest| -> Result<ApiRequest> { Ok(request.with_query("lang", "rust")) };
		let request = stage.prepare(ApiRequest::get("/review")).expect("Stage should not fail.");

		assert_eq!(request.query, vec![("lang".to_owned(), "rust".to_owned())]);
	}
}
