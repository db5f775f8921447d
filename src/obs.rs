//! Optional observability helpers for broker operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `session_broker.op` with the `op` and
//!   `call_site` fields, plus warnings when a session is torn down.
//! - Enable `metrics` to increment the `session_broker_op_total` counter for every
//!   attempt/success/failure, labeled by `op` + `outcome`.

mod metrics;
mod tracing;

pub use self::metrics::*;
pub use self::tracing::*;
pub(crate) use self::tracing::{debug_event, warn_event};

// self
use crate::_prelude::*;

/// Broker operations observed by the instrumentation layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
	/// Username/password login.
	Login,
	/// Account registration.
	Register,
	/// Startup auto-resume.
	Resume,
	/// Local logout or session teardown.
	Logout,
	/// Single-flight credential renewal exchange.
	Renewal,
	/// Request dispatched through the pipeline.
	Request,
}
impl OpKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpKind::Login => "login",
			OpKind::Register => "register",
			OpKind::Resume => "resume",
			OpKind::Logout => "logout",
			OpKind::Renewal => "renewal",
			OpKind::Request => "request",
		}
	}
}
impl Display for OpKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Entry to a broker operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Attempt => "attempt",
			OpOutcome::Success => "success",
			OpOutcome::Failure => "failure",
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Runs `fut` inside an [`OpSpan`] and records attempt plus success/failure outcomes.
pub(crate) async fn observe<T, E, Fut>(
	kind: OpKind,
	call_site: &'static str,
	fut: Fut,
) -> Result<T, E>
where
	Fut: Future<Output = Result<T, E>>,
{
	let span = OpSpan::new(kind, call_site);

	record_op_outcome(kind, OpOutcome::Attempt);

	let result = span.instrument(fut).await;

	match &result {
		Ok(_) => record_op_outcome(kind, OpOutcome::Success),
		Err(_) => record_op_outcome(kind, OpOutcome::Failure),
	}

	result
}
