//! Spans around session operations and the event macros used by the client and coordinator.

// self
use crate::{_prelude::*, obs::OpKind};

/// Future returned by [`OpSpan::instrument`]; a plain passthrough without the `tracing` feature.
#[cfg(feature = "tracing")]
pub type InstrumentedOp<F> = tracing::instrument::Instrumented<F>;
/// Future returned by [`OpSpan::instrument`]; a plain passthrough without the `tracing` feature.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedOp<F> = F;

/// Span covering one login, resume, logout, renewal, or pipelined request.
#[derive(Clone, Debug)]
pub struct OpSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl OpSpan {
	/// Opens a `session_broker.op` span for `kind`, tagged with the method that started it.
	pub fn new(kind: OpKind, call_site: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("session_broker.op", op = kind.as_str(), call_site);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, call_site);

			Self {}
		}
	}

	/// Attaches the span to `fut`, entering it on every poll.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedOp<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Logs a session teardown or failed renewal at `WARN`.
macro_rules! warn_event {
	($($arg:tt)*) => {
		#[cfg(feature = "tracing")]
		{
			::tracing::warn!($($arg)*);
		}
	};
}

/// Logs credential rotation and coalescing details at `DEBUG`.
macro_rules! debug_event {
	($($arg:tt)*) => {
		#[cfg(feature = "tracing")]
		{
			::tracing::debug!($($arg)*);
		}
	};
}

pub(crate) use {debug_event, warn_event};
