//! Outcome counter shared by every session operation.

// self
use crate::obs::{OpKind, OpOutcome};

/// Increments `session_broker_op_total{op, outcome}` when the `metrics` feature is enabled.
///
/// Renewal-specific counts (coalesced callers included) live on
/// [`RenewalMetrics`](crate::renewal::RenewalMetrics) and are always available.
pub fn record_op_outcome(kind: OpKind, outcome: OpOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"session_broker_op_total",
			"op" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}
