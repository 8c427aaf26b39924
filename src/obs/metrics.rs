// self
use crate::obs::{FlowKind, FlowOutcome};

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"session_guard_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Counts a call the rate limiter rejected before it reached the network.
pub fn record_rate_limited(operation: &str) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("session_guard_rate_limited_total", "operation" => operation.to_owned())
			.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = operation;
	}
}
