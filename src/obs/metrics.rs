// self
use crate::obs::{GateOutcome, GateStage};

/// Records a stage outcome via the global metrics recorder (when enabled).
pub fn record_gate_outcome(stage: GateStage, outcome: GateOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"gateway_stage_total",
			"stage" => stage.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (stage, outcome);
	}
}

/// Records a limiter decision (when enabled).
pub fn record_rate_limit(admitted: bool) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"gateway_rate_limit_total",
			"outcome" => if admitted { "admitted" } else { "rejected" }
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = admitted;
	}
}

/// Records one downstream attempt for `tool` (when enabled).
pub fn record_bridge_attempt(tool: &str, outcome: &'static str) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"gateway_bridge_attempts_total",
			"tool" => tool.to_owned(),
			"outcome" => outcome
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (tool, outcome);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn recorders_noop_without_installed_recorder() {
		record_gate_outcome(GateStage::RateLimit, GateOutcome::Failure);
		record_rate_limit(false);
		record_bridge_attempt("hunting", "retry");
	}
}
