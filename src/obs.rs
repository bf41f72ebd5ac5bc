//! Observability helpers for the gateway pipeline.
//!
//! - Spans named `gateway.stage` carry the `stage` (pipeline step) and `op` (call site) fields.
//! - Enable `metrics` to increment `gateway_stage_total` for every attempt/success/failure, labeled
//!   by `stage` + `outcome`, alongside the limiter and bridge counters.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Pipeline stages observed by the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GateStage {
	/// Sliding-window admission.
	RateLimit,
	/// Bearer extraction and token validation.
	Authenticate,
	/// Scope, role, tenant, and client checks.
	Authorize,
	/// Downstream engine call.
	Dispatch,
	/// Downstream health probe.
	HealthCheck,
}
impl GateStage {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			GateStage::RateLimit => "rate_limit",
			GateStage::Authenticate => "authenticate",
			GateStage::Authorize => "authorize",
			GateStage::Dispatch => "dispatch",
			GateStage::HealthCheck => "health_check",
		}
	}
}
impl Display for GateStage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GateOutcome {
	/// Entry to a stage.
	Attempt,
	/// The stage let the request through.
	Success,
	/// The stage rejected the request.
	Failure,
}
impl GateOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			GateOutcome::Attempt => "attempt",
			GateOutcome::Success => "success",
			GateOutcome::Failure => "failure",
		}
	}

	/// Maps a result onto success/failure.
	pub fn of<T, E>(result: &Result<T, E>) -> Self {
		match result {
			Ok(_) => GateOutcome::Success,
			Err(_) => GateOutcome::Failure,
		}
	}
}
impl Display for GateOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
