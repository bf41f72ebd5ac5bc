// crates.io
use tracing::instrument::Instrumented;
// self
use crate::{_prelude::*, obs::GateStage};

/// A span builder used by pipeline stages.
#[derive(Clone, Debug)]
pub struct GateSpan {
	span: tracing::Span,
}
impl GateSpan {
	/// Creates a new span tagged with the provided stage + call site.
	pub fn new(stage: GateStage, op: &'static str) -> Self {
		Self { span: tracing::info_span!("gateway.stage", stage = stage.as_str(), op) }
	}

	/// Enters the span for synchronous sections.
	pub fn entered(self) -> GateSpanGuard {
		GateSpanGuard { _guard: self.span.entered() }
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> Instrumented<Fut>
	where
		Fut: Future,
	{
		use tracing::Instrument;

		fut.instrument(self.span.clone())
	}
}

/// RAII guard returned by [`GateSpan::entered`].
pub struct GateSpanGuard {
	_guard: tracing::span::EnteredSpan,
}
impl Debug for GateSpanGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("GateSpanGuard(..)")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn entered_guard_exists_without_subscriber() {
		let _guard = GateSpan::new(GateStage::Authorize, "test").entered();
	}

	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = GateSpan::new(GateStage::Dispatch, "instrument_wraps_future");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}
