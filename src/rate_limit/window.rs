// std
use std::collections::VecDeque;
// crates.io
use tokio::time::Instant;
// self
use crate::{_prelude::*, rate_limit::RateLimitDecision};

/// Admitted-request timestamps for one key, oldest first.
#[derive(Debug, Default)]
pub(crate) struct SlidingWindow {
	stamps: VecDeque<Instant>,
	retired: bool,
}
impl SlidingWindow {
	/// Drops every timestamp at or before `now - window`.
	pub(crate) fn evict(&mut self, now: Instant, window: StdDuration) {
		let Some(cutoff) = now.checked_sub(window) else {
			return;
		};

		while self.stamps.front().is_some_and(|stamp| *stamp <= cutoff) {
			self.stamps.pop_front();
		}
	}

	/// Evicts, then admits `now` when fewer than `limit` stamps remain.
	pub(crate) fn admit(
		&mut self,
		now: Instant,
		window: StdDuration,
		limit: u32,
	) -> RateLimitDecision {
		// Stamps stay ordered even if callers race on reading the clock.
		let now = self.stamps.back().map_or(now, |last| now.max(*last));

		self.evict(now, window);

		let remaining = i64::from(limit) - self.stamps.len() as i64;

		if remaining <= 0 {
			let reset_in = self
				.stamps
				.front()
				.map_or(window, |oldest| (*oldest + window).saturating_duration_since(now));

			return RateLimitDecision::rejected(limit, reset_in);
		}

		self.stamps.push_back(now);

		RateLimitDecision::admitted(limit, (remaining - 1) as u32)
	}

	pub(crate) fn len(&self) -> usize {
		self.stamps.len()
	}

	pub(crate) fn is_empty(&self) -> bool {
		self.stamps.is_empty()
	}

	/// Marks the window as detached from the table; later admissions must use a fresh slot.
	pub(crate) fn retire(&mut self) {
		self.retired = true;
	}

	pub(crate) fn is_retired(&self) -> bool {
		self.retired
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	const WINDOW: StdDuration = StdDuration::from_secs(60);

	#[test]
	fn three_per_minute_sequence() {
		let start = Instant::now();
		let at = |secs: u64| start + StdDuration::from_secs(secs);
		let mut window = SlidingWindow::default();

		assert_eq!(window.admit(at(0), WINDOW, 3), RateLimitDecision::admitted(3, 2));
		assert_eq!(window.admit(at(1), WINDOW, 3), RateLimitDecision::admitted(3, 1));
		assert_eq!(window.admit(at(2), WINDOW, 3), RateLimitDecision::admitted(3, 0));

		let rejected = window.admit(at(3), WINDOW, 3);

		assert!(!rejected.admitted);
		assert_eq!(rejected.remaining, 0);
		assert_eq!(rejected.reset_in, StdDuration::from_secs(57));
		assert!(window.admit(at(61), WINDOW, 3).admitted);
	}

	#[test]
	fn retained_stamps_stay_inside_the_window() {
		let start = Instant::now();
		let mut window = SlidingWindow::default();

		for secs in 0..10 {
			window.admit(start + StdDuration::from_secs(secs * 10), WINDOW, 100);
		}

		let now = start + StdDuration::from_secs(95);

		window.evict(now, WINDOW);

		assert_eq!(window.len(), 6);
		assert!(window.stamps.iter().all(|stamp| *stamp > now - WINDOW && *stamp <= now));
	}

	#[test]
	fn lowered_limit_never_underflows() {
		let start = Instant::now();
		let mut window = SlidingWindow::default();

		for _ in 0..5 {
			window.admit(start, WINDOW, 10);
		}

		let decision = window.admit(start, WINDOW, 2);

		assert!(!decision.admitted);
		assert_eq!(decision.remaining, 0);
		assert_eq!(window.len(), 5);
	}
}
