//! Per-key sliding-window admission control.
//!
//! [`RateLimiter`] keeps one [`SlidingWindow`](window::SlidingWindow) per [`RateLimitKey`] behind
//! its own lock. The table lock is only taken to look up, insert, or detach keys, so callers
//! hitting different keys never serialize on one another.
//!
//! Idle keys are removed by a background cleanup task owned by the limiter. The task is started
//! explicitly with [`RateLimiter::spawn_cleanup`] and stopped with [`RateLimiter::shutdown`] (or
//! when the limiter is dropped). Cleanup filters each window under that window's lock and retires
//! it when empty; an admission that finds a retired window swaps in a fresh one, so an admitted
//! request is never recorded in a window the table no longer points at.
//!
//! Limits are per process. Replicas behind a load balancer each enforce the full limit.

pub mod key;
pub mod policy;

mod window;

pub use key::*;
pub use policy::*;

// std
use std::sync::Weak;
// crates.io
use http::{HeaderMap, HeaderName, HeaderValue, header::RETRY_AFTER};
use tokio::{
	runtime::Handle,
	task::JoinHandle,
	time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	error::ConfigError,
	obs::{self, GateOutcome, GateStage},
};
use window::SlidingWindow;

/// `X-RateLimit-Limit`
pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
/// `X-RateLimit-Remaining`
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
/// `X-RateLimit-Reset`
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

type Slot = Arc<Mutex<SlidingWindow>>;

/// Settings for [`RateLimiter`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimiterConfig {
	/// Requests admitted per window when no override applies.
	pub limit: u32,
	/// Extra requests tolerated on top of `limit`.
	pub burst: u32,
	/// Window length.
	pub window: StdDuration,
	/// Period of the background cleanup pass.
	pub cleanup_interval: StdDuration,
}
impl RateLimiterConfig {
	/// Creates a configuration with a one-minute window and cleanup period.
	pub fn new(limit: u32) -> Self {
		Self {
			limit,
			burst: 0,
			window: StdDuration::from_secs(60),
			cleanup_interval: StdDuration::from_secs(60),
		}
	}

	/// Overrides the window length.
	pub fn with_window(mut self, window: StdDuration) -> Self {
		self.window = window;

		self
	}

	/// Overrides the cleanup period.
	pub fn with_cleanup_interval(mut self, interval: StdDuration) -> Self {
		self.cleanup_interval = interval;

		self
	}

	/// Adds a burst allowance to the default limit.
	pub fn with_burst(mut self, burst: u32) -> Self {
		self.burst = burst;

		self
	}

	/// Limit applied to keys without an override.
	pub fn default_limit(&self) -> u32 {
		self.limit.saturating_add(self.burst)
	}

	/// Checks the settings without building a limiter.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.limit == 0 {
			return Err(ConfigError::InvalidRateLimit { field: "limit" });
		}
		if self.window.is_zero() {
			return Err(ConfigError::InvalidRateLimit { field: "window" });
		}
		if self.cleanup_interval.is_zero() {
			return Err(ConfigError::InvalidRateLimit { field: "cleanup_interval" });
		}

		Ok(())
	}
}
impl Default for RateLimiterConfig {
	fn default() -> Self {
		Self::new(1_000)
	}
}

/// Outcome of one [`RateLimiter::allow`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitDecision {
	/// Whether the request was admitted and recorded.
	pub admitted: bool,
	/// Limit that was applied.
	pub limit: u32,
	/// Requests left in the current window after this decision.
	pub remaining: u32,
	/// Time until the oldest entry leaves the window; zero when admitted.
	pub reset_in: StdDuration,
}
impl RateLimitDecision {
	pub(crate) fn admitted(limit: u32, remaining: u32) -> Self {
		Self { admitted: true, limit, remaining, reset_in: StdDuration::ZERO }
	}

	pub(crate) fn rejected(limit: u32, reset_in: StdDuration) -> Self {
		Self { admitted: false, limit, remaining: 0, reset_in }
	}

	/// Whole seconds a rejected caller should wait, never less than one.
	pub fn retry_after_secs(&self) -> u64 {
		ceil_secs(self.reset_in).max(1)
	}

	/// Response headers describing the decision.
	///
	/// `X-RateLimit-Reset` and `Retry-After` are only present on rejections.
	pub fn headers(&self) -> HeaderMap {
		let mut headers = HeaderMap::new();

		headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(self.limit));
		headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(self.remaining));

		if !self.admitted {
			let retry_after = self.retry_after_secs();

			headers.insert(X_RATELIMIT_RESET, HeaderValue::from(retry_after));
			headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));
		}

		headers
	}

	/// Converts a rejection into [`RateLimitRejection`].
	pub fn into_result(self) -> Result<Self, RateLimitRejection> {
		if self.admitted {
			Ok(self)
		} else {
			Err(RateLimitRejection { limit: self.limit, reset_in: self.reset_in })
		}
	}
}

/// The caller exhausted its window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ThisError)]
#[error("Rate limit of {limit} requests per window exceeded.")]
pub struct RateLimitRejection {
	/// Limit that was applied.
	pub limit: u32,
	/// Time until the oldest entry leaves the window.
	pub reset_in: StdDuration,
}

/// Concurrent sliding-window rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
	state: Arc<LimiterState>,
	cleanup: Mutex<Option<CleanupTask>>,
}
impl RateLimiter {
	/// Builds a limiter after validating `config`; no cleanup task runs yet.
	pub fn new(config: RateLimiterConfig) -> Result<Self, ConfigError> {
		config.validate()?;

		Ok(Self {
			state: Arc::new(LimiterState { config, table: Default::default() }),
			cleanup: Default::default(),
		})
	}

	/// Returns the active configuration.
	pub fn config(&self) -> &RateLimiterConfig {
		&self.state.config
	}

	/// Checks and records one request for `key`.
	///
	/// `limit_override` replaces the default limit when it is positive. The limiter never fails.
	pub fn allow(&self, key: &RateLimitKey, limit_override: Option<u32>) -> RateLimitDecision {
		let decision = self.state.allow(key, limit_override, Instant::now());

		obs::record_rate_limit(decision.admitted);

		if !decision.admitted {
			tracing::debug!(
				key = key.as_str(),
				limit = decision.limit,
				reset_in_ms = decision.reset_in.as_millis() as u64,
				"rate limit exceeded"
			);
		}

		decision
	}

	/// Runs one cleanup pass immediately and returns the number of keys removed.
	pub fn sweep(&self) -> usize {
		self.state.sweep(Instant::now())
	}

	/// Number of keys with a live window.
	pub fn tracked_keys(&self) -> usize {
		self.state.table.read().len()
	}

	/// Requests currently counted against `key`.
	pub fn usage(&self, key: &RateLimitKey) -> usize {
		let slot = self.state.table.read().get(key).cloned();

		slot.map_or(0, |slot| {
			let mut window = slot.lock();

			window.evict(Instant::now(), self.state.config.window);

			window.len()
		})
	}

	/// Starts the periodic cleanup task on the current Tokio runtime.
	///
	/// Calling it while a task is already running is a no-op.
	pub fn spawn_cleanup(&self) -> Result<(), ConfigError> {
		let runtime = Handle::try_current().map_err(|_| ConfigError::MissingRuntime)?;
		let mut cleanup = self.cleanup.lock();

		if cleanup.as_ref().is_some_and(|task| !task.handle.is_finished()) {
			return Ok(());
		}

		let cancel = CancellationToken::new();
		let handle = runtime.spawn(run_cleanup(
			Arc::downgrade(&self.state),
			self.state.config.cleanup_interval,
			cancel.clone(),
		));

		*cleanup = Some(CleanupTask { cancel, handle });

		Ok(())
	}

	/// Returns true while the cleanup task is running.
	pub fn is_cleanup_running(&self) -> bool {
		self.cleanup.lock().as_ref().is_some_and(|task| !task.handle.is_finished())
	}

	/// Stops the cleanup task and waits for it to finish.
	pub async fn shutdown(&self) {
		let task = self.cleanup.lock().take();

		if let Some(task) = task {
			task.cancel.cancel();

			if let Err(e) = task.handle.await {
				tracing::warn!(error = %e, "rate-limit cleanup task ended abnormally");
			}
		}
	}
}
impl Drop for RateLimiter {
	fn drop(&mut self) {
		if let Some(task) = self.cleanup.get_mut().take() {
			task.cancel.cancel();
		}
	}
}

#[derive(Debug)]
struct CleanupTask {
	cancel: CancellationToken,
	handle: JoinHandle<()>,
}

#[derive(Debug)]
struct LimiterState {
	config: RateLimiterConfig,
	table: RwLock<HashMap<RateLimitKey, Slot>>,
}
impl LimiterState {
	fn allow(
		&self,
		key: &RateLimitKey,
		limit_override: Option<u32>,
		now: Instant,
	) -> RateLimitDecision {
		let limit =
			limit_override.filter(|limit| *limit > 0).unwrap_or(self.config.default_limit());

		loop {
			let slot = self.slot(key);
			let mut window = slot.lock();

			if window.is_retired() {
				drop(window);
				self.detach(key, &slot);

				continue;
			}

			return window.admit(now, self.config.window, limit);
		}
	}

	fn slot(&self, key: &RateLimitKey) -> Slot {
		if let Some(slot) = self.table.read().get(key) {
			return slot.clone();
		}

		self.table.write().entry(key.clone()).or_default().clone()
	}

	/// Removes `key` only if it still maps to `slot`.
	fn detach(&self, key: &RateLimitKey, slot: &Slot) {
		let mut table = self.table.write();

		if table.get(key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
			table.remove(key);
		}
	}

	fn sweep(&self, now: Instant) -> usize {
		let _span = obs::GateSpan::new(GateStage::RateLimit, "sweep").entered();
		let snapshot = self
			.table
			.read()
			.iter()
			.map(|(key, slot)| (key.clone(), slot.clone()))
			.collect::<Vec<_>>();
		let mut retired = Vec::new();

		for (key, slot) in snapshot {
			let mut window = slot.lock();

			window.evict(now, self.config.window);

			if window.is_empty() {
				window.retire();
				drop(window);
				retired.push((key, slot));
			}
		}

		let removed = retired.len();

		for (key, slot) in retired {
			self.detach(&key, &slot);
		}

		obs::record_gate_outcome(GateStage::RateLimit, GateOutcome::Success);

		removed
	}
}

async fn run_cleanup(state: Weak<LimiterState>, period: StdDuration, cancel: CancellationToken) {
	let mut ticker = tokio::time::interval_at(Instant::now() + period, period);

	ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

	loop {
		tokio::select! {
			_ = cancel.cancelled() => break,
			_ = ticker.tick() => {
				let Some(state) = state.upgrade() else {
					break;
				};
				let removed = state.sweep(Instant::now());
				let tracked = state.table.read().len();

				tracing::debug!(removed, tracked, "rate-limit cleanup pass");
			},
		}
	}
}

fn ceil_secs(duration: StdDuration) -> u64 {
	duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn limiter(limit: u32) -> RateLimiter {
		RateLimiter::new(RateLimiterConfig::new(limit)).expect("Limiter fixture should build.")
	}

	#[test]
	fn config_rejects_zero_values() {
		assert!(RateLimiter::new(RateLimiterConfig::new(0)).is_err());
		assert!(
			RateLimiter::new(RateLimiterConfig::new(1).with_window(StdDuration::ZERO)).is_err()
		);
		assert_eq!(RateLimiterConfig::new(10).with_burst(5).default_limit(), 15);
	}

	#[test]
	fn overrides_replace_the_default_limit() {
		let limiter = limiter(100);
		let key = RateLimitKey::custom("tenant:override");

		assert_eq!(limiter.allow(&key, Some(2)).remaining, 1);
		assert_eq!(limiter.allow(&key, Some(2)).remaining, 0);
		assert!(!limiter.allow(&key, Some(2)).admitted);
		assert!(limiter.allow(&key, Some(0)).admitted, "Zero overrides fall back to the default.");
	}

	#[test]
	fn rejection_headers_carry_retry_hints() {
		let rejected = RateLimitDecision::rejected(10, StdDuration::from_millis(56_200));
		let headers = rejected.headers();

		assert_eq!(headers[X_RATELIMIT_LIMIT], "10");
		assert_eq!(headers[X_RATELIMIT_REMAINING], "0");
		assert_eq!(headers[X_RATELIMIT_RESET], "57");
		assert_eq!(headers[RETRY_AFTER], "57");
		assert_eq!(RateLimitDecision::rejected(1, StdDuration::ZERO).retry_after_secs(), 1);

		let admitted = RateLimitDecision::admitted(10, 9).headers();

		assert!(admitted.get(RETRY_AFTER).is_none());
		assert_eq!(admitted[X_RATELIMIT_REMAINING], "9");
	}

	#[test]
	fn retired_windows_are_replaced_on_admission() {
		let limiter = limiter(5);
		let key = RateLimitKey::custom("ip:retired");
		let now = Instant::now();

		limiter.state.allow(&key, None, now);

		let stale = limiter.state.slot(&key);

		stale.lock().retire();

		let decision = limiter.state.allow(&key, None, now);

		assert_eq!(decision.remaining, 4, "A retired window must not count earlier requests.");
		assert!(!Arc::ptr_eq(&stale, &limiter.state.slot(&key)));
		assert_eq!(limiter.tracked_keys(), 1);
	}

	#[test]
	fn sweep_keeps_live_windows() {
		let limiter = limiter(5);
		let key = RateLimitKey::custom("ip:live");

		limiter.allow(&key, None);

		assert_eq!(limiter.sweep(), 0);
		assert_eq!(limiter.usage(&key), 1);
	}

	#[test]
	fn spawning_cleanup_requires_a_runtime() {
		assert!(matches!(limiter(1).spawn_cleanup(), Err(ConfigError::MissingRuntime)));
	}

	#[tokio::test]
	async fn cleanup_task_starts_and_stops() {
		let limiter = limiter(1);

		limiter.spawn_cleanup().expect("Cleanup should spawn inside a runtime.");

		assert!(limiter.is_cleanup_running());

		limiter.shutdown().await;

		assert!(!limiter.is_cleanup_running());
	}
}
