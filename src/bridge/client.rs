//! Retrying client for the downstream engine.

// crates.io
use http::{Method, StatusCode, header::CONTENT_TYPE};
use tokio::time::{self, Instant};
// self
use crate::{
	_prelude::*,
	bridge::{BridgeMetrics, ProtocolEnvelope, ProtocolResponse, TransportErrorMapper},
	error::{BridgeError, ConfigError},
	guard::{X_CLIENT_ID, X_REQUEST_ID, X_TENANT_ID},
	http::{BridgeHttpClient, HttpRequest, HttpResponse, body_preview, parse_retry_after},
	obs::{self, GateSpan, GateStage},
};

/// Bridge connection and retry settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeConfig {
	/// Engine base URL; endpoints are appended to it.
	pub base_url: Url,
	/// Per-attempt timeout.
	pub timeout: StdDuration,
	/// Retries after the first attempt.
	pub max_retries: u32,
	/// Base backoff; retry `n` waits `retry_delay * n`.
	pub retry_delay: StdDuration,
	/// Default end-to-end budget of one dispatched call.
	pub call_budget: StdDuration,
}
impl BridgeConfig {
	/// Default per-attempt timeout.
	pub const DEFAULT_TIMEOUT: StdDuration = StdDuration::from_secs(30);
	/// Default retry count.
	pub const DEFAULT_MAX_RETRIES: u32 = 3;
	/// Default base backoff.
	pub const DEFAULT_RETRY_DELAY: StdDuration = StdDuration::from_secs(1);
	/// Default end-to-end budget.
	pub const DEFAULT_CALL_BUDGET: StdDuration = StdDuration::from_secs(60);

	/// Creates settings for `base_url` with default timings.
	pub fn new(base_url: Url) -> Self {
		Self {
			base_url,
			timeout: Self::DEFAULT_TIMEOUT,
			max_retries: Self::DEFAULT_MAX_RETRIES,
			retry_delay: Self::DEFAULT_RETRY_DELAY,
			call_budget: Self::DEFAULT_CALL_BUDGET,
		}
	}

	/// Parses `base_url` and applies default timings.
	pub fn parse(base_url: &str) -> Result<Self, ConfigError> {
		let url = Url::parse(base_url).map_err(|source| ConfigError::InvalidBaseUrl { source })?;
		let config = Self::new(url);

		config.validate()?;

		Ok(config)
	}

	/// Overrides the per-attempt timeout.
	pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = timeout;

		self
	}

	/// Overrides the retry count.
	pub fn with_max_retries(mut self, max_retries: u32) -> Self {
		self.max_retries = max_retries;

		self
	}

	/// Overrides the base backoff.
	pub fn with_retry_delay(mut self, retry_delay: StdDuration) -> Self {
		self.retry_delay = retry_delay;

		self
	}

	/// Overrides the default call budget.
	pub fn with_call_budget(mut self, call_budget: StdDuration) -> Self {
		self.call_budget = call_budget;

		self
	}

	/// Total attempts allowed per call.
	pub fn max_attempts(&self) -> u32 {
		self.max_retries.saturating_add(1)
	}

	/// Ensures the base URL is http(s) and timings are usable.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if !matches!(self.base_url.scheme(), "http" | "https") || self.base_url.cannot_be_a_base() {
			return Err(ConfigError::UnsupportedBaseUrl { url: self.base_url.to_string() });
		}
		if self.timeout.is_zero() {
			return Err(ConfigError::NonPositiveDuration { field: "bridge timeout" });
		}
		if self.call_budget.is_zero() {
			return Err(ConfigError::NonPositiveDuration { field: "bridge call budget" });
		}

		Ok(())
	}
}

/// Point in time after which no bridge attempt may start or continue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Deadline(Instant);
impl Deadline {
	/// Deadline `budget` from now.
	pub fn after(budget: StdDuration) -> Self {
		Self(Instant::now() + budget)
	}

	/// Deadline at `instant`.
	pub fn at(instant: Instant) -> Self {
		Self(instant)
	}

	/// Underlying instant.
	pub fn instant(self) -> Instant {
		self.0
	}

	/// Time left, zero once passed.
	pub fn remaining(self) -> StdDuration {
		self.0.saturating_duration_since(Instant::now())
	}

	/// Whether the deadline has passed.
	pub fn has_passed(self) -> bool {
		Instant::now() >= self.0
	}
}

/// Executes protocol envelopes against the engine with bounded retries.
///
/// Unauthorized and Forbidden answers end the call at once, as do logical failures reported in a
/// successful response. Everything else is retried with linear backoff until the attempt budget
/// or the caller's [`Deadline`] runs out; a backoff that would outlast the deadline is not slept.
pub struct BridgeClient<C, M>
where
	C: ?Sized + BridgeHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	http_client: Arc<C>,
	error_mapper: Arc<M>,
	config: BridgeConfig,
	metrics: Arc<BridgeMetrics>,
}
impl<C, M> BridgeClient<C, M>
where
	C: ?Sized + BridgeHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a client over `http_client` after validating `config`.
	pub fn new(
		config: BridgeConfig,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Result<Self, ConfigError> {
		config.validate()?;

		Ok(Self {
			http_client: http_client.into(),
			error_mapper: error_mapper.into(),
			config,
			metrics: Default::default(),
		})
	}

	/// Active settings.
	pub fn config(&self) -> &BridgeConfig {
		&self.config
	}

	/// Call counters of this client.
	pub fn metrics(&self) -> &BridgeMetrics {
		&self.metrics
	}

	/// Posts `envelope` to `endpoint`, retrying transient failures until `deadline`.
	pub async fn execute(
		&self,
		endpoint: &str,
		envelope: &ProtocolEnvelope,
		deadline: Deadline,
	) -> Result<ProtocolResponse, BridgeError> {
		let span = GateSpan::new(GateStage::Dispatch, "bridge_execute");
		let result = span.instrument(self.execute_inner(endpoint, envelope, deadline)).await;

		match &result {
			Ok(_) => self.metrics.record_success(),
			Err(e) => {
				self.metrics.record_failure();

				tracing::warn!(
					request_id = %envelope.request_id,
					tool = %envelope.tool,
					action = %envelope.action,
					error = %e,
					"bridge call failed"
				);
			},
		}

		result
	}

	/// Probes `GET <base>/health` once; any status other than 200 is unhealthy.
	pub async fn health_check(&self) -> Result<(), BridgeError> {
		let span = GateSpan::new(GateStage::HealthCheck, "bridge_health");

		span.instrument(self.health_check_inner()).await
	}

	async fn execute_inner(
		&self,
		endpoint: &str,
		envelope: &ProtocolEnvelope,
		deadline: Deadline,
	) -> Result<ProtocolResponse, BridgeError> {
		let url = self.endpoint_url(endpoint)?;
		let body = envelope.to_body()?;
		let max_attempts = self.config.max_attempts();
		let mut attempt = 0;
		let mut backoff_hint = None;

		loop {
			if attempt > 0 {
				let delay = self.backoff(attempt, backoff_hint);

				if delay >= deadline.remaining() {
					return Err(BridgeError::DeadlineExceeded { attempts: attempt });
				}

				self.metrics.record_retry();

				if time::timeout_at(deadline.instant(), time::sleep(delay)).await.is_err() {
					return Err(BridgeError::DeadlineExceeded { attempts: attempt });
				}
			}
			if deadline.has_passed() {
				return Err(BridgeError::DeadlineExceeded { attempts: attempt });
			}

			attempt += 1;
			self.metrics.record_attempt();

			let request = build_request(&url, envelope, body.clone())?;
			let outcome = match time::timeout_at(deadline.instant(), self.attempt(request)).await {
				Ok(outcome) => outcome,
				Err(_) => {
					obs::record_bridge_attempt(&envelope.tool, "deadline");

					return Err(BridgeError::DeadlineExceeded { attempts: attempt });
				},
			};
			let e = match outcome {
				Ok(response) => {
					obs::record_bridge_attempt(&envelope.tool, "success");

					return Ok(response);
				},
				Err(e) => e,
			};

			obs::record_bridge_attempt(&envelope.tool, "failure");

			if !e.is_retryable() {
				return Err(e);
			}
			if attempt >= max_attempts {
				return Err(BridgeError::Exhausted { attempts: attempt, last: Box::new(e) });
			}

			tracing::debug!(
				request_id = %envelope.request_id,
				attempt,
				max_attempts,
				error = %e,
				"retrying bridge call"
			);

			backoff_hint = match e {
				BridgeError::RateLimited { retry_after } =>
					retry_after.and_then(|hint| StdDuration::try_from(hint).ok()),
				_ => None,
			};
		}
	}

	async fn health_check_inner(&self) -> Result<(), BridgeError> {
		let url = self.endpoint_url("/health")?;
		let request = http::Request::builder()
			.method(Method::GET)
			.uri(url.as_str())
			.body(Vec::new())?;
		let response = self.send(request).await?;

		if response.status() == StatusCode::OK {
			return Ok(());
		}

		Err(BridgeError::Unavailable {
			status: Some(response.status().as_u16()),
			reason: "health check failed".into(),
		})
	}

	async fn attempt(&self, request: HttpRequest) -> Result<ProtocolResponse, BridgeError> {
		classify(self.send(request).await?)
	}

	async fn send(&self, request: HttpRequest) -> Result<HttpResponse, BridgeError> {
		match time::timeout(self.config.timeout, self.http_client.call(request)).await {
			Ok(result) => result.map_err(|e| self.error_mapper.map_transport_error(e)),
			Err(_) =>
				Err(BridgeError::Unavailable { status: None, reason: "request timed out".into() }),
		}
	}

	fn backoff(&self, retry: u32, hint: Option<StdDuration>) -> StdDuration {
		let linear = self.config.retry_delay.saturating_mul(retry);

		hint.map_or(linear, |hint| linear.max(hint.min(self.config.call_budget)))
	}

	fn endpoint_url(&self, endpoint: &str) -> Result<Url, BridgeError> {
		let base = self.config.base_url.as_str().trim_end_matches('/');
		let path = endpoint.trim_start_matches('/');

		Url::parse(&format!("{base}/{path}")).map_err(|source| BridgeError::InvalidEndpoint {
			endpoint: endpoint.to_owned(),
			source,
		})
	}
}
impl<C, M> Debug for BridgeClient<C, M>
where
	C: ?Sized + BridgeHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("BridgeClient")
			.field("config", &self.config)
			.field("metrics", &self.metrics)
			.finish_non_exhaustive()
	}
}

fn build_request(
	url: &Url,
	envelope: &ProtocolEnvelope,
	body: Vec<u8>,
) -> Result<HttpRequest, BridgeError> {
	let mut builder = http::Request::builder()
		.method(Method::POST)
		.uri(url.as_str())
		.header(CONTENT_TYPE, "application/json")
		.header(X_REQUEST_ID, envelope.request_id.as_str())
		.header(X_TENANT_ID, envelope.tenant_id.to_string());

	if let Some(client) = envelope.client_id {
		builder = builder.header(X_CLIENT_ID, client.to_string());
	}

	Ok(builder.body(body)?)
}

fn classify(response: HttpResponse) -> Result<ProtocolResponse, BridgeError> {
	let status = response.status();

	match status.as_u16() {
		200 | 201 | 202 => {
			let mut de = serde_json::Deserializer::from_slice(response.body());
			let decoded: ProtocolResponse = serde_path_to_error::deserialize(&mut de).map_err(
				|source| BridgeError::MalformedResponse { source, status: status.as_u16() },
			)?;

			decoded.into_result().map_err(BridgeError::Logical)
		},
		401 => Err(BridgeError::Unauthorized),
		403 => Err(BridgeError::Forbidden),
		404 => Err(BridgeError::NotFound),
		429 => Err(BridgeError::RateLimited { retry_after: parse_retry_after(response.headers()) }),
		code @ 500..=599 => Err(BridgeError::Unavailable {
			status: Some(code),
			reason: body_preview(response.body()),
		}),
		code => Err(BridgeError::UnexpectedStatus {
			status: code,
			body_preview: body_preview(response.body()),
		}),
	}
}
