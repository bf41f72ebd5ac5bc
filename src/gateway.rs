//! End-to-end request pipeline.
//!
//! [`Gateway::admit`] runs admission control before surfacing authentication failures, so a flood
//! of bad tokens is throttled per IP before any 401 is produced. Admitted requests carry a
//! [`RequestContext`] that [`Gateway::dispatch`] turns into a bridge call.

// crates.io
use http::{HeaderMap, StatusCode};
// self
#[cfg(feature = "reqwest")]
use crate::{
	bridge::{ReqwestBridgeClient, ReqwestTransportErrorMapper},
	config::GatewayConfig,
	http::ReqwestHttpClient,
};
use crate::{
	_prelude::*,
	auth::{Claims, RequestId, TokenService},
	bridge::{BridgeClient, Deadline, Intent, ProtocolResponse, TransportErrorMapper},
	error::ConfigError,
	guard::{
		AuthMiddleware, AuthRequirement, InboundRequest, RequestContext, RouteGuard, authorize,
		require_scope,
	},
	http::BridgeHttpClient,
	obs::{self, GateOutcome, GateSpan, GateStage},
	rate_limit::{KeyExtractor, RateLimitDecision, RateLimitPolicy, RateLimiter, TenantOrIp},
	response::{ErrorResponse, HealthReport, HealthStatus},
};

/// A request that passed admission, authentication, and authorization.
#[derive(Clone, Debug)]
pub struct Admission {
	/// Identity bound to the request.
	pub ctx: RequestContext,
	/// Rate-limit decision to echo in response headers.
	pub rate_limit: RateLimitDecision,
}
impl Admission {
	/// `X-RateLimit-*` headers for the eventual response.
	pub fn headers(&self) -> HeaderMap {
		self.rate_limit.headers()
	}
}

/// A request turned away by the pipeline.
#[derive(Debug)]
pub struct Rejection {
	/// Reason for the rejection.
	pub error: Error,
	/// Rate-limit decision, when admission ran.
	pub rate_limit: Option<RateLimitDecision>,
	/// Correlation id echoed in the body.
	pub request_id: RequestId,
}
impl Rejection {
	/// HTTP status of the response.
	pub fn status(&self) -> StatusCode {
		self.error.status()
	}

	/// Rate-limit headers, including `Retry-After` on 429.
	pub fn headers(&self) -> HeaderMap {
		self.rate_limit.map(|decision| decision.headers()).unwrap_or_default()
	}

	/// Uniform error body.
	pub fn body(&self) -> ErrorResponse {
		self.error.to_response().with_request_id(self.request_id.clone())
	}
}

/// Composes the token service, rate limiter, and bridge client.
pub struct Gateway<C, M>
where
	C: ?Sized + BridgeHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	auth: AuthMiddleware,
	limiter: RateLimiter,
	policy: RateLimitPolicy,
	keys: Arc<dyn KeyExtractor>,
	bridge: BridgeClient<C, M>,
}
impl<C, M> Gateway<C, M>
where
	C: ?Sized + BridgeHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a gateway keyed by tenant (falling back to IP) without plan overrides.
	pub fn new(
		tokens: Arc<TokenService>,
		limiter: RateLimiter,
		bridge: BridgeClient<C, M>,
	) -> Self {
		Self {
			auth: AuthMiddleware::new(tokens),
			limiter,
			policy: RateLimitPolicy::new(),
			keys: Arc::new(TenantOrIp::default()),
			bridge,
		}
	}

	/// Replaces the limit policy.
	pub fn with_policy(mut self, policy: RateLimitPolicy) -> Self {
		self.policy = policy;

		self
	}

	/// Replaces the key derivation strategy.
	pub fn with_key_extractor(mut self, keys: Arc<dyn KeyExtractor>) -> Self {
		self.keys = keys;

		self
	}

	/// Authentication middleware.
	pub fn auth(&self) -> &AuthMiddleware {
		&self.auth
	}

	/// Rate limiter.
	pub fn limiter(&self) -> &RateLimiter {
		&self.limiter
	}

	/// Bridge client.
	pub fn bridge(&self) -> &BridgeClient<C, M> {
		&self.bridge
	}

	/// Starts background maintenance; requires a Tokio runtime.
	pub fn start(&self) -> Result<(), ConfigError> {
		self.limiter.spawn_cleanup()
	}

	/// Runs admission, authentication, and `guard` for one request, in that order.
	pub fn admit(
		&self,
		request: &InboundRequest,
		guard: &RouteGuard,
	) -> Result<Admission, Rejection> {
		let identity = match guard.auth {
			AuthRequirement::Required => self.auth.authenticate(request),
			AuthRequirement::Optional => Ok(self.auth.optional_auth(request)),
		};
		let claims = identity.as_ref().ok().and_then(RequestContext::claims);
		let decision = self.check_rate_limit(request, claims);
		let request_id = match &identity {
			Ok(ctx) => ctx.request_id().clone(),
			Err(_) => request.request_id(),
		};

		if let Err(rejection) = decision.into_result() {
			let error = rejection.into();

			return Err(Rejection { error, rate_limit: Some(decision), request_id });
		}

		let reject =
			|error| Rejection { error, rate_limit: Some(decision), request_id: request_id.clone() };
		let mut ctx = identity.map_err(reject)?;

		authorize(&mut ctx, request, guard).map_err(reject)?;

		Ok(Admission { ctx, rate_limit: decision })
	}

	/// Dispatches `intent` within the configured call budget.
	pub async fn dispatch<I>(
		&self,
		ctx: &mut RequestContext,
		intent: &I,
	) -> Result<ProtocolResponse>
	where
		I: ?Sized + Intent,
	{
		let deadline = Deadline::after(self.bridge.config().call_budget);

		self.dispatch_until(ctx, intent, deadline).await
	}

	/// Dispatches `intent`, abandoning the call once `deadline` passes.
	///
	/// The caller must hold one of the intent's required scopes (admins always do).
	pub async fn dispatch_until<I>(
		&self,
		ctx: &mut RequestContext,
		intent: &I,
		deadline: Deadline,
	) -> Result<ProtocolResponse>
	where
		I: ?Sized + Intent,
	{
		require_scope(ctx, intent.required_scopes())?;

		let envelope = intent.envelope(ctx)?;
		let endpoint = intent.endpoint();

		obs::record_gate_outcome(GateStage::Dispatch, GateOutcome::Attempt);
		ctx.mark_dispatched();

		let result = self.bridge.execute(&endpoint, &envelope, deadline).await;

		obs::record_gate_outcome(GateStage::Dispatch, GateOutcome::of(&result));

		Ok(result?)
	}

	/// Probes dependencies; never fails.
	pub async fn health(&self) -> HealthReport {
		let engine = match self.bridge.health_check().await {
			Ok(()) => HealthStatus::Healthy,
			Err(e) => {
				tracing::warn!(error = %e, "engine health check failed");

				HealthStatus::Degraded
			},
		};
		let limiter = if self.limiter.is_cleanup_running() {
			HealthStatus::Healthy
		} else {
			HealthStatus::Degraded
		};

		HealthReport::from_services(BTreeMap::from([
			("engine".to_owned(), engine),
			("rate_limiter".to_owned(), limiter),
		]))
	}

	/// Stops background maintenance and waits for it to finish.
	pub async fn shutdown(&self) {
		self.limiter.shutdown().await;
	}

	fn check_rate_limit(
		&self,
		request: &InboundRequest,
		claims: Option<&Claims>,
	) -> RateLimitDecision {
		let _guard = GateSpan::new(GateStage::RateLimit, "allow").entered();
		let key = self.keys.derive(request, claims);
		let limit = self.policy.limit_for(&key, claims.map(|claims| &claims.tenant_id));
		let decision = self.limiter.allow(&key, limit);
		let outcome = if decision.admitted { GateOutcome::Success } else { GateOutcome::Failure };

		obs::record_gate_outcome(GateStage::RateLimit, outcome);

		decision
	}
}
#[cfg(feature = "reqwest")]
impl Gateway<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Assembles a reqwest-backed gateway from validated configuration.
	pub fn from_config(config: &GatewayConfig) -> Result<Self, ConfigError> {
		let tokens = Arc::new(TokenService::new(config.token_config()?)?);
		let limiter = RateLimiter::new(config.limiter_config()?)?;
		let bridge = ReqwestBridgeClient::with_reqwest(config.bridge_config()?)?;

		Ok(Self::new(tokens, limiter, bridge)
			.with_policy(config.policy())
			.with_key_extractor(config.key_extractor()))
	}
}
impl<C, M> Debug for Gateway<C, M>
where
	C: ?Sized + BridgeHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Gateway")
			.field("auth", &self.auth)
			.field("limiter", &self.limiter)
			.field("policy", &self.policy)
			.field("bridge", &self.bridge)
			.finish_non_exhaustive()
	}
}
