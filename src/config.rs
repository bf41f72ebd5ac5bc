//! Layered gateway configuration.
//!
//! Settings come from an optional TOML file overlaid by `GATEWAY__<SECTION>__<KEY>` environment
//! variables (for example `GATEWAY__TOKEN__SECRET` or `GATEWAY__RATE_LIMIT__LIMIT`), then convert
//! into the validated component configurations.

// std
use std::path::Path;
// crates.io
use config::{Config, Environment, File, FileFormat};
// self
use crate::{
	_prelude::*,
	auth::{TenantId, TokenConfig, TokenSecret},
	bridge::BridgeConfig,
	error::ConfigError,
	rate_limit::{
		KeyExtractor, PerEndpoint, Plan, RateLimitKey, RateLimitPolicy, RateLimiterConfig,
		TenantOrIp,
	},
};

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "GATEWAY";
/// Separator between prefix, section, and key in environment overrides.
pub const ENV_SEPARATOR: &str = "__";

/// Root configuration document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
	/// Token signing and lifetimes.
	pub token: TokenSettings,
	/// Admission control.
	pub rate_limit: RateLimitSettings,
	/// Downstream engine.
	pub bridge: BridgeSettings,
}
impl GatewayConfig {
	/// Loads `path` (when given) and applies environment overrides.
	pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
		Self::load_layers(path, None)
	}

	/// Like [`GatewayConfig::load`], reading overrides from `vars` instead of the process
	/// environment.
	pub fn load_with_vars(
		path: Option<&Path>,
		vars: HashMap<String, String>,
	) -> Result<Self, ConfigError> {
		Self::load_layers(path, Some(vars))
	}

	fn load_layers(
		path: Option<&Path>,
		vars: Option<HashMap<String, String>>,
	) -> Result<Self, ConfigError> {
		let mut builder = Config::builder();

		if let Some(path) = path {
			builder = builder.add_source(File::from(path).format(FileFormat::Toml));
		}

		let config = builder.add_source(environment().source(vars)).build()?.try_deserialize()?;

		Ok(config)
	}

	/// Parses a TOML document without consulting the environment.
	pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
		let config = Config::builder()
			.add_source(File::from_str(raw, FileFormat::Toml))
			.build()?
			.try_deserialize()?;

		Ok(config)
	}

	/// Validated token service settings.
	pub fn token_config(&self) -> Result<TokenConfig, ConfigError> {
		let secret = self.token.secret.as_ref().ok_or(ConfigError::MissingSecret)?;
		let config = TokenConfig::new(secret.expose())
			.with_issuer(&self.token.issuer)
			.with_audience(&self.token.audience)
			.with_access_ttl(Duration::seconds(self.token.access_ttl_secs))
			.with_refresh_ttl(Duration::seconds(self.token.refresh_ttl_secs))
			.with_leeway(StdDuration::from_secs(self.token.leeway_secs));

		config.validate()?;

		Ok(config)
	}

	/// Validated limiter settings.
	pub fn limiter_config(&self) -> Result<RateLimiterConfig, ConfigError> {
		let settings = &self.rate_limit;
		let config = RateLimiterConfig::new(settings.limit)
			.with_burst(settings.burst)
			.with_window(StdDuration::from_secs(settings.window_secs))
			.with_cleanup_interval(StdDuration::from_secs(settings.cleanup_interval_secs));

		config.validate()?;

		Ok(config)
	}

	/// Plan and key overrides.
	pub fn policy(&self) -> RateLimitPolicy {
		let settings = &self.rate_limit;
		let mut policy = RateLimitPolicy::new();

		for (plan, limit) in &settings.plan_limits {
			policy = policy.with_plan_limit(*plan, *limit);
		}
		for (tenant, plan) in &settings.tenant_plans {
			policy = policy.assign_plan(*tenant, *plan);
		}
		for (key, limit) in &settings.key_limits {
			policy = policy.with_key_limit(RateLimitKey::custom(key.as_str()), *limit);
		}

		policy
	}

	/// Key derivation strategy selected by the settings.
	pub fn key_extractor(&self) -> Arc<dyn KeyExtractor> {
		let base = TenantOrIp { trust_forwarded: self.rate_limit.trust_forwarded };

		if self.rate_limit.per_endpoint {
			Arc::new(PerEndpoint { base })
		} else {
			Arc::new(base)
		}
	}

	/// Validated bridge settings.
	pub fn bridge_config(&self) -> Result<BridgeConfig, ConfigError> {
		let settings = &self.bridge;
		let config = BridgeConfig::parse(&settings.base_url)?
			.with_timeout(StdDuration::from_secs(settings.timeout_secs))
			.with_max_retries(settings.max_retries)
			.with_retry_delay(StdDuration::from_millis(settings.retry_delay_ms))
			.with_call_budget(StdDuration::from_secs(settings.call_budget_secs));

		config.validate()?;

		Ok(config)
	}
}

/// `[token]` section.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenSettings {
	/// HMAC signing secret; required.
	pub secret: Option<TokenSecret>,
	/// Issuer claim.
	pub issuer: String,
	/// Audience claim.
	pub audience: String,
	/// Access token lifetime.
	pub access_ttl_secs: i64,
	/// Refresh token lifetime.
	pub refresh_ttl_secs: i64,
	/// Clock skew tolerated during validation.
	pub leeway_secs: u64,
}
impl Default for TokenSettings {
	fn default() -> Self {
		Self {
			secret: None,
			issuer: TokenConfig::DEFAULT_ISSUER.into(),
			audience: TokenConfig::DEFAULT_AUDIENCE.into(),
			access_ttl_secs: 15 * 60,
			refresh_ttl_secs: 7 * 24 * 60 * 60,
			leeway_secs: 0,
		}
	}
}

/// `[rate_limit]` section.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
	/// Requests per window for keys without an override.
	pub limit: u32,
	/// Extra requests added to `limit`.
	pub burst: u32,
	/// Window length.
	pub window_secs: u64,
	/// Period of the idle-key sweep.
	pub cleanup_interval_secs: u64,
	/// Key anonymous callers by the first `X-Forwarded-For` hop.
	pub trust_forwarded: bool,
	/// Combine the key with method and path.
	pub per_endpoint: bool,
	/// Plan limit overrides.
	pub plan_limits: BTreeMap<Plan, u32>,
	/// Tenant plan assignments.
	pub tenant_plans: BTreeMap<TenantId, Plan>,
	/// Exact key overrides, keyed by the rendered key (`tenant:<id>`, `ip:<addr>`, ...).
	pub key_limits: BTreeMap<String, u32>,
}
impl Default for RateLimitSettings {
	fn default() -> Self {
		let defaults = RateLimiterConfig::default();

		Self {
			limit: defaults.limit,
			burst: defaults.burst,
			window_secs: defaults.window.as_secs(),
			cleanup_interval_secs: defaults.cleanup_interval.as_secs(),
			trust_forwarded: false,
			per_endpoint: false,
			plan_limits: BTreeMap::new(),
			tenant_plans: BTreeMap::new(),
			key_limits: BTreeMap::new(),
		}
	}
}

/// `[bridge]` section.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
	/// Engine base URL.
	pub base_url: String,
	/// Per-attempt timeout.
	pub timeout_secs: u64,
	/// Retries after the first attempt.
	pub max_retries: u32,
	/// Base backoff in milliseconds.
	pub retry_delay_ms: u64,
	/// End-to-end budget of one dispatched call.
	pub call_budget_secs: u64,
}
impl Default for BridgeSettings {
	fn default() -> Self {
		Self {
			base_url: "http://127.0.0.1:8081".into(),
			timeout_secs: BridgeConfig::DEFAULT_TIMEOUT.as_secs(),
			max_retries: BridgeConfig::DEFAULT_MAX_RETRIES,
			retry_delay_ms: BridgeConfig::DEFAULT_RETRY_DELAY.as_millis() as u64,
			call_budget_secs: BridgeConfig::DEFAULT_CALL_BUDGET.as_secs(),
		}
	}
}

fn environment() -> Environment {
	Environment::with_prefix(ENV_PREFIX)
		.prefix_separator(ENV_SEPARATOR)
		.separator(ENV_SEPARATOR)
		.try_parsing(true)
}
