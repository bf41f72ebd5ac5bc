//! Subscription plans and per-tenant/per-key limit overrides.

// self
use crate::{_prelude::*, auth::TenantId, rate_limit::RateLimitKey};

/// Subscription plan of a tenant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
	/// 100 requests per window.
	Free,
	/// 500 requests per window.
	Starter,
	/// 2000 requests per window.
	Pro,
	/// 10000 requests per window.
	Enterprise,
}
impl Plan {
	/// Returns the wire label.
	pub const fn as_str(self) -> &'static str {
		match self {
			Plan::Free => "free",
			Plan::Starter => "starter",
			Plan::Pro => "pro",
			Plan::Enterprise => "enterprise",
		}
	}

	/// Built-in per-window limit for the plan.
	pub const fn default_limit(self) -> u32 {
		match self {
			Plan::Free => 100,
			Plan::Starter => 500,
			Plan::Pro => 2_000,
			Plan::Enterprise => 10_000,
		}
	}
}
impl Display for Plan {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Resolves the limit override applied to a key.
///
/// Explicit key overrides win over plan limits; keys with neither fall back to the limiter's
/// default.
#[derive(Clone, Debug, Default)]
pub struct RateLimitPolicy {
	plan_limits: HashMap<Plan, u32>,
	tenant_plans: HashMap<TenantId, Plan>,
	key_limits: HashMap<RateLimitKey, u32>,
}
impl RateLimitPolicy {
	/// Creates a policy with built-in plan limits and no assignments.
	pub fn new() -> Self {
		Self::default()
	}

	/// Replaces the limit of `plan`.
	pub fn with_plan_limit(mut self, plan: Plan, limit: u32) -> Self {
		self.plan_limits.insert(plan, limit);

		self
	}

	/// Assigns `tenant` to `plan`.
	pub fn assign_plan(mut self, tenant: TenantId, plan: Plan) -> Self {
		self.tenant_plans.insert(tenant, plan);

		self
	}

	/// Pins the limit of one key.
	pub fn with_key_limit(mut self, key: RateLimitKey, limit: u32) -> Self {
		self.key_limits.insert(key, limit);

		self
	}

	/// Plan assigned to `tenant`, if any.
	pub fn plan_of(&self, tenant: &TenantId) -> Option<Plan> {
		self.tenant_plans.get(tenant).copied()
	}

	/// Effective per-window limit of `plan`.
	pub fn plan_limit(&self, plan: Plan) -> u32 {
		self.plan_limits.get(&plan).copied().unwrap_or(plan.default_limit())
	}

	/// Limit override for `key`, consulting the caller's tenant plan second.
	pub fn limit_for(&self, key: &RateLimitKey, tenant: Option<&TenantId>) -> Option<u32> {
		let plan_limit = || {
			tenant.and_then(|tenant| self.plan_of(tenant)).map(|plan| self.plan_limit(plan))
		};

		self.key_limits.get(key).copied().or_else(plan_limit).filter(|limit| *limit > 0)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn plans_resolve_to_their_limits() {
		let tenant = TenantId::random();
		let policy = RateLimitPolicy::new().assign_plan(tenant, Plan::Pro);
		let key = RateLimitKey::tenant(&tenant);

		assert_eq!(policy.limit_for(&key, Some(&tenant)), Some(2_000));
		assert_eq!(policy.limit_for(&key, None), None);
		assert_eq!(policy.limit_for(&key, Some(&TenantId::random())), None);
	}

	#[test]
	fn key_overrides_win_over_plans() {
		let tenant = TenantId::random();
		let key = RateLimitKey::tenant(&tenant);
		let policy = RateLimitPolicy::new()
			.assign_plan(tenant, Plan::Free)
			.with_plan_limit(Plan::Free, 50)
			.with_key_limit(key.clone(), 7);

		assert_eq!(policy.limit_for(&key, Some(&tenant)), Some(7));
		assert_eq!(policy.plan_limit(Plan::Free), 50);
		assert_eq!(policy.plan_limit(Plan::Enterprise), 10_000);
	}

	#[test]
	fn plans_deserialize_from_lowercase() {
		assert_eq!(
			serde_json::from_str::<Plan>("\"starter\"").expect("Plan should deserialize."),
			Plan::Starter
		);
	}
}
