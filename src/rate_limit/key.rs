//! Rate-limit keys and the strategies that derive them from requests.

// std
use std::net::IpAddr;
// self
use crate::{
	_prelude::*,
	auth::{Claims, TenantId},
	guard::InboundRequest,
};

/// Identity a sliding window is kept for.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RateLimitKey(String);
impl RateLimitKey {
	/// `tenant:<id>`
	pub fn tenant(tenant: &TenantId) -> Self {
		Self(format!("tenant:{tenant}"))
	}

	/// `ip:<addr>`
	pub fn ip(addr: IpAddr) -> Self {
		Self(format!("ip:{addr}"))
	}

	/// `ip:unknown`, for requests without a usable address.
	pub fn unknown_ip() -> Self {
		Self("ip:unknown".into())
	}

	/// `endpoint:<base>:<METHOD>:<path>`
	pub fn endpoint(base: &RateLimitKey, method: &http::Method, path: &str) -> Self {
		Self(format!("endpoint:{}:{}:{path}", base.0, method.as_str()))
	}

	/// Wraps an already formatted key, as found in configuration.
	pub fn custom(raw: impl Into<String>) -> Self {
		Self(raw.into())
	}

	/// Returns the key as a string slice.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Debug for RateLimitKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "RateLimitKey({})", self.0)
	}
}
impl Display for RateLimitKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Strategy that picks the rate-limit key for a request.
pub trait KeyExtractor
where
	Self: Send + Sync,
{
	/// Derives the key; `claims` is present when the caller presented a valid token.
	fn derive(&self, request: &InboundRequest, claims: Option<&Claims>) -> RateLimitKey;
}

/// Keys authenticated callers by tenant and everyone else by client IP.
#[derive(Clone, Copy, Debug, Default)]
pub struct TenantOrIp {
	/// Prefer the first `X-Forwarded-For` hop over the socket address.
	pub trust_forwarded: bool,
}
impl TenantOrIp {
	/// Trusts `X-Forwarded-For` (only safe behind a proxy that overwrites it).
	pub fn trusting_forwarded_headers() -> Self {
		Self { trust_forwarded: true }
	}

	fn ip_key(&self, request: &InboundRequest) -> RateLimitKey {
		let forwarded = if self.trust_forwarded { request.forwarded_for() } else { None };

		forwarded.or(request.remote_addr).map_or_else(RateLimitKey::unknown_ip, RateLimitKey::ip)
	}
}
impl KeyExtractor for TenantOrIp {
	fn derive(&self, request: &InboundRequest, claims: Option<&Claims>) -> RateLimitKey {
		match claims {
			Some(claims) => RateLimitKey::tenant(&claims.tenant_id),
			None => self.ip_key(request),
		}
	}
}

/// Keys each route separately on top of the tenant/IP identity.
#[derive(Clone, Copy, Debug, Default)]
pub struct PerEndpoint {
	/// Identity strategy the route is combined with.
	pub base: TenantOrIp,
}
impl KeyExtractor for PerEndpoint {
	fn derive(&self, request: &InboundRequest, claims: Option<&Claims>) -> RateLimitKey {
		RateLimitKey::endpoint(&self.base.derive(request, claims), &request.method, &request.path)
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::net::Ipv4Addr;
	// crates.io
	use http::Method;
	// self
	use super::*;

	fn request() -> InboundRequest {
		InboundRequest::new(Method::POST, "/v1/hunt")
			.with_remote_addr(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)))
			.with_header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
	}

	#[test]
	fn anonymous_callers_are_keyed_by_ip() {
		assert_eq!(TenantOrIp::default().derive(&request(), None).as_str(), "ip:10.0.0.7");
		assert_eq!(
			TenantOrIp::trusting_forwarded_headers().derive(&request(), None).as_str(),
			"ip:203.0.113.9"
		);
		assert_eq!(
			TenantOrIp::default().derive(&InboundRequest::new(Method::GET, "/"), None).as_str(),
			"ip:unknown"
		);
	}

	#[test]
	fn endpoint_keys_embed_method_and_path() {
		let key = PerEndpoint::default().derive(&request(), None);

		assert_eq!(key.as_str(), "endpoint:ip:10.0.0.7:POST:/v1/hunt");
	}

	#[test]
	fn tenant_keys_use_the_tenant_id() {
		let tenant = TenantId::parse("3f1c2a9e-5b7d-4e2f-9a0c-1d2e3f4a5b6c")
			.expect("Tenant fixture should be valid.");

		assert_eq!(
			RateLimitKey::tenant(&tenant).as_str(),
			"tenant:3f1c2a9e-5b7d-4e2f-9a0c-1d2e3f4a5b6c"
		);
	}
}
