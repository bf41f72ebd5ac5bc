#![allow(dead_code)]

// std
use std::{sync::Arc, time::Duration};
// self
use tenant_gateway::{
	auth::{Principal, Role, Scope, ScopeSet, TenantId, TokenConfig, TokenService, UserId},
	bridge::{BridgeConfig, ReqwestBridgeClient, ReqwestTransportErrorMapper},
	gateway::Gateway,
	http::ReqwestHttpClient,
	rate_limit::{RateLimiter, RateLimiterConfig},
};

pub const TEST_SECRET: &str = "integration-secret-0123456789abcdefghij";

pub type ReqwestTestGateway = Gateway<ReqwestHttpClient, ReqwestTransportErrorMapper>;

pub fn token_service() -> TokenService {
	TokenService::new(TokenConfig::new(TEST_SECRET))
		.expect("Integration token configuration should be valid.")
}

pub fn principal(role: Role, scopes: impl IntoIterator<Item = Scope>) -> Principal {
	Principal::new(UserId::random(), TenantId::random(), role, ScopeSet::new(scopes))
}

pub fn bridge_config(base_url: &str) -> BridgeConfig {
	BridgeConfig::parse(base_url)
		.expect("Mock server URL should parse.")
		.with_timeout(Duration::from_secs(5))
		.with_retry_delay(Duration::from_millis(10))
}

pub fn bridge_client(base_url: &str) -> ReqwestBridgeClient {
	ReqwestBridgeClient::with_reqwest(bridge_config(base_url))
		.expect("Reqwest bridge client should build.")
}

pub fn build_gateway(base_url: &str, limit: u32) -> ReqwestTestGateway {
	let limiter = RateLimiter::new(RateLimiterConfig::new(limit))
		.expect("Limiter configuration should be valid.");

	Gateway::new(Arc::new(token_service()), limiter, bridge_client(base_url))
}
