mod common;

// std
use std::{
	net::{IpAddr, Ipv4Addr},
	time::Duration,
};
// crates.io
use http::{Method, StatusCode, header::RETRY_AFTER};
use httpmock::prelude::*;
// self
use common::{ReqwestTestGateway, build_gateway, principal};
use tenant_gateway::{
	auth::{Principal, Role, Scope, TenantId},
	bridge::{Deadline, HuntIntent, LeakSearchIntent, LeakQueryKind},
	error::{AccessError, Error},
	guard::{AuthStage, InboundRequest, RouteGuard, TENANT_ID_PARAM},
	response::{ErrorCode, HealthStatus},
};

const HUNT_OK: &str = r#"{"success":true,"request_id":"req-gw","job_id":"job-1"}"#;

fn bearer_request(gateway: &ReqwestTestGateway, principal: &Principal) -> InboundRequest {
	let issued = gateway
		.auth()
		.tokens()
		.issue_access_token(principal)
		.expect("Access token should issue.");

	InboundRequest::new(Method::POST, "/v1/hunt")
		.with_bearer(issued.token.expose())
		.with_header("x-request-id", "req-gw")
}

fn hunt() -> HuntIntent {
	HuntIntent { target: "example.com".into(), ..Default::default() }
}

#[tokio::test]
async fn read_only_callers_cannot_start_hunts() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v1/hunt");
			then.status(200).body(HUNT_OK);
		})
		.await;
	let gateway = build_gateway(&server.base_url(), 1_000);
	let request = bearer_request(&gateway, &principal(Role::Viewer, [Scope::HUNTING_READ]));
	let mut admission =
		gateway.admit(&request, &RouteGuard::authenticated()).expect("Viewer should be admitted.");
	let err = gateway
		.dispatch(&mut admission.ctx, &hunt())
		.await
		.expect_err("Hunting needs hunting:write.");

	assert!(matches!(err, Error::Access(AccessError::MissingScope { .. })));
	assert_eq!(err.status(), StatusCode::FORBIDDEN);
	assert_eq!(err.public_message(), "Missing required scope: hunting:write.");
	assert_eq!(admission.ctx.stage(), AuthStage::Authorized);

	mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn authorized_hunts_reach_the_engine() {
	let server = MockServer::start_async().await;
	let analyst = principal(Role::Analyst, [Scope::HUNTING_WRITE]);
	let tenant = analyst.tenant_id.to_string();
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/v1/hunt")
				.header("x-request-id", "req-gw")
				.header("x-tenant-id", tenant.as_str());
			then.status(202).header("content-type", "application/json").body(HUNT_OK);
		})
		.await;
	let gateway = build_gateway(&server.base_url(), 1_000);
	let request = bearer_request(&gateway, &analyst);
	let guard = RouteGuard::authenticated().any_scope([Scope::HUNTING_WRITE]);
	let mut admission = gateway.admit(&request, &guard).expect("Analyst should be admitted.");
	let response = gateway
		.dispatch(&mut admission.ctx, &hunt())
		.await
		.expect("Hunt should be accepted.");

	assert_eq!(response.job_id.as_deref(), Some("job-1"));
	assert_eq!(admission.ctx.stage(), AuthStage::Dispatched);
	assert_eq!(admission.headers()["x-ratelimit-remaining"], "999");

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn the_request_after_the_limit_is_throttled() {
	let gateway = build_gateway("http://127.0.0.1:9", 1_000);
	let request = bearer_request(&gateway, &principal(Role::Analyst, [Scope::HUNTING_READ]));
	let guard = RouteGuard::authenticated();

	for _ in 0..1_000 {
		gateway.admit(&request, &guard).expect("Requests within the limit should pass.");
	}

	let rejection = gateway.admit(&request, &guard).expect_err("Request 1001 must be throttled.");
	let retry_after = rejection.headers()[RETRY_AFTER]
		.to_str()
		.expect("Retry-After should be ASCII.")
		.parse::<u64>()
		.expect("Retry-After should be whole seconds.");
	let body = rejection.body();

	assert_eq!(rejection.status(), StatusCode::TOO_MANY_REQUESTS);
	assert!((1..=60).contains(&retry_after));
	assert_eq!(body.error.code, ErrorCode::TOO_MANY_REQUESTS);
	assert_eq!(body.request_id.as_ref().map(|id| id.as_str()), Some("req-gw"));
}

#[tokio::test]
async fn invalid_tokens_are_throttled_per_address() {
	let gateway = build_gateway("http://127.0.0.1:9", 2);
	let request = InboundRequest::new(Method::POST, "/v1/hunt")
		.with_bearer("not.a.token")
		.with_remote_addr(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7)));
	let guard = RouteGuard::authenticated();

	for _ in 0..2 {
		let rejection = gateway.admit(&request, &guard).expect_err("Bad tokens must fail.");

		assert_eq!(rejection.status(), StatusCode::UNAUTHORIZED);
		assert!(rejection.rate_limit.is_some_and(|decision| decision.admitted));
	}

	let throttled = gateway.admit(&request, &guard).expect_err("Flood must be throttled.");

	assert_eq!(throttled.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn tenants_are_isolated_except_for_admins() {
	let server = MockServer::start_async().await;
	let target = TenantId::random();
	let target_header = target.to_string();
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/v1/leaks/search")
				.header("x-tenant-id", target_header.as_str());
			then.status(200).body(HUNT_OK);
		})
		.await;
	let gateway = build_gateway(&server.base_url(), 1_000);
	let guard = RouteGuard::authenticated().tenant_access();
	let analyst = bearer_request(&gateway, &principal(Role::Analyst, [Scope::HUNTING_READ]))
		.with_path_param(TENANT_ID_PARAM, target.to_string());
	let admin = bearer_request(&gateway, &principal(Role::Admin, []))
		.with_path_param(TENANT_ID_PARAM, target.to_string());
	let denied = gateway.admit(&analyst, &guard).expect_err("Analysts must stay in their tenant.");
	let mut admitted = gateway.admit(&admin, &guard).expect("Admins may cross tenants.");
	let search = LeakSearchIntent {
		query: "example.com".into(),
		kind: LeakQueryKind::Domain,
		max_results: 10,
	};

	assert_eq!(denied.status(), StatusCode::FORBIDDEN);
	assert_eq!(admitted.ctx.tenant_id(), Some(target));
	assert_ne!(admitted.ctx.home_tenant_id(), Some(target));

	gateway
		.dispatch_until(&mut admitted.ctx, &search, Deadline::after(Duration::from_secs(10)))
		.await
		.expect("Admin search should reach the target tenant.");
	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn public_routes_admit_anonymous_callers() {
	let gateway = build_gateway("http://127.0.0.1:9", 10);
	let request = InboundRequest::new(Method::GET, "/v1/status").with_bearer("garbage");
	let admission =
		gateway.admit(&request, &RouteGuard::public()).expect("Public routes should admit.");

	assert!(!admission.ctx.is_authenticated());
	assert_eq!(admission.ctx.stage(), AuthStage::Authorized);
}

#[tokio::test]
async fn health_reports_each_dependency() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/health");
			then.status(200);
		})
		.await;

	let gateway = build_gateway(&server.base_url(), 10);
	let idle = gateway.health().await;

	assert_eq!(idle.services["engine"], HealthStatus::Healthy);
	assert_eq!(idle.services["rate_limiter"], HealthStatus::Degraded);
	assert_eq!(idle.status, HealthStatus::Degraded);

	gateway.start().expect("Cleanup should start inside a runtime.");

	let running = gateway.health().await;

	assert_eq!(running.status, HealthStatus::Healthy);

	gateway.shutdown().await;
}
