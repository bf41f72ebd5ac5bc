mod common;

// std
use std::{
	collections::VecDeque,
	io,
	sync::{
		Arc, Mutex,
		atomic::{AtomicU32, Ordering},
	},
	time::Duration,
};
// crates.io
use http::{StatusCode, header::RETRY_AFTER};
use httpmock::prelude::*;
use serde_json::json;
use tokio::time::Instant;
// self
use common::{bridge_client, bridge_config};
use tenant_gateway::{
	auth::{ActionName, RequestId, ScopeSet, TenantId, ToolName, UserId},
	bridge::{BridgeClient, Deadline, Params, ProtocolEnvelope, TransportErrorMapper},
	error::BridgeError,
	http::{BridgeHttpClient, HttpRequest, TransportFuture},
};

const SUCCESS_BODY: &str = concat!(
	r#"{"success":true,"request_id":"req-it","#,
	r#""data":{"findings":3},"timestamp":"2026-01-01T00:00:00Z"}"#,
);
const CONFLICT_BODY: &str = concat!(
	r#"{"success":false,"request_id":"req-it","#,
	r#""error":{"code":"CONFLICT","message":"Job already exists."}}"#,
);

/// Replays canned answers in order and counts calls.
#[derive(Default)]
struct ScriptedTransport {
	script: Mutex<VecDeque<Result<(u16, &'static str), &'static str>>>,
	delay: Duration,
	retry_after: Option<&'static str>,
	calls: AtomicU32,
}
impl ScriptedTransport {
	fn new(script: impl IntoIterator<Item = Result<(u16, &'static str), &'static str>>) -> Self {
		Self { script: Mutex::new(script.into_iter().collect()), ..Default::default() }
	}

	fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = delay;

		self
	}

	fn with_retry_after(mut self, retry_after: &'static str) -> Self {
		self.retry_after = Some(retry_after);

		self
	}

	fn calls(&self) -> u32 {
		self.calls.load(Ordering::SeqCst)
	}
}
impl BridgeHttpClient for ScriptedTransport {
	type TransportError = io::Error;

	fn call(&self, _: HttpRequest) -> TransportFuture<'_, Self::TransportError> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let next = self.script.lock().expect("Script lock should not be poisoned.").pop_front();
		let delay = self.delay;
		let retry_after = self.retry_after;

		Box::pin(async move {
			tokio::time::sleep(delay).await;

			match next {
				Some(Ok((status, body))) => {
					let mut builder = http::Response::builder().status(status);

					if let Some(retry_after) = retry_after.filter(|_| status == 429) {
						builder = builder.header(RETRY_AFTER, retry_after);
					}

					Ok(builder
						.body(body.as_bytes().to_vec())
						.expect("Scripted response should build."))
				},
				Some(Err(reason)) => Err(io::Error::new(io::ErrorKind::ConnectionRefused, reason)),
				None => Err(io::Error::other("script exhausted")),
			}
		})
	}
}

struct IoErrorMapper;
impl TransportErrorMapper<io::Error> for IoErrorMapper {
	fn map_transport_error(&self, error: io::Error) -> BridgeError {
		match error.kind() {
			io::ErrorKind::ConnectionRefused =>
				BridgeError::Unavailable { status: None, reason: error.to_string() },
			_ => BridgeError::transport(error),
		}
	}
}

fn envelope() -> ProtocolEnvelope {
	ProtocolEnvelope {
		request_id: RequestId::new("req-it").expect("Request id should be valid."),
		tenant_id: TenantId::random(),
		client_id: None,
		user_id: UserId::random(),
		tool: ToolName::new("hunting").expect("Tool name should be valid."),
		action: ActionName::new("hunt").expect("Action name should be valid."),
		params: Params::new(),
		scopes: ScopeSet::default(),
		priority: None,
		async_: None,
	}
}

fn scripted(
	transport: &Arc<ScriptedTransport>,
	max_retries: u32,
) -> BridgeClient<ScriptedTransport, IoErrorMapper> {
	let config = bridge_config("http://engine.invalid")
		.with_max_retries(max_retries)
		.with_retry_delay(Duration::from_millis(100));

	BridgeClient::new(config, transport.clone(), IoErrorMapper)
		.expect("Scripted bridge client should build.")
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_with_linear_backoff() {
	let transport = Arc::new(ScriptedTransport::new([
		Ok((503, "warming up")),
		Err("connection refused"),
		Ok((200, SUCCESS_BODY)),
	]));
	let client = scripted(&transport, 3);
	let started = Instant::now();
	let response = client
		.execute("/v1/hunt", &envelope(), Deadline::after(Duration::from_secs(60)))
		.await
		.expect("Third attempt should succeed.");

	assert_eq!(response.data, Some(json!({ "findings": 3 })));
	assert_eq!(transport.calls(), 3);
	assert!(started.elapsed() >= Duration::from_millis(300));
	assert_eq!(client.metrics().attempts(), 3);
	assert_eq!(client.metrics().retries(), 2);
	assert_eq!(client.metrics().successes(), 1);
}

#[tokio::test(start_paused = true)]
async fn retries_stop_after_the_attempt_budget() {
	let transport = Arc::new(ScriptedTransport::new([
		Ok((502, "bad")),
		Ok((502, "bad")),
		Ok((502, "bad")),
		Ok((200, SUCCESS_BODY)),
	]));
	let client = scripted(&transport, 2);
	let started = Instant::now();
	let err = client
		.execute("/v1/hunt", &envelope(), Deadline::after(Duration::from_secs(60)))
		.await
		.expect_err("Three failures must exhaust two retries.");

	assert!(matches!(err, BridgeError::Exhausted { attempts: 3, .. }));
	assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
	assert_eq!(transport.calls(), 3);
	assert!(started.elapsed() >= Duration::from_millis(100 * (1 + 2)));
	assert_eq!(client.metrics().failures(), 1);
}

#[tokio::test(start_paused = true)]
async fn rate_limit_hints_stretch_the_backoff() {
	let transport = Arc::new(
		ScriptedTransport::new([Ok((429, "")), Ok((200, SUCCESS_BODY))]).with_retry_after("2"),
	);
	let client = scripted(&transport, 1);
	let started = Instant::now();

	client
		.execute("/v1/hunt", &envelope(), Deadline::after(Duration::from_secs(60)))
		.await
		.expect("Second attempt should succeed.");

	assert!(started.elapsed() >= Duration::from_secs(2));
	assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn hints_beyond_the_deadline_fail_without_sleeping() {
	let transport = Arc::new(
		ScriptedTransport::new([Ok((429, "")), Ok((200, SUCCESS_BODY))]).with_retry_after("3600"),
	);
	let client = scripted(&transport, 3);
	let started = Instant::now();
	let err = client
		.execute("/v1/hunt", &envelope(), Deadline::after(Duration::from_secs(10)))
		.await
		.expect_err("A backoff longer than the budget must not be slept.");

	assert!(matches!(err, BridgeError::DeadlineExceeded { attempts: 1 }));
	assert!(started.elapsed() < Duration::from_secs(1));
	assert_eq!(transport.calls(), 1);
	assert_eq!(client.metrics().retries(), 0);
}

#[tokio::test(start_paused = true)]
async fn the_last_allowed_attempt_can_still_succeed() {
	let transport = Arc::new(ScriptedTransport::new([
		Ok((503, "warming up")),
		Err("connection refused"),
		Ok((502, "bad")),
		Ok((200, SUCCESS_BODY)),
	]));
	let client = scripted(&transport, 3);
	let started = Instant::now();
	let response = client
		.execute("/v1/hunt", &envelope(), Deadline::after(Duration::from_secs(60)))
		.await
		.expect("Fourth attempt should succeed.");

	assert!(response.success);
	assert_eq!(transport.calls(), 4);
	assert!(started.elapsed() >= Duration::from_millis(100 * (1 + 2 + 3)));
	assert_eq!(client.metrics().retries(), 3);
	assert_eq!(client.metrics().failures(), 0);
}

#[tokio::test(start_paused = true)]
async fn missing_resources_are_retried() {
	let transport = Arc::new(ScriptedTransport::new([Ok((404, "")), Ok((200, SUCCESS_BODY))]));
	let client = scripted(&transport, 3);

	client
		.execute("/v1/hunt", &envelope(), Deadline::after(Duration::from_secs(60)))
		.await
		.expect("Second attempt should succeed after a 404.");

	assert_eq!(transport.calls(), 2);

	let transport = Arc::new(ScriptedTransport::new([Ok((404, "")), Ok((404, ""))]));
	let err = scripted(&transport, 1)
		.execute("/v1/hunt", &envelope(), Deadline::after(Duration::from_secs(60)))
		.await
		.expect_err("Persistent 404 must exhaust retries.");

	assert!(matches!(err.root(), BridgeError::NotFound));
	assert_eq!(err.attempts(), Some(2));
	assert_eq!(err.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(start_paused = true)]
async fn deadlines_cut_slow_calls_short() {
	let transport = Arc::new(
		ScriptedTransport::new([Ok((200, SUCCESS_BODY))]).with_delay(Duration::from_secs(3)),
	);
	let client = scripted(&transport, 3);
	let started = Instant::now();
	let err = client
		.execute("/v1/hunt", &envelope(), Deadline::after(Duration::from_secs(1)))
		.await
		.expect_err("The call must not outlive its deadline.");

	assert!(matches!(err, BridgeError::DeadlineExceeded { attempts: 1 }));
	assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
	assert!(started.elapsed() <= Duration::from_millis(1_100));
}

#[tokio::test(start_paused = true)]
async fn expired_deadlines_send_nothing() {
	let transport = Arc::new(ScriptedTransport::new([Ok((200, SUCCESS_BODY))]));
	let client = scripted(&transport, 3);
	let deadline = Deadline::at(Instant::now());
	let err = client
		.execute("/v1/hunt", &envelope(), deadline)
		.await
		.expect_err("A passed deadline must fail immediately.");

	assert!(matches!(err, BridgeError::DeadlineExceeded { attempts: 0 }));
	assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn unauthorized_answers_are_not_retried() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v1/hunt");
			then.status(401).body("nope");
		})
		.await;
	let client = bridge_client(&server.base_url());
	let err = client
		.execute("/v1/hunt", &envelope(), Deadline::after(Duration::from_secs(10)))
		.await
		.expect_err("401 must surface.");

	assert!(matches!(err, BridgeError::Unauthorized));
	assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn envelopes_carry_correlation_headers() {
	let server = MockServer::start_async().await;
	let envelope = envelope();
	let tenant = envelope.tenant_id.to_string();
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/v1/hunt")
				.header("content-type", "application/json")
				.header("x-request-id", "req-it")
				.header("x-tenant-id", tenant.as_str());
			then.status(200).header("content-type", "application/json").body(SUCCESS_BODY);
		})
		.await;
	let client = bridge_client(&server.base_url());
	let response = client
		.execute("/v1/hunt", &envelope, Deadline::after(Duration::from_secs(10)))
		.await
		.expect("Engine call should succeed.");

	assert!(response.success);

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn server_errors_exhaust_retries() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v1/scan");
			then.status(503).body("maintenance");
		})
		.await;
	let client = bridge_client(&server.base_url());
	let err = client
		.execute("/v1/scan", &envelope(), Deadline::after(Duration::from_secs(10)))
		.await
		.expect_err("Persistent 503 must exhaust retries.");

	assert_eq!(err.attempts(), Some(4));
	assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);

	mock.assert_calls_async(4).await;
}

#[tokio::test]
async fn logical_failures_surface_without_retry() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v1/monitor/jobs");
			then.status(200).header("content-type", "application/json").body(CONFLICT_BODY);
		})
		.await;
	let client = bridge_client(&server.base_url());
	let err = client
		.execute("/v1/monitor/jobs", &envelope(), Deadline::after(Duration::from_secs(10)))
		.await
		.expect_err("Logical failures must surface.");

	assert!(matches!(&err, BridgeError::Logical(e) if e.code == "CONFLICT"));
	assert_eq!(err.status(), StatusCode::CONFLICT);
	assert_eq!(err.public_message(), "Job already exists.");

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn health_checks_probe_the_engine() {
	let up = MockServer::start_async().await;
	let down = MockServer::start_async().await;

	up.mock_async(|when, then| {
		when.method(GET).path("/health");
		then.status(200);
	})
	.await;
	down.mock_async(|when, then| {
		when.method(GET).path("/health");
		then.status(500);
	})
	.await;

	bridge_client(&up.base_url()).health_check().await.expect("Engine should be healthy.");

	assert!(matches!(
		bridge_client(&down.base_url()).health_check().await,
		Err(BridgeError::Unavailable { status: Some(500), .. })
	));
}
