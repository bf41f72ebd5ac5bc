//! Uniform response bodies surfaced to gateway callers.

// self
use crate::{_prelude::*, auth::RequestId};

/// Machine-readable error codes.
#[derive(Clone, Copy, Debug)]
pub struct ErrorCode;
impl ErrorCode {
	/// 400
	pub const BAD_REQUEST: &'static str = "BAD_REQUEST";
	/// 502
	pub const BAD_GATEWAY: &'static str = "BAD_GATEWAY";
	/// 409
	pub const CONFLICT: &'static str = "CONFLICT";
	/// 403
	pub const FORBIDDEN: &'static str = "FORBIDDEN";
	/// 500
	pub const INTERNAL_SERVER_ERROR: &'static str = "INTERNAL_SERVER_ERROR";
	/// 404
	pub const NOT_FOUND: &'static str = "NOT_FOUND";
	/// 503
	pub const SERVICE_UNAVAILABLE: &'static str = "SERVICE_UNAVAILABLE";
	/// 401 for an expired token.
	pub const TOKEN_EXPIRED: &'static str = "TOKEN_EXPIRED";
	/// 429
	pub const TOO_MANY_REQUESTS: &'static str = "TOO_MANY_REQUESTS";
	/// 401
	pub const UNAUTHORIZED: &'static str = "UNAUTHORIZED";
	/// 400 raised by payload validation.
	pub const VALIDATION_ERROR: &'static str = "VALIDATION_ERROR";
}

/// Error payload nested in [`ErrorResponse`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
	/// Machine-readable code.
	pub code: String,
	/// Human-readable message.
	pub message: String,
}

/// Body of every failed gateway response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Always `false`.
	pub success: bool,
	/// Error details.
	pub error: ErrorBody,
	/// Correlation id of the failed request.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub request_id: Option<RequestId>,
	/// Time the response was produced.
	#[serde(with = "time::serde::rfc3339")]
	pub timestamp: OffsetDateTime,
}
impl ErrorResponse {
	/// Creates a failure body stamped with the current time.
	pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			success: false,
			error: ErrorBody { code: code.into(), message: message.into() },
			request_id: None,
			timestamp: OffsetDateTime::now_utc(),
		}
	}

	/// Attaches the request id.
	pub fn with_request_id(mut self, request_id: RequestId) -> Self {
		self.request_id = Some(request_id);

		self
	}
}

/// Overall health verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
	/// Every dependency answered.
	Healthy,
	/// At least one dependency failed its probe.
	Degraded,
}

/// Health of the gateway and its dependencies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
	/// Overall verdict.
	pub status: HealthStatus,
	/// Crate version.
	pub version: String,
	/// Time the probe finished.
	#[serde(with = "time::serde::rfc3339")]
	pub timestamp: OffsetDateTime,
	/// Per-dependency verdicts.
	pub services: BTreeMap<String, HealthStatus>,
}
impl HealthReport {
	/// Builds a report whose overall status is derived from `services`.
	pub fn from_services(services: BTreeMap<String, HealthStatus>) -> Self {
		let status = if services.values().all(|status| *status == HealthStatus::Healthy) {
			HealthStatus::Healthy
		} else {
			HealthStatus::Degraded
		};

		Self {
			status,
			version: env!("CARGO_PKG_VERSION").into(),
			timestamp: OffsetDateTime::now_utc(),
			services,
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn error_response_serializes_uniform_shape() {
		let body =
			ErrorResponse::new(ErrorCode::FORBIDDEN, "Missing required scope: hunting:write.");
		let json = serde_json::to_value(&body).expect("Error response should serialize.");

		assert_eq!(json["success"], false);
		assert_eq!(json["error"]["code"], "FORBIDDEN");
		assert!(json.get("request_id").is_none());
		assert!(json["timestamp"].as_str().is_some_and(|ts| ts.contains('T')));
	}

	#[test]
	fn health_degrades_when_any_service_fails() {
		let healthy = HealthReport::from_services(BTreeMap::from([
			("gateway".to_owned(), HealthStatus::Healthy),
			("engine".to_owned(), HealthStatus::Healthy),
		]));
		let degraded = HealthReport::from_services(BTreeMap::from([
			("gateway".to_owned(), HealthStatus::Healthy),
			("engine".to_owned(), HealthStatus::Degraded),
		]));

		assert_eq!(healthy.status, HealthStatus::Healthy);
		assert_eq!(degraded.status, HealthStatus::Degraded);
	}
}
