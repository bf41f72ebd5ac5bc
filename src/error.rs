//! Gateway-level error types shared across tokens, guards, the limiter, and the bridge.
//!
//! Every failure that can reach a caller is a closed enum. [`Error`] maps itself to an HTTP
//! status, a machine-readable code, and a public message that never carries internal detail.

// crates.io
use http::StatusCode;
// self
use crate::{
	_prelude::*,
	auth::{IdentifierError, Role, Scope, TenantId, TokenKind, join_scopes},
	bridge::{EnvelopeError, ProtocolError},
	rate_limit::RateLimitRejection,
	response::{ErrorCode, ErrorResponse},
};

/// Gateway-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn StdError + Send + Sync>;

/// Canonical gateway error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Caller could not be authenticated.
	#[error(transparent)]
	Auth(#[from] AuthError),
	/// Caller is authenticated but not allowed to do this.
	#[error(transparent)]
	Access(#[from] AccessError),
	/// A tenant, client, or request identifier is malformed.
	#[error("Request carries an invalid identifier: {0}")]
	InvalidIdentifier(#[from] IdentifierError),
	/// The caller exhausted its rate-limit window.
	#[error(transparent)]
	RateLimited(#[from] RateLimitRejection),
	/// The downstream engine call failed.
	#[error(transparent)]
	Bridge(#[from] BridgeError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// A token could not be signed.
	#[error("Token could not be signed.")]
	Signing {
		/// Underlying signing failure.
		#[source]
		source: jsonwebtoken::errors::Error,
	},
}
impl Error {
	/// HTTP status surfaced to the caller.
	pub fn status(&self) -> StatusCode {
		match self {
			Self::Auth(_) => StatusCode::UNAUTHORIZED,
			Self::Access(_) => StatusCode::FORBIDDEN,
			Self::InvalidIdentifier(_) => StatusCode::BAD_REQUEST,
			Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
			Self::Bridge(e) => e.status(),
			Self::Config(_) | Self::Signing { .. } => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	/// Machine-readable error code surfaced to the caller.
	pub fn code(&self) -> &str {
		match self {
			Self::Auth(e) => e.code(),
			Self::Access(_) => ErrorCode::FORBIDDEN,
			Self::InvalidIdentifier(_) => ErrorCode::BAD_REQUEST,
			Self::RateLimited(_) => ErrorCode::TOO_MANY_REQUESTS,
			Self::Bridge(e) => e.code(),
			Self::Config(_) | Self::Signing { .. } => ErrorCode::INTERNAL_SERVER_ERROR,
		}
	}

	/// Message safe to show to the caller.
	pub fn public_message(&self) -> String {
		match self {
			Self::Auth(e) => e.public_message().into(),
			Self::Access(e) => e.to_string(),
			Self::InvalidIdentifier(e) => format!("Invalid {} ID.", e.kind().to_lowercase()),
			Self::RateLimited(_) => "Rate limit exceeded. Please try again later.".into(),
			Self::Bridge(e) => e.public_message(),
			Self::Config(_) | Self::Signing { .. } => "Internal server error.".into(),
		}
	}

	/// Retry hint for rate-limited responses.
	pub fn retry_after(&self) -> Option<StdDuration> {
		match self {
			Self::RateLimited(e) => Some(e.reset_in),
			_ => None,
		}
	}

	/// Renders the error into the uniform response body.
	pub fn to_response(&self) -> ErrorResponse {
		ErrorResponse::new(self.code(), self.public_message())
	}
}
impl From<EnvelopeError> for Error {
	fn from(e: EnvelopeError) -> Self {
		Self::Bridge(e.into())
	}
}

/// Authentication failures; all of them surface as 401.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum AuthError {
	/// No bearer token was supplied.
	#[error("Authorization header is missing.")]
	MissingToken,
	/// The header or token is not well formed.
	#[error("Token is malformed.")]
	MalformedToken,
	/// The token expired.
	#[error("Token has expired.")]
	ExpiredToken,
	/// The signature does not verify or the algorithm is not HS256.
	#[error("Token signature is invalid.")]
	BadSignature,
	/// Issuer, audience, subject, or private claims do not check out.
	#[error("Token claims are invalid: {reason}.")]
	InvalidClaims {
		/// Internal reason, never shown to callers.
		reason: String,
	},
	/// The token kind cannot be used for this operation.
	#[error("A {found} token cannot be used here.")]
	WrongTokenType {
		/// Kind that was presented.
		found: TokenKind,
	},
}
impl AuthError {
	/// Machine-readable code.
	pub const fn code(&self) -> &'static str {
		match self {
			Self::ExpiredToken => ErrorCode::TOKEN_EXPIRED,
			_ => ErrorCode::UNAUTHORIZED,
		}
	}

	/// Fixed message shown to callers; only expiry gets a distinct one.
	pub const fn public_message(&self) -> &'static str {
		match self {
			Self::ExpiredToken => "Token has expired.",
			Self::MissingToken => "Authorization header is required.",
			_ => "Invalid or expired token.",
		}
	}

	pub(crate) fn invalid_claims(reason: impl Into<String>) -> Self {
		Self::InvalidClaims { reason: reason.into() }
	}
}

/// Authorization failures; all of them surface as 403.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum AccessError {
	/// The caller lacks the scopes the operation needs.
	#[error("Missing required scope: {}.", join_scopes(.missing))]
	MissingScope {
		/// Scopes the caller lacks.
		missing: Vec<Scope>,
	},
	/// The caller tried to act on a tenant other than its own.
	#[error("Access denied to tenant {requested}.")]
	TenantMismatch {
		/// Tenant named by the request.
		requested: TenantId,
	},
	/// The caller's role is not permitted.
	#[error("Role {role} is not allowed to perform this operation.")]
	RoleNotAllowed {
		/// Role the caller holds.
		role: Role,
	},
}

/// Failures of calls to the downstream engine.
#[derive(Debug, ThisError)]
pub enum BridgeError {
	/// Engine answered 401.
	#[error("Downstream engine rejected the gateway credentials.")]
	Unauthorized,
	/// Engine answered 403.
	#[error("Downstream engine refused the requested operation.")]
	Forbidden,
	/// Engine answered 404.
	#[error("Downstream engine could not find the requested resource.")]
	NotFound,
	/// Engine answered 429.
	#[error("Downstream engine is throttling requests.")]
	RateLimited {
		/// Retry-After hint from the engine, if supplied.
		retry_after: Option<Duration>,
	},
	/// Engine could not be reached, timed out, or answered 5xx.
	#[error("Downstream engine is unavailable: {reason}.")]
	Unavailable {
		/// HTTP status code, when one was received.
		status: Option<u16>,
		/// Short description of the failure.
		reason: String,
	},
	/// Engine answered with an unexpected status.
	#[error("Downstream engine returned unexpected status {status}: {body_preview}.")]
	UnexpectedStatus {
		/// HTTP status code.
		status: u16,
		/// Truncated response body.
		body_preview: String,
	},
	/// Engine answered with a body that is not a protocol response.
	#[error("Downstream engine returned a malformed response.")]
	MalformedResponse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code.
		status: u16,
	},
	/// Other transport failure.
	#[error("Transport failure while calling the downstream engine.")]
	Transport {
		/// Transport-specific failure.
		#[source]
		source: BoxError,
	},
	/// Engine processed the request and reported `success = false`.
	#[error("Downstream engine reported a failure: {0}.")]
	Logical(ProtocolError),
	/// Every attempt failed with a retryable error.
	#[error("Downstream call failed after {attempts} attempts.")]
	Exhausted {
		/// Attempts made.
		attempts: u32,
		/// Failure of the final attempt.
		#[source]
		last: Box<BridgeError>,
	},
	/// The caller's deadline passed before the call could complete.
	#[error("Downstream call exceeded its deadline after {attempts} attempts.")]
	DeadlineExceeded {
		/// Attempts started before the deadline passed.
		attempts: u32,
	},
	/// The envelope could not be composed.
	#[error(transparent)]
	Envelope(#[from] EnvelopeError),
	/// The HTTP request could not be built.
	#[error("Downstream request could not be built.")]
	Request(#[from] http::Error),
	/// The endpoint does not form a valid URL with the base URL.
	#[error("Downstream endpoint `{endpoint}` is invalid.")]
	InvalidEndpoint {
		/// Endpoint path that was rejected.
		endpoint: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
}
impl BridgeError {
	/// Wraps a transport-specific failure.
	pub fn transport(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Transport { source: Box::new(src) }
	}

	/// Returns true for failures the engine decided on purpose; they are never retried.
	pub fn is_policy(&self) -> bool {
		matches!(self, Self::Unauthorized | Self::Forbidden)
	}

	/// Returns true for failures worth another attempt.
	pub fn is_retryable(&self) -> bool {
		matches!(
			self,
			Self::NotFound
				| Self::RateLimited { .. }
				| Self::Unavailable { .. }
				| Self::UnexpectedStatus { .. }
				| Self::MalformedResponse { .. }
				| Self::Transport { .. }
		)
	}

	/// Number of attempts recorded by a wrapping variant.
	pub fn attempts(&self) -> Option<u32> {
		match self {
			Self::Exhausted { attempts, .. } | Self::DeadlineExceeded { attempts } =>
				Some(*attempts),
			_ => None,
		}
	}

	/// Innermost failure behind [`BridgeError::Exhausted`].
	pub fn root(&self) -> &BridgeError {
		match self {
			Self::Exhausted { last, .. } => last.root(),
			other => other,
		}
	}

	/// HTTP status surfaced to the caller.
	pub fn status(&self) -> StatusCode {
		match self.root() {
			Self::Unauthorized => StatusCode::UNAUTHORIZED,
			Self::Forbidden => StatusCode::FORBIDDEN,
			Self::NotFound => StatusCode::NOT_FOUND,
			Self::Logical(e) => e.status(),
			Self::RateLimited { .. } | Self::Unavailable { .. } | Self::DeadlineExceeded { .. } =>
				StatusCode::SERVICE_UNAVAILABLE,
			Self::UnexpectedStatus { .. }
			| Self::MalformedResponse { .. }
			| Self::Transport { .. } => StatusCode::BAD_GATEWAY,
			Self::Envelope(_) | Self::Request(_) | Self::InvalidEndpoint { .. } =>
				StatusCode::INTERNAL_SERVER_ERROR,
			Self::Exhausted { .. } => StatusCode::BAD_GATEWAY,
		}
	}

	/// Machine-readable error code surfaced to the caller.
	pub fn code(&self) -> &str {
		match self.root() {
			Self::Unauthorized => ErrorCode::UNAUTHORIZED,
			Self::Forbidden => ErrorCode::FORBIDDEN,
			Self::NotFound => ErrorCode::NOT_FOUND,
			Self::Logical(e) => &e.code,
			Self::RateLimited { .. } | Self::Unavailable { .. } | Self::DeadlineExceeded { .. } =>
				ErrorCode::SERVICE_UNAVAILABLE,
			Self::UnexpectedStatus { .. }
			| Self::MalformedResponse { .. }
			| Self::Transport { .. }
			| Self::Exhausted { .. } => ErrorCode::BAD_GATEWAY,
			Self::Envelope(_) | Self::Request(_) | Self::InvalidEndpoint { .. } =>
				ErrorCode::INTERNAL_SERVER_ERROR,
		}
	}

	/// Message safe to show to the caller.
	pub fn public_message(&self) -> String {
		match self.root() {
			Self::Unauthorized => "Downstream authentication failed.".into(),
			Self::Forbidden => "Downstream access denied.".into(),
			Self::NotFound => "Resource not found.".into(),
			Self::Logical(e) => e.message.clone(),
			Self::RateLimited { .. } => "Downstream engine is busy. Please try again later.".into(),
			Self::Unavailable { .. } | Self::DeadlineExceeded { .. } =>
				"Downstream engine is unavailable.".into(),
			Self::UnexpectedStatus { .. }
			| Self::MalformedResponse { .. }
			| Self::Transport { .. }
			| Self::Exhausted { .. } => "Downstream engine returned an invalid response.".into(),
			Self::Envelope(_) | Self::Request(_) | Self::InvalidEndpoint { .. } =>
				"Internal server error.".into(),
		}
	}
}

/// Configuration and validation failures raised while assembling the gateway.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Configuration sources could not be read or deserialized.
	#[error("Configuration could not be loaded.")]
	Load {
		/// Underlying loader failure.
		#[source]
		source: config::ConfigError,
	},
	/// No signing secret was configured.
	#[error("Token signing secret is not configured.")]
	MissingSecret,
	/// The signing secret is too short for HS256.
	#[error("Token signing secret must be at least {min} bytes.")]
	WeakSecret {
		/// Minimum accepted length in bytes.
		min: usize,
	},
	/// A token lifetime is zero or negative.
	#[error("The {field} lifetime must be positive.")]
	NonPositiveTtl {
		/// Setting name.
		field: &'static str,
	},
	/// A token lifetime pushes the expiry past the representable range.
	#[error("The {field} lifetime is too large.")]
	TtlOutOfRange {
		/// Setting name.
		field: &'static str,
	},
	/// A timeout or budget is zero.
	#[error("The {field} duration must be positive.")]
	NonPositiveDuration {
		/// Setting name.
		field: &'static str,
	},
	/// A required text setting is empty.
	#[error("The {field} setting cannot be empty.")]
	EmptySetting {
		/// Setting name.
		field: &'static str,
	},
	/// A rate-limit setting is zero.
	#[error("The {field} rate-limit setting must be positive.")]
	InvalidRateLimit {
		/// Setting name.
		field: &'static str,
	},
	/// The bridge base URL cannot be parsed.
	#[error("Bridge base URL is invalid.")]
	InvalidBaseUrl {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// The bridge base URL uses a scheme other than http or https.
	#[error("Bridge base URL must use http or https: {url}.")]
	UnsupportedBaseUrl {
		/// Rejected URL.
		url: String,
	},
	/// A background task was requested outside a Tokio runtime.
	#[error("A Tokio runtime is required to start background tasks.")]
	MissingRuntime,
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<config::ConfigError> for ConfigError {
	fn from(source: config::ConfigError) -> Self {
		Self::Load { source }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}
