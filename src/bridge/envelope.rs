//! Wire types exchanged with the downstream engine.

// crates.io
use http::StatusCode;
use serde_json::{Map, Value};
// self
use crate::{
	_prelude::*,
	auth::{ActionName, ClientId, IdentifierError, RequestId, ScopeSet, TenantId, ToolName, UserId},
	guard::RequestContext,
	response::ErrorCode,
};

/// JSON object carried as envelope parameters.
pub type Params = Map<String, Value>;

/// Failures while composing a [`ProtocolEnvelope`].
#[derive(Debug, ThisError)]
pub enum EnvelopeError {
	/// Tool or action name is not a valid identifier.
	#[error("Envelope name is invalid: {0}")]
	InvalidName(#[from] IdentifierError),
	/// Parameters did not serialize to a JSON object.
	#[error("Envelope parameters must be a JSON object, found {found}.")]
	ParamsNotObject {
		/// JSON kind that was produced instead.
		found: &'static str,
	},
	/// Parameters or envelope could not be serialized.
	#[error("Envelope could not be serialized.")]
	Serialize {
		/// Underlying serializer failure.
		#[source]
		source: serde_json::Error,
	},
}

/// Scheduling hint forwarded to the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
	/// Background work.
	Low,
	/// Default priority.
	Medium,
	/// Interactive work.
	High,
	/// Incident response.
	Critical,
}

/// Request sent to the engine.
///
/// `request_id` is fixed at construction and reused verbatim by every retry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProtocolEnvelope {
	/// Correlation id of the originating request.
	pub request_id: RequestId,
	/// Tenant the operation acts on.
	pub tenant_id: TenantId,
	/// Client the operation acts on, if any.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub client_id: Option<ClientId>,
	/// Caller.
	pub user_id: UserId,
	/// Engine tool.
	pub tool: ToolName,
	/// Action within the tool.
	pub action: ActionName,
	/// Action parameters.
	pub params: Params,
	/// Scopes held by the caller when the envelope was built.
	pub scopes: ScopeSet,
	/// Optional scheduling hint.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub priority: Option<Priority>,
	/// Requests asynchronous execution (engine replies with a job id).
	#[serde(rename = "async", default, skip_serializing_if = "Option::is_none")]
	pub async_: Option<bool>,
}
impl ProtocolEnvelope {
	/// Builds an envelope from an authenticated request context.
	///
	/// The tenant is the context's effective tenant, so an admin acting on another tenant
	/// addresses that tenant downstream.
	pub fn from_context(
		ctx: &RequestContext,
		tool: impl AsRef<str>,
		action: impl AsRef<str>,
	) -> Result<Self> {
		let claims = ctx.require_claims()?;
		let envelope = Self {
			request_id: ctx.request_id().clone(),
			tenant_id: ctx.tenant_id().unwrap_or(claims.tenant_id),
			client_id: ctx.client_id(),
			user_id: claims.user_id,
			tool: ToolName::new(tool).map_err(EnvelopeError::from)?,
			action: ActionName::new(action).map_err(EnvelopeError::from)?,
			params: Params::new(),
			scopes: claims.scopes.clone(),
			priority: None,
			async_: None,
		};

		Ok(envelope)
	}

	/// Replaces the parameters with `params` serialized as a JSON object.
	pub fn with_params(mut self, params: impl Serialize) -> Result<Self, EnvelopeError> {
		self.params = to_params(params)?;

		Ok(self)
	}

	/// Sets the client.
	pub fn with_client(mut self, client: ClientId) -> Self {
		self.client_id = Some(client);

		self
	}

	/// Sets the priority hint.
	pub fn with_priority(mut self, priority: Priority) -> Self {
		self.priority = Some(priority);

		self
	}

	/// Requests asynchronous execution.
	pub fn with_async(mut self, async_: bool) -> Self {
		self.async_ = Some(async_);

		self
	}

	/// Serializes the envelope once for every attempt.
	pub fn to_body(&self) -> Result<Vec<u8>, EnvelopeError> {
		serde_json::to_vec(self).map_err(|source| EnvelopeError::Serialize { source })
	}
}

/// Serializes `params` into a JSON object.
pub fn to_params(params: impl Serialize) -> Result<Params, EnvelopeError> {
	match serde_json::to_value(params).map_err(|source| EnvelopeError::Serialize { source })? {
		Value::Object(map) => Ok(map),
		Value::Null => Ok(Params::new()),
		other => Err(EnvelopeError::ParamsNotObject { found: json_kind(&other) }),
	}
}

fn json_kind(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "a boolean",
		Value::Number(_) => "a number",
		Value::String(_) => "a string",
		Value::Array(_) => "an array",
		Value::Object(_) => "an object",
	}
}

/// Structured failure reported by the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProtocolError {
	/// Machine-readable code chosen by the engine.
	pub code: String,
	/// Human-readable message.
	pub message: String,
	/// Extra detail, free-form.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub details: Option<Value>,
}
impl ProtocolError {
	/// Error used when the engine reports failure without saying why.
	pub fn unspecified() -> Self {
		Self {
			code: ErrorCode::BAD_GATEWAY.into(),
			message: "Downstream engine reported an unspecified failure.".into(),
			details: None,
		}
	}

	/// HTTP status surfaced for this error code.
	pub fn status(&self) -> StatusCode {
		match self.code.as_str() {
			ErrorCode::NOT_FOUND => StatusCode::NOT_FOUND,
			ErrorCode::CONFLICT => StatusCode::CONFLICT,
			ErrorCode::BAD_REQUEST | ErrorCode::VALIDATION_ERROR | "INVALID_PARAMS" =>
				StatusCode::BAD_REQUEST,
			_ => StatusCode::BAD_GATEWAY,
		}
	}
}
impl Display for ProtocolError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{} ({})", self.message, self.code)
	}
}

/// Response returned by the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProtocolResponse {
	/// Whether the engine completed the operation.
	pub success: bool,
	/// Echo of the envelope's request id.
	#[serde(default)]
	pub request_id: String,
	/// Job handle for asynchronous operations.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub job_id: Option<String>,
	/// Operation result.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<Value>,
	/// Failure detail when `success` is false.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<ProtocolError>,
	/// Engine timestamp, as sent.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub timestamp: Option<String>,
}
impl ProtocolResponse {
	/// Converts `success = false` into the reported [`ProtocolError`].
	pub fn into_result(self) -> Result<Self, ProtocolError> {
		if self.success {
			return Ok(self);
		}

		Err(self.error.unwrap_or_else(ProtocolError::unspecified))
	}
}
