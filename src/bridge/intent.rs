//! Typed operations the gateway forwards to the engine.
//!
//! Each intent knows its tool, action, endpoint, and the scopes a caller needs; its serialized
//! fields become the envelope parameters.

// std
use std::borrow::Cow;
// crates.io
use uuid::Uuid;
// self
use crate::{
	_prelude::*,
	auth::{ActionName, Scope, ToolName},
	bridge::{EnvelopeError, Params, Priority, ProtocolEnvelope, to_params},
	guard::RequestContext,
};

/// An operation that can be dispatched to the engine.
pub trait Intent
where
	Self: Send + Sync,
{
	/// Engine tool.
	fn tool(&self) -> &str;

	/// Action within the tool.
	fn action(&self) -> &str;

	/// Endpoint path relative to the bridge base URL.
	fn endpoint(&self) -> Cow<'_, str>;

	/// Scopes of which the caller needs at least one.
	fn required_scopes(&self) -> &[Scope];

	/// Envelope parameters.
	fn params(&self) -> Result<Params, EnvelopeError>;

	/// Scheduling hint.
	fn priority(&self) -> Option<Priority> {
		None
	}

	/// Asynchronous execution flag.
	fn is_async(&self) -> Option<bool> {
		None
	}

	/// Composes the envelope for `ctx`.
	fn envelope(&self, ctx: &RequestContext) -> Result<ProtocolEnvelope> {
		let mut envelope = ProtocolEnvelope::from_context(ctx, self.tool(), self.action())?;

		envelope.params = self.params()?;
		envelope.priority = self.priority();
		envelope.async_ = self.is_async();

		Ok(envelope)
	}
}

macro_rules! def_intent {
	($name:ident, $tool:literal, $action:literal, $endpoint:literal, [$($scope:ident),+]) => {
		impl Intent for $name {
			fn tool(&self) -> &str {
				$tool
			}

			fn action(&self) -> &str {
				$action
			}

			fn endpoint(&self) -> Cow<'_, str> {
				Cow::Borrowed($endpoint)
			}

			fn required_scopes(&self) -> &[Scope] {
				&[$(Scope::$scope),+]
			}

			fn params(&self) -> Result<Params, EnvelopeError> {
				to_params(self)
			}
		}
	};
}

/// Threat hunt across a target.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HuntIntent {
	/// Domain, brand, or keyword to hunt.
	pub target: String,
	/// Include leaked-credential sources.
	#[serde(default)]
	pub include_leaks: bool,
	/// Run the slower deep analysis.
	#[serde(default)]
	pub deep_analysis: bool,
	/// Extra keywords.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub keywords: Vec<String>,
}
def_intent!(HuntIntent, "hunting", "hunt", "/v1/hunt", [HUNTING_WRITE]);

/// Capture of a single site.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanIntent {
	/// Page to capture.
	pub url: String,
	/// Artifacts to capture (`png`, `pdf`, `har`).
	#[serde(default)]
	pub capture_types: Vec<String>,
	/// Follow redirects before capturing.
	#[serde(default)]
	pub follow_redirects: bool,
}
def_intent!(ScanIntent, "scanner", "site_scan", "/v1/scan", [HUNTING_WRITE]);

/// Risk analysis of a URL.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzeIntent {
	/// URL under analysis.
	pub url: String,
	/// Domain override.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub domain: Option<String>,
	/// Include leaked-credential sources.
	#[serde(default)]
	pub include_leaks: bool,
	/// Run the slower deep analysis.
	#[serde(default)]
	pub deep_analysis: bool,
}
def_intent!(AnalyzeIntent, "analyzer", "analyze_url", "/v1/analyze", [ANALYZE_WRITE]);

/// What a leak search query matches against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeakQueryKind {
	/// Domain name.
	#[default]
	Domain,
	/// Email address.
	Email,
	/// Free keyword.
	Keyword,
}

/// Search of leaked-data sources.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeakSearchIntent {
	/// Query text.
	pub query: String,
	/// How `query` is interpreted.
	#[serde(rename = "type", default)]
	pub kind: LeakQueryKind,
	/// Result cap; zero lets the engine choose.
	#[serde(default)]
	pub max_results: u32,
}
def_intent!(
	LeakSearchIntent,
	"leaks",
	"leak_search",
	"/v1/leaks/search",
	[HUNTING_READ, HUNTING_WRITE]
);

/// Creation of a recurring brand monitor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorJobIntent {
	/// Brand being monitored.
	pub brand_id: Uuid,
	/// Domain or keyword to watch.
	pub target: String,
	/// Minutes between runs.
	pub interval_mins: u32,
	/// Checks to run each interval.
	#[serde(default)]
	pub enabled_checks: Vec<String>,
}
def_intent!(MonitorJobIntent, "monitor", "create_job", "/v1/monitor/jobs", [MONITOR_WRITE]);

/// Stop request for a monitor job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopMonitorJobIntent {
	/// Job to stop.
	pub job_id: Uuid,
}
impl Intent for StopMonitorJobIntent {
	fn tool(&self) -> &str {
		"monitor"
	}

	fn action(&self) -> &str {
		"stop_job"
	}

	fn endpoint(&self) -> Cow<'_, str> {
		Cow::Owned(format!("/v1/monitor/jobs/{}/stop", self.job_id))
	}

	fn required_scopes(&self) -> &[Scope] {
		&[Scope::MONITOR_WRITE]
	}

	fn params(&self) -> Result<Params, EnvelopeError> {
		to_params(self)
	}
}

/// Pass-through call for engine operations without a typed intent.
#[derive(Clone, Debug, PartialEq)]
pub struct ProxyIntent {
	/// Engine tool.
	pub tool: ToolName,
	/// Action within the tool.
	pub action: ActionName,
	/// Endpoint path.
	pub endpoint: String,
	/// Raw parameters.
	pub params: Params,
	/// Scopes of which the caller needs at least one; empty means any authenticated caller.
	pub required_scopes: Vec<Scope>,
	/// Scheduling hint.
	pub priority: Option<Priority>,
	/// Asynchronous execution flag.
	pub async_: Option<bool>,
}
impl ProxyIntent {
	/// Creates a proxy call without parameters or scope requirements.
	pub fn new(
		tool: impl AsRef<str>,
		action: impl AsRef<str>,
		endpoint: impl Into<String>,
	) -> Result<Self, EnvelopeError> {
		Ok(Self {
			tool: ToolName::new(tool)?,
			action: ActionName::new(action)?,
			endpoint: endpoint.into(),
			params: Params::new(),
			required_scopes: Vec::new(),
			priority: None,
			async_: None,
		})
	}

	/// Replaces the parameters.
	pub fn with_params(mut self, params: impl Serialize) -> Result<Self, EnvelopeError> {
		self.params = to_params(params)?;

		Ok(self)
	}

	/// Requires one of `scopes`.
	pub fn requiring(mut self, scopes: impl IntoIterator<Item = Scope>) -> Self {
		self.required_scopes.extend(scopes);

		self
	}

	/// Sets the priority hint.
	pub fn with_priority(mut self, priority: Priority) -> Self {
		self.priority = Some(priority);

		self
	}

	/// Sets the asynchronous execution flag.
	pub fn with_async(mut self, async_: bool) -> Self {
		self.async_ = Some(async_);

		self
	}
}
impl Intent for ProxyIntent {
	fn tool(&self) -> &str {
		&self.tool
	}

	fn action(&self) -> &str {
		&self.action
	}

	fn endpoint(&self) -> Cow<'_, str> {
		Cow::Borrowed(&self.endpoint)
	}

	fn required_scopes(&self) -> &[Scope] {
		&self.required_scopes
	}

	fn params(&self) -> Result<Params, EnvelopeError> {
		Ok(self.params.clone())
	}

	fn priority(&self) -> Option<Priority> {
		self.priority
	}

	fn is_async(&self) -> Option<bool> {
		self.async_
	}
}
