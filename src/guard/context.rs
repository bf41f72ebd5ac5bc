//! Per-request authorization context.

// self
use crate::{
	_prelude::*,
	auth::{Claims, ClientId, RequestId, TenantId},
	error::AuthError,
};

/// Progress of a request through the authorization pipeline.
///
/// Stages only move forward: `Unauthenticated → TokenExtracted → Validated → Authorized →
/// Dispatched`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AuthStage {
	/// No credentials have been inspected, or none were presented.
	Unauthenticated,
	/// A bearer token was found in the request.
	TokenExtracted,
	/// The token verified and its claims are bound.
	Validated,
	/// Route requirements passed.
	Authorized,
	/// The request was handed to the downstream engine.
	Dispatched,
}
impl AuthStage {
	/// Stable label used in spans and logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			AuthStage::Unauthenticated => "unauthenticated",
			AuthStage::TokenExtracted => "token_extracted",
			AuthStage::Validated => "validated",
			AuthStage::Authorized => "authorized",
			AuthStage::Dispatched => "dispatched",
		}
	}
}
impl Display for AuthStage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Identity and tenancy bound to a single inbound request.
///
/// The effective tenant starts as the caller's home tenant; only an admin crossing tenants
/// through [`require_tenant_access`](crate::guard::require_tenant_access) changes it.
#[derive(Clone, Debug)]
pub struct RequestContext {
	claims: Option<Arc<Claims>>,
	tenant_id: Option<TenantId>,
	client_id: Option<ClientId>,
	request_id: RequestId,
	stage: AuthStage,
}
impl RequestContext {
	/// Context for a request without credentials.
	pub fn anonymous(request_id: RequestId) -> Self {
		Self {
			claims: None,
			tenant_id: None,
			client_id: None,
			request_id,
			stage: AuthStage::Unauthenticated,
		}
	}

	/// Context for a request whose token verified into `claims`.
	pub fn authenticated(claims: Claims, request_id: RequestId) -> Self {
		let mut ctx = Self::anonymous(request_id);

		ctx.bind_claims(claims);

		ctx
	}

	/// Claims of the caller, if authenticated.
	pub fn claims(&self) -> Option<&Claims> {
		self.claims.as_deref()
	}

	/// Claims of the caller, or [`AuthError::MissingToken`].
	pub fn require_claims(&self) -> Result<&Claims, AuthError> {
		self.claims().ok_or(AuthError::MissingToken)
	}

	/// Whether claims are bound.
	pub fn is_authenticated(&self) -> bool {
		self.claims.is_some()
	}

	/// Tenant the request acts on.
	pub fn tenant_id(&self) -> Option<TenantId> {
		self.tenant_id
	}

	/// Tenant recorded in the caller's token.
	pub fn home_tenant_id(&self) -> Option<TenantId> {
		self.claims().map(|claims| claims.tenant_id)
	}

	/// Client named by the request, if any.
	pub fn client_id(&self) -> Option<ClientId> {
		self.client_id
	}

	/// Correlation id of the request.
	pub fn request_id(&self) -> &RequestId {
		&self.request_id
	}

	/// Current pipeline stage.
	pub fn stage(&self) -> AuthStage {
		self.stage
	}

	/// Records that the request reached the downstream engine.
	pub fn mark_dispatched(&mut self) {
		self.advance(AuthStage::Dispatched);
	}

	pub(crate) fn shared_claims(&self) -> Result<Arc<Claims>, AuthError> {
		self.claims.clone().ok_or(AuthError::MissingToken)
	}

	pub(crate) fn act_on_tenant(&mut self, tenant: TenantId) {
		self.tenant_id = Some(tenant);
	}

	pub(crate) fn bind_claims(&mut self, claims: Claims) {
		self.tenant_id = Some(claims.tenant_id);
		self.claims = Some(Arc::new(claims));

		self.advance(AuthStage::Validated);
	}

	pub(crate) fn bind_client(&mut self, client: ClientId) {
		self.client_id = Some(client);
	}

	pub(crate) fn advance(&mut self, next: AuthStage) {
		if next > self.stage {
			self.stage = next;
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn stages_only_move_forward() {
		let mut ctx = RequestContext::anonymous(RequestId::generate());

		ctx.advance(AuthStage::Authorized);
		ctx.advance(AuthStage::TokenExtracted);

		assert_eq!(ctx.stage(), AuthStage::Authorized);

		ctx.mark_dispatched();

		assert_eq!(ctx.stage(), AuthStage::Dispatched);
	}

	#[test]
	fn anonymous_context_has_no_claims() {
		let ctx = RequestContext::anonymous(RequestId::generate());

		assert!(!ctx.is_authenticated());
		assert_eq!(
			ctx.require_claims().expect_err("Claims must be absent."),
			AuthError::MissingToken
		);
		assert_eq!(ctx.tenant_id(), None);
	}
}
