//! Request authentication and authorization.
//!
//! [`AuthMiddleware`] turns an [`InboundRequest`] into a [`RequestContext`]; the `require_*`
//! checks and [`RouteGuard`] then decide whether the bound caller may use a route.

pub mod context;
pub mod request;

pub use context::*;
pub use request::*;

// self
use crate::{
	_prelude::*,
	auth::{ClientId, Role, Scope, TenantId, TokenService, extract_bearer},
	error::{AccessError, AuthError},
	obs::{self, GateOutcome, GateSpan, GateStage},
};

/// Path parameter naming the tenant a route acts on.
pub const TENANT_ID_PARAM: &str = "tenant_id";
/// Path parameter naming the client a route acts on.
pub const CLIENT_ID_PARAM: &str = "client_id";

/// Whether a route needs a verified caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AuthRequirement {
	/// Requests without a valid access token are rejected.
	#[default]
	Required,
	/// Valid tokens are bound; anything else continues anonymously.
	Optional,
}

/// Declarative access requirements of one route.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouteGuard {
	/// Authentication requirement.
	pub auth: AuthRequirement,
	/// Caller needs at least one of these scopes.
	pub any_scopes: Vec<Scope>,
	/// Caller needs every one of these scopes.
	pub all_scopes: Vec<Scope>,
	/// Caller role must be one of these.
	pub roles: Vec<Role>,
	/// Enforce tenant isolation on the tenant named by the request.
	pub tenant_access: bool,
	/// Bind and validate the client named by the request.
	pub client_access: bool,
}
impl RouteGuard {
	/// Route that only needs a verified caller.
	pub fn authenticated() -> Self {
		Self::default()
	}

	/// Route open to anonymous callers.
	pub fn public() -> Self {
		Self { auth: AuthRequirement::Optional, ..Self::default() }
	}

	/// Requires at least one of `scopes`.
	pub fn any_scope(mut self, scopes: impl IntoIterator<Item = Scope>) -> Self {
		self.any_scopes.extend(scopes);

		self
	}

	/// Requires all of `scopes`.
	pub fn all_scopes(mut self, scopes: impl IntoIterator<Item = Scope>) -> Self {
		self.all_scopes.extend(scopes);

		self
	}

	/// Restricts the route to `roles`.
	pub fn roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
		self.roles.extend(roles);

		self
	}

	/// Enables the tenant isolation check.
	pub fn tenant_access(mut self) -> Self {
		self.tenant_access = true;

		self
	}

	/// Enables the client binding check.
	pub fn client_access(mut self) -> Self {
		self.client_access = true;

		self
	}

	fn has_requirements(&self) -> bool {
		!self.any_scopes.is_empty()
			|| !self.all_scopes.is_empty()
			|| !self.roles.is_empty()
			|| self.tenant_access
			|| self.client_access
	}
}

/// Verifies bearer tokens and evaluates route guards.
#[derive(Clone, Debug)]
pub struct AuthMiddleware {
	tokens: Arc<TokenService>,
}
impl AuthMiddleware {
	/// Creates a middleware that verifies tokens with `tokens`.
	pub fn new(tokens: Arc<TokenService>) -> Self {
		Self { tokens }
	}

	/// Token service backing this middleware.
	pub fn tokens(&self) -> &TokenService {
		&self.tokens
	}

	/// Requires a valid access or API token and binds its claims.
	///
	/// Also binds `X-Client-ID` when present and `X-Request-ID`, generating one when the header
	/// is absent or unusable.
	pub fn authenticate(&self, request: &InboundRequest) -> Result<RequestContext> {
		let _guard = GateSpan::new(GateStage::Authenticate, "authenticate").entered();

		obs::record_gate_outcome(GateStage::Authenticate, GateOutcome::Attempt);

		let mut ctx = RequestContext::anonymous(request.request_id());
		let result = self.authenticate_inner(request, &mut ctx);

		obs::record_gate_outcome(GateStage::Authenticate, GateOutcome::of(&result));

		if let Err(e) = &result {
			tracing::debug!(
				method = %request.method,
				path = %request.path,
				stage = %ctx.stage(),
				error = %e,
				"authentication failed"
			);
		}

		result.map(|()| ctx)
	}

	/// Binds claims when a valid token is present; otherwise continues anonymously.
	pub fn optional_auth(&self, request: &InboundRequest) -> RequestContext {
		if request.authorization().is_none() {
			return RequestContext::anonymous(request.request_id());
		}

		self.authenticate(request)
			.unwrap_or_else(|_| RequestContext::anonymous(request.request_id()))
	}

	/// Authenticates according to `guard.auth`, then applies the remaining requirements.
	pub fn admit(&self, request: &InboundRequest, guard: &RouteGuard) -> Result<RequestContext> {
		let mut ctx = match guard.auth {
			AuthRequirement::Required => self.authenticate(request)?,
			AuthRequirement::Optional => self.optional_auth(request),
		};

		authorize(&mut ctx, request, guard)?;

		Ok(ctx)
	}

	fn authenticate_inner(
		&self,
		request: &InboundRequest,
		ctx: &mut RequestContext,
	) -> Result<()> {
		let token = extract_bearer(request.authorization())?;

		ctx.advance(AuthStage::TokenExtracted);

		let claims = self.tokens.validate(token)?;

		if !claims.token_type.authorizes_calls() {
			return Err(AuthError::WrongTokenType { found: claims.token_type }.into());
		}

		ctx.bind_claims(claims);

		if let Some(raw) = request.header(X_CLIENT_ID) {
			ctx.bind_client(ClientId::parse(raw)?);
		}

		Ok(())
	}
}

/// Applies every requirement of `guard` to an already authenticated (or anonymous) context.
///
/// Checks run in order: authentication, role, any-scope, all-scopes, tenant, client. The first
/// failure wins.
pub fn authorize(
	ctx: &mut RequestContext,
	request: &InboundRequest,
	guard: &RouteGuard,
) -> Result<()> {
	let _guard = GateSpan::new(GateStage::Authorize, "authorize").entered();

	obs::record_gate_outcome(GateStage::Authorize, GateOutcome::Attempt);

	let result = authorize_inner(ctx, request, guard);

	obs::record_gate_outcome(GateStage::Authorize, GateOutcome::of(&result));

	match &result {
		Ok(()) => ctx.advance(AuthStage::Authorized),
		Err(e) => tracing::debug!(
			request_id = %ctx.request_id(),
			error = %e,
			"authorization failed"
		),
	}

	result
}

fn authorize_inner(
	ctx: &mut RequestContext,
	request: &InboundRequest,
	guard: &RouteGuard,
) -> Result<()> {
	if guard.auth == AuthRequirement::Required || guard.has_requirements() {
		ctx.require_claims()?;
	}
	if !guard.roles.is_empty() {
		require_role(ctx, &guard.roles)?;
	}
	if !guard.any_scopes.is_empty() {
		require_scope(ctx, &guard.any_scopes)?;
	}
	if !guard.all_scopes.is_empty() {
		require_all_scopes(ctx, &guard.all_scopes)?;
	}
	if guard.tenant_access {
		require_tenant_access(ctx, request)?;
	}
	if guard.client_access {
		require_client_access(ctx, request)?;
	}

	Ok(())
}

/// Passes when the caller holds at least one of `required`; admins always pass.
pub fn require_scope(ctx: &RequestContext, required: &[Scope]) -> Result<()> {
	let claims = ctx.require_claims()?;

	if claims.has_any_scope(required) {
		return Ok(());
	}

	Err(AccessError::MissingScope { missing: required.to_vec() }.into())
}

/// Passes when the caller holds every scope in `required`; admins always pass.
pub fn require_all_scopes(ctx: &RequestContext, required: &[Scope]) -> Result<()> {
	let claims = ctx.require_claims()?;

	if claims.has_all_scopes(required) {
		return Ok(());
	}

	Err(AccessError::MissingScope { missing: claims.scopes.missing(required) }.into())
}

/// Passes when the caller's role is one of `roles`.
pub fn require_role(ctx: &RequestContext, roles: &[Role]) -> Result<()> {
	let claims = ctx.require_claims()?;

	if roles.contains(&claims.role) {
		return Ok(());
	}

	Err(AccessError::RoleNotAllowed { role: claims.role }.into())
}

/// Enforces tenant isolation for the tenant named by the request.
///
/// The tenant comes from the `tenant_id` path parameter, falling back to `X-Tenant-ID`. A
/// request naming no tenant acts on the caller's own. Admins may cross tenants, in which case
/// the context's effective tenant becomes the requested one.
pub fn require_tenant_access(ctx: &mut RequestContext, request: &InboundRequest) -> Result<()> {
	let claims = ctx.shared_claims()?;
	let Some(raw) = request.path_param(TENANT_ID_PARAM).or_else(|| request.header(X_TENANT_ID))
	else {
		return Ok(());
	};
	let requested = TenantId::parse(raw)?;

	if requested == claims.tenant_id {
		return Ok(());
	}
	if !claims.is_admin() {
		tracing::warn!(
			user_id = %claims.user_id,
			tenant_id = %claims.tenant_id,
			requested = %requested,
			"cross-tenant access denied"
		);

		return Err(AccessError::TenantMismatch { requested }.into());
	}

	tracing::info!(
		user_id = %claims.user_id,
		tenant_id = %claims.tenant_id,
		requested = %requested,
		"admin acting on another tenant"
	);
	ctx.act_on_tenant(requested);

	Ok(())
}

/// Binds the client named by the `client_id` path parameter or `X-Client-ID`.
pub fn require_client_access(ctx: &mut RequestContext, request: &InboundRequest) -> Result<()> {
	ctx.require_claims()?;

	let Some(raw) = request.path_param(CLIENT_ID_PARAM).or_else(|| request.header(X_CLIENT_ID))
	else {
		return Ok(());
	};

	ctx.bind_client(ClientId::parse(raw)?);

	Ok(())
}
