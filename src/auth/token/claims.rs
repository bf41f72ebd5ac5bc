//! Identity claims embedded in signed tokens.

// self
use crate::{
	_prelude::*,
	auth::{Role, Scope, ScopeSet, TenantId, UserId},
};

/// Token kinds; the kind decides where a token may be used.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
	/// Short-lived token authorizing business calls.
	Access,
	/// Long-lived token that can only be exchanged for a new access token.
	Refresh,
	/// Machine token with a caller-chosen lifetime; authorizes business calls.
	Api,
}
impl TokenKind {
	/// Returns the wire label.
	pub const fn as_str(self) -> &'static str {
		match self {
			TokenKind::Access => "access",
			TokenKind::Refresh => "refresh",
			TokenKind::Api => "api",
		}
	}

	/// Returns true when the kind may authorize business calls.
	pub const fn authorizes_calls(self) -> bool {
		matches!(self, TokenKind::Access | TokenKind::Api)
	}
}
impl Display for TokenKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// The identity a token is issued for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
	/// Authenticated user.
	pub user_id: UserId,
	/// Tenant the user belongs to.
	pub tenant_id: TenantId,
	/// Role inside the tenant.
	pub role: Role,
	/// Granted scopes.
	pub scopes: ScopeSet,
	/// Optional email address.
	pub email: Option<String>,
	/// Optional display name.
	pub name: Option<String>,
}
impl Principal {
	/// Creates a principal without profile fields.
	pub fn new(user_id: UserId, tenant_id: TenantId, role: Role, scopes: ScopeSet) -> Self {
		Self { user_id, tenant_id, role, scopes, email: None, name: None }
	}

	/// Attaches an email address.
	pub fn with_email(mut self, email: impl Into<String>) -> Self {
		self.email = Some(email.into());

		self
	}

	/// Attaches a display name.
	pub fn with_name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());

		self
	}
}

/// Decoded, validated token claims.
///
/// The record is flat; registered claims sit beside the gateway's private ones.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
	/// Unique token id.
	pub jti: String,
	/// Subject, always the user id.
	pub sub: String,
	/// Issuer.
	pub iss: String,
	/// Audience.
	pub aud: String,
	/// Issued-at, seconds since the Unix epoch.
	pub iat: i64,
	/// Not-before, seconds since the Unix epoch.
	pub nbf: i64,
	/// Expiry, seconds since the Unix epoch.
	pub exp: i64,
	/// Authenticated user.
	pub user_id: UserId,
	/// Tenant the user belongs to.
	pub tenant_id: TenantId,
	/// Role inside the tenant.
	pub role: Role,
	/// Granted scopes.
	pub scopes: ScopeSet,
	/// Token kind.
	pub token_type: TokenKind,
	/// Optional email address.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
	/// Optional display name.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
}
impl Claims {
	/// Returns true for admin identities.
	pub fn is_admin(&self) -> bool {
		self.role.is_admin()
	}

	/// Returns true for roles allowed to manage users and clients.
	pub fn can_manage(&self) -> bool {
		self.role.can_manage()
	}

	/// Returns true when the scope is granted or the identity is an admin.
	pub fn has_scope(&self, scope: Scope) -> bool {
		self.is_admin() || self.scopes.contains(scope)
	}

	/// Returns true when any of `required` is granted or the identity is an admin.
	pub fn has_any_scope(&self, required: &[Scope]) -> bool {
		self.is_admin() || self.scopes.contains_any(required)
	}

	/// Returns true when all of `required` are granted or the identity is an admin.
	pub fn has_all_scopes(&self, required: &[Scope]) -> bool {
		self.is_admin() || self.scopes.contains_all(required)
	}

	/// Expiry as a timestamp.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		OffsetDateTime::from_unix_timestamp(self.exp).ok()
	}

	/// Rebuilds the principal the token was issued for.
	pub fn principal(&self) -> Principal {
		Principal {
			user_id: self.user_id,
			tenant_id: self.tenant_id,
			role: self.role,
			scopes: self.scopes.clone(),
			email: self.email.clone(),
			name: self.name.clone(),
		}
	}
}
