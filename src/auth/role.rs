//! Roles assigned to tenant users.

// self
use crate::_prelude::*;

/// Role carried by every identity token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	/// Tenant administrator; satisfies every scope check and may cross tenants.
	Admin,
	/// Manages users and clients inside a tenant.
	Manager,
	/// Operates hunting, monitoring and analysis tools.
	Analyst,
	/// Read-only user.
	Viewer,
	/// Machine identity behind a long-lived API token.
	Api,
}
impl Role {
	/// Returns the wire label.
	pub const fn as_str(self) -> &'static str {
		match self {
			Role::Admin => "admin",
			Role::Manager => "manager",
			Role::Analyst => "analyst",
			Role::Viewer => "viewer",
			Role::Api => "api",
		}
	}

	/// Returns true for the admin role.
	pub const fn is_admin(self) -> bool {
		matches!(self, Role::Admin)
	}

	/// Returns true for roles allowed to manage users and clients.
	pub const fn can_manage(self) -> bool {
		matches!(self, Role::Admin | Role::Manager)
	}
}
impl Display for Role {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
