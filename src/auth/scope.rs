//! Scope modeling helpers used across the gateway.
//!
//! A scope is a `<resource>:<access>` pair. Scope sets are deduplicated and sorted so equality,
//! ordering and hashing stay consistent regardless of the order scopes were granted in.

// std
use std::{collections::BTreeSet, slice::Iter};
// crates.io
use serde::{Deserializer, Serializer, de::Error as DeError, ser::SerializeSeq};
// self
use crate::_prelude::*;

/// Errors emitted when parsing scopes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ScopeParseError {
	/// Empty scope entries are not allowed.
	#[error("Scope entries cannot be empty.")]
	Empty,
	/// Scopes cannot contain embedded whitespace characters.
	#[error("Scope contains whitespace: {scope}.")]
	ContainsWhitespace {
		/// The offending scope string.
		scope: String,
	},
	/// The scope is not of the form `<resource>:<access>`.
	#[error("Scope `{scope}` is not of the form <resource>:<read|write>.")]
	MissingSeparator {
		/// The offending scope string.
		scope: String,
	},
	/// The resource part is not a known resource.
	#[error("Scope `{scope}` names an unknown resource.")]
	UnknownResource {
		/// The offending scope string.
		scope: String,
	},
	/// The access part is neither `read` nor `write`.
	#[error("Scope `{scope}` names an unknown access level.")]
	UnknownAccess {
		/// The offending scope string.
		scope: String,
	},
}

/// Protected resource families.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Resource {
	/// Threat hunting and site scans.
	Hunting,
	/// Continuous monitoring jobs.
	Monitor,
	/// URL analysis.
	Analyze,
	/// Alert feeds.
	Alerts,
	/// Tenant client management.
	Clients,
	/// Brand management.
	Brands,
	/// Reports.
	Reports,
	/// Tenant administration.
	Admin,
}
impl Resource {
	/// Every resource, in declaration order.
	pub const ALL: [Resource; 8] = [
		Resource::Hunting,
		Resource::Monitor,
		Resource::Analyze,
		Resource::Alerts,
		Resource::Clients,
		Resource::Brands,
		Resource::Reports,
		Resource::Admin,
	];

	/// Returns the wire label.
	pub const fn as_str(self) -> &'static str {
		match self {
			Resource::Hunting => "hunting",
			Resource::Monitor => "monitor",
			Resource::Analyze => "analyze",
			Resource::Alerts => "alerts",
			Resource::Clients => "clients",
			Resource::Brands => "brands",
			Resource::Reports => "reports",
			Resource::Admin => "admin",
		}
	}

	fn from_label(label: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|resource| resource.as_str() == label)
	}
}
impl Display for Resource {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Access level granted on a resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Access {
	/// Read-only access.
	Read,
	/// Mutating access.
	Write,
}
impl Access {
	/// Returns the wire label.
	pub const fn as_str(self) -> &'static str {
		match self {
			Access::Read => "read",
			Access::Write => "write",
		}
	}
}
impl Display for Access {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// A single `<resource>:<access>` permission.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Scope {
	/// Resource the scope applies to.
	pub resource: Resource,
	/// Granted access level.
	pub access: Access,
}
impl Scope {
	/// `alerts:read`
	pub const ALERTS_READ: Scope = Scope::new(Resource::Alerts, Access::Read);
	/// `alerts:write`
	pub const ALERTS_WRITE: Scope = Scope::new(Resource::Alerts, Access::Write);
	/// `analyze:read`
	pub const ANALYZE_READ: Scope = Scope::new(Resource::Analyze, Access::Read);
	/// `analyze:write`
	pub const ANALYZE_WRITE: Scope = Scope::new(Resource::Analyze, Access::Write);
	/// `brands:read`
	pub const BRANDS_READ: Scope = Scope::new(Resource::Brands, Access::Read);
	/// `brands:write`
	pub const BRANDS_WRITE: Scope = Scope::new(Resource::Brands, Access::Write);
	/// `clients:read`
	pub const CLIENTS_READ: Scope = Scope::new(Resource::Clients, Access::Read);
	/// `clients:write`
	pub const CLIENTS_WRITE: Scope = Scope::new(Resource::Clients, Access::Write);
	/// `hunting:read`
	pub const HUNTING_READ: Scope = Scope::new(Resource::Hunting, Access::Read);
	/// `hunting:write`
	pub const HUNTING_WRITE: Scope = Scope::new(Resource::Hunting, Access::Write);
	/// `monitor:read`
	pub const MONITOR_READ: Scope = Scope::new(Resource::Monitor, Access::Read);
	/// `monitor:write`
	pub const MONITOR_WRITE: Scope = Scope::new(Resource::Monitor, Access::Write);
	/// `reports:read`
	pub const REPORTS_READ: Scope = Scope::new(Resource::Reports, Access::Read);
	/// `reports:write`
	pub const REPORTS_WRITE: Scope = Scope::new(Resource::Reports, Access::Write);
	/// `admin:read`
	pub const ADMIN_READ: Scope = Scope::new(Resource::Admin, Access::Read);
	/// `admin:write`
	pub const ADMIN_WRITE: Scope = Scope::new(Resource::Admin, Access::Write);

	/// Builds a scope from its parts.
	pub const fn new(resource: Resource, access: Access) -> Self {
		Self { resource, access }
	}
}
impl Debug for Scope {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Scope({self})")
	}
}
impl Display for Scope {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}:{}", self.resource, self.access)
	}
}
impl FromStr for Scope {
	type Err = ScopeParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.is_empty() {
			return Err(ScopeParseError::Empty);
		}
		if s.chars().any(char::is_whitespace) {
			return Err(ScopeParseError::ContainsWhitespace { scope: s.to_owned() });
		}

		let (resource, access) = s
			.split_once(':')
			.ok_or_else(|| ScopeParseError::MissingSeparator { scope: s.to_owned() })?;
		let resource = Resource::from_label(resource)
			.ok_or_else(|| ScopeParseError::UnknownResource { scope: s.to_owned() })?;
		let access = match access {
			"read" => Access::Read,
			"write" => Access::Write,
			_ => return Err(ScopeParseError::UnknownAccess { scope: s.to_owned() }),
		};

		Ok(Self { resource, access })
	}
}
impl TryFrom<String> for Scope {
	type Error = ScopeParseError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		value.parse()
	}
}
impl From<Scope> for String {
	fn from(value: Scope) -> Self {
		value.to_string()
	}
}

/// Normalized, immutable set of scopes.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeSet {
	scopes: Arc<[Scope]>,
}
impl ScopeSet {
	/// Creates a normalized scope set from typed scopes.
	pub fn new<I>(scopes: I) -> Self
	where
		I: IntoIterator<Item = Scope>,
	{
		let set = scopes.into_iter().collect::<BTreeSet<_>>();

		Self { scopes: Arc::from(set.into_iter().collect::<Vec<_>>()) }
	}

	/// Parses and normalizes a scope set from string labels.
	pub fn parse<I, S>(scopes: I) -> Result<Self, ScopeParseError>
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let parsed = scopes
			.into_iter()
			.map(|scope| scope.as_ref().parse::<Scope>())
			.collect::<Result<Vec<_>, _>>()?;

		Ok(Self::new(parsed))
	}

	/// Number of distinct scopes.
	pub fn len(&self) -> usize {
		self.scopes.len()
	}

	/// Returns true if no scopes are defined.
	pub fn is_empty(&self) -> bool {
		self.scopes.is_empty()
	}

	/// Returns true if the set contains the provided scope.
	pub fn contains(&self, scope: Scope) -> bool {
		self.scopes.binary_search(&scope).is_ok()
	}

	/// Returns true when at least one of `required` is present.
	///
	/// An empty requirement is trivially satisfied.
	pub fn contains_any(&self, required: &[Scope]) -> bool {
		required.is_empty() || required.iter().any(|scope| self.contains(*scope))
	}

	/// Returns true when every scope in `required` is present.
	pub fn contains_all(&self, required: &[Scope]) -> bool {
		required.iter().all(|scope| self.contains(*scope))
	}

	/// Returns the scopes in `required` that this set lacks, preserving their order.
	pub fn missing(&self, required: &[Scope]) -> Vec<Scope> {
		required.iter().copied().filter(|scope| !self.contains(*scope)).collect()
	}

	/// Iterator over normalized scopes.
	pub fn iter(&self) -> Iter<'_, Scope> {
		self.scopes.iter()
	}

	/// Returns the underlying sorted slice.
	pub fn as_slice(&self) -> &[Scope] {
		&self.scopes
	}

	/// Returns the normalized string labels.
	pub fn labels(&self) -> Vec<String> {
		self.scopes.iter().map(ToString::to_string).collect()
	}
}
impl Debug for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("ScopeSet").field(&self.labels()).finish()
	}
}
impl Display for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.labels().join(" "))
	}
}
impl FromIterator<Scope> for ScopeSet {
	fn from_iter<T: IntoIterator<Item = Scope>>(iter: T) -> Self {
		Self::new(iter)
	}
}
impl<'a> IntoIterator for &'a ScopeSet {
	type IntoIter = Iter<'a, Scope>;
	type Item = &'a Scope;

	fn into_iter(self) -> Self::IntoIter {
		self.scopes.iter()
	}
}
impl FromStr for ScopeSet {
	type Err = ScopeParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.is_empty() {
			return Ok(Self::default());
		}
		if s.chars().all(char::is_whitespace) {
			return Err(ScopeParseError::Empty);
		}

		Self::parse(s.split_whitespace())
	}
}
impl Serialize for ScopeSet {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		let mut seq = serializer.serialize_seq(Some(self.scopes.len()))?;

		for scope in self.scopes.iter() {
			seq.serialize_element(&scope.to_string())?;
		}

		seq.end()
	}
}
impl<'de> Deserialize<'de> for ScopeSet {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let values = <Vec<String>>::deserialize(deserializer)?;

		ScopeSet::parse(values).map_err(DeError::custom)
	}
}

/// Renders scopes as a comma separated list for messages.
pub fn join_scopes(scopes: &[Scope]) -> String {
	scopes.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn scopes_parse_known_pairs_only() {
		assert_eq!("hunting:write".parse::<Scope>(), Ok(Scope::HUNTING_WRITE));
		assert_eq!("admin:read".parse::<Scope>(), Ok(Scope::ADMIN_READ));
		assert!(matches!(
			"hunting".parse::<Scope>(),
			Err(ScopeParseError::MissingSeparator { .. })
		));
		assert!(matches!(
			"payroll:read".parse::<Scope>(),
			Err(ScopeParseError::UnknownResource { .. })
		));
		assert!(matches!(
			"hunting:delete".parse::<Scope>(),
			Err(ScopeParseError::UnknownAccess { .. })
		));
		assert_eq!("".parse::<Scope>(), Err(ScopeParseError::Empty));
		assert!(matches!(
			" hunting:read".parse::<Scope>(),
			Err(ScopeParseError::ContainsWhitespace { .. })
		));
	}

	#[test]
	fn scopes_normalize_and_compare_stably() {
		let lhs = ScopeSet::parse(["monitor:read", "hunting:read", "hunting:read"])
			.expect("Left-hand scope set should be valid.");
		let rhs = ScopeSet::parse(["hunting:read", "monitor:read"])
			.expect("Right-hand scope set should be valid.");

		assert_eq!(lhs, rhs);
		assert_eq!(lhs.len(), 2);
		assert_eq!(lhs.to_string(), "hunting:read monitor:read");
	}

	#[test]
	fn any_all_and_missing_follow_set_semantics() {
		let granted = ScopeSet::new([Scope::HUNTING_READ, Scope::MONITOR_READ]);

		assert!(granted.contains_any(&[Scope::HUNTING_WRITE, Scope::HUNTING_READ]));
		assert!(!granted.contains_any(&[Scope::HUNTING_WRITE]));
		assert!(granted.contains_any(&[]));
		assert!(granted.contains_all(&[Scope::HUNTING_READ, Scope::MONITOR_READ]));
		assert!(!granted.contains_all(&[Scope::HUNTING_READ, Scope::ANALYZE_WRITE]));
		assert_eq!(
			granted.missing(&[Scope::ANALYZE_WRITE, Scope::HUNTING_READ, Scope::MONITOR_WRITE]),
			vec![Scope::ANALYZE_WRITE, Scope::MONITOR_WRITE]
		);
	}

	#[test]
	fn serde_uses_string_labels() {
		let set = ScopeSet::new([Scope::REPORTS_READ, Scope::ALERTS_WRITE]);
		let json = serde_json::to_string(&set).expect("Scope set should serialize.");

		assert_eq!(json, r#"["alerts:write","reports:read"]"#);

		let back: ScopeSet = serde_json::from_str(&json).expect("Scope set should deserialize.");

		assert_eq!(back, set);
		assert!(serde_json::from_str::<ScopeSet>(r#"["root:write"]"#).is_err());
	}

	#[test]
	fn whitespace_delimited_strings_parse() {
		assert!(ScopeSet::from_str("").expect("Empty input is an empty set.").is_empty());
		assert!(ScopeSet::from_str("   ").is_err());
		assert_eq!(
			ScopeSet::from_str("brands:read clients:write")
				.expect("Scope string should parse successfully.")
				.len(),
			2
		);
	}
}
