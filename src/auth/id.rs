//! Strongly typed identifiers enforced across the gateway domain.
//!
//! Tenants, users and clients are UUID-backed; request ids and the tool/action names carried by
//! protocol envelopes are validated strings.

// std
use std::{borrow::Borrow, ops::Deref};
// crates.io
use uuid::Uuid;
// self
use crate::_prelude::*;

macro_rules! def_uuid_id {
	($name:ident, $doc:literal, $kind:literal) => {
		#[doc = $doc]
		#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(Uuid);
		impl $name {
			/// Parses an identifier from its hyphenated UUID form.
			pub fn parse(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				let view = value.as_ref();

				if view.is_empty() {
					return Err(IdentifierError::Empty { kind: $kind });
				}

				Uuid::try_parse(view)
					.map(Self)
					.map_err(|_| IdentifierError::NotUuid { kind: $kind, value: view.to_owned() })
			}

			/// Generates a fresh random identifier.
			pub fn random() -> Self {
				Self(Uuid::new_v4())
			}

			/// Returns the wrapped UUID.
			pub const fn as_uuid(&self) -> &Uuid {
				&self.0
			}
		}
		impl From<Uuid> for $name {
			fn from(value: Uuid) -> Self {
				Self(value)
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0.to_string()
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				Self::parse(value)
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				Display::fmt(&self.0, f)
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::parse(s)
			}
		}
	};
}

macro_rules! def_name_id {
	($name:ident, $doc:literal, $kind:literal, $max:expr) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Creates a new identifier after validation.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				let view = value.as_ref();

				validate_name($kind, view, $max)?;

				Ok(Self(view.to_owned()))
			}

			/// Returns the identifier as a string slice.
			pub fn as_str(&self) -> &str {
				&self.0
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				validate_name($kind, &value, $max)?;

				Ok(Self(value))
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
	};
}

const REQUEST_ID_MAX_LEN: usize = 128;
const NAME_MAX_LEN: usize = 64;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (tenant, user, client, request, tool, action).
		kind: &'static str,
	},
	/// The identifier is not a hyphenated UUID.
	#[error("{kind} identifier `{value}` is not a valid UUID.")]
	NotUuid {
		/// Kind of identifier.
		kind: &'static str,
		/// Rejected input.
		value: String,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier.
		kind: &'static str,
	},
	/// The identifier contains characters outside `[A-Za-z0-9_.:-]`.
	#[error("{kind} identifier contains unsupported characters.")]
	UnsupportedCharacter {
		/// Kind of identifier.
		kind: &'static str,
	},
	/// The identifier exceeded the allowed character count.
	#[error("{kind} identifier exceeds {max} characters.")]
	TooLong {
		/// Kind of identifier.
		kind: &'static str,
		/// Maximum permitted character count.
		max: usize,
	},
}
impl IdentifierError {
	/// Returns the identifier kind that failed validation.
	pub const fn kind(&self) -> &'static str {
		match self {
			Self::Empty { kind }
			| Self::NotUuid { kind, .. }
			| Self::ContainsWhitespace { kind }
			| Self::UnsupportedCharacter { kind }
			| Self::TooLong { kind, .. } => kind,
		}
	}
}

def_uuid_id! { TenantId, "Unique identifier for a gateway tenant.", "Tenant" }
def_uuid_id! { UserId, "Unique identifier for an authenticated user.", "User" }
def_uuid_id! { ClientId, "Identifier for an end customer managed by a tenant.", "Client" }

def_name_id! { RequestId, "Correlation id of one inbound request.", "Request", REQUEST_ID_MAX_LEN }
def_name_id! { ToolName, "Name of a downstream tool such as `hunting`.", "Tool", NAME_MAX_LEN }
def_name_id! { ActionName, "Action offered by a downstream tool.", "Action", NAME_MAX_LEN }

impl RequestId {
	/// Generates a random request id.
	pub fn generate() -> Self {
		Self(Uuid::new_v4().to_string())
	}
}

fn validate_name(kind: &'static str, view: &str, max: usize) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if !view.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')) {
		return Err(IdentifierError::UnsupportedCharacter { kind });
	}
	if view.len() > max {
		return Err(IdentifierError::TooLong { kind, max });
	}

	Ok(())
}
