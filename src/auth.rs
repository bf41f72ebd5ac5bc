//! Auth-domain identifiers, roles, scopes, and identity tokens.

pub mod id;
pub mod role;
pub mod scope;
pub mod token;

pub use id::*;
pub use role::*;
pub use scope::*;
pub use token::{claims::*, secret::*, service::*};
