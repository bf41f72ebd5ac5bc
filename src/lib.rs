//! Access-control and dispatch core for multi-tenant API gateways: signed identity tokens,
//! tenant-isolated guards, sliding-window admission, and a retrying protocol bridge in one crate.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod bridge;
pub mod config;
pub mod error;
pub mod gateway;
pub mod guard;
pub mod http;
pub mod obs;
pub mod rate_limit;
pub mod response;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and identity fixtures for tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::auth::{
		Principal, Role, Scope, ScopeSet, TenantId, TokenConfig, TokenService, UserId,
	};

	/// Signing secret shared by test token services.
	pub const TEST_SECRET: &str = "test-secret-0123456789abcdefghijklmnop";

	/// Builds a token service signing with [`TEST_SECRET`].
	pub fn test_token_service() -> TokenService {
		TokenService::new(TokenConfig::new(TEST_SECRET))
			.expect("Test token configuration should be valid.")
	}

	/// Analyst of a fresh tenant holding `scopes`.
	pub fn analyst(scopes: impl IntoIterator<Item = Scope>) -> Principal {
		Principal::new(UserId::random(), TenantId::random(), Role::Analyst, ScopeSet::new(scopes))
	}

	/// Viewer of a fresh tenant holding `hunting:read`.
	pub fn viewer() -> Principal {
		Principal::new(
			UserId::random(),
			TenantId::random(),
			Role::Viewer,
			ScopeSet::new([Scope::HUNTING_READ]),
		)
	}

	/// Admin of a fresh tenant without explicit scopes.
	pub fn admin() -> Principal {
		Principal::new(UserId::random(), TenantId::random(), Role::Admin, ScopeSet::default())
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
		time::Duration as StdDuration,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {base64 as _, httpmock as _};
