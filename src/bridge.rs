//! Protocol bridge to the downstream engine.
//!
//! Envelopes are composed from a [`RequestContext`](crate::guard::RequestContext) and a typed
//! [`Intent`], then executed by [`BridgeClient`] over any [`BridgeHttpClient`] transport.

pub mod client;
pub mod envelope;
pub mod intent;
pub mod metrics;

pub use client::*;
pub use envelope::*;
pub use intent::*;
pub use metrics::*;

// self
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;
use crate::{_prelude::*, error::BridgeError};
#[cfg(feature = "reqwest")] use crate::error::ConfigError;

/// Bridge client backed by reqwest.
#[cfg(feature = "reqwest")]
pub type ReqwestBridgeClient = BridgeClient<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Maps transport-specific errors into [`BridgeError`].
///
/// Mappers decide which failures count as the engine being unavailable (retried and surfaced as
/// 503 once exhausted) and which are generic transport failures (surfaced as 502).
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an error emitted by the transport into a bridge error.
	fn map_transport_error(&self, error: E) -> BridgeError;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(&self, err: ReqwestError) -> BridgeError {
		if err.is_timeout() {
			return BridgeError::Unavailable {
				status: err.status().map(|status| status.as_u16()),
				reason: "request timed out".into(),
			};
		}
		if err.is_connect() {
			return BridgeError::Unavailable { status: None, reason: "connection failed".into() };
		}

		BridgeError::transport(err)
	}
}

#[cfg(feature = "reqwest")]
impl ReqwestBridgeClient {
	/// Builds a reqwest-backed client whose per-request timeout follows `config.timeout`.
	pub fn with_reqwest(config: BridgeConfig) -> Result<Self, ConfigError> {
		let http_client = ReqwestHttpClient::new(config.timeout)?;

		Self::new(config, http_client, ReqwestTransportErrorMapper)
	}
}
