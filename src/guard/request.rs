//! Framework-agnostic view of an inbound request.

// std
use std::net::IpAddr;
// crates.io
use http::{HeaderMap, HeaderName, HeaderValue, Method, header::AUTHORIZATION};
// self
use crate::{_prelude::*, auth::RequestId};

/// `X-Client-ID`
pub const X_CLIENT_ID: HeaderName = HeaderName::from_static("x-client-id");
/// `X-Tenant-ID`
pub const X_TENANT_ID: HeaderName = HeaderName::from_static("x-tenant-id");
/// `X-Request-ID`
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
/// `X-Forwarded-For`
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// The parts of an inbound request the gateway pipeline inspects.
#[derive(Clone, Debug)]
pub struct InboundRequest {
	/// HTTP method.
	pub method: Method,
	/// Route path (no query string).
	pub path: String,
	/// Request headers.
	pub headers: HeaderMap,
	/// Path parameters extracted by the router.
	pub path_params: BTreeMap<String, String>,
	/// Peer address of the connection.
	pub remote_addr: Option<IpAddr>,
}
impl InboundRequest {
	/// Creates a request without headers, parameters, or peer address.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self {
			method,
			path: path.into(),
			headers: HeaderMap::new(),
			path_params: BTreeMap::new(),
			remote_addr: None,
		}
	}

	/// Captures method, path, and headers from an [`http::Request`].
	pub fn from_http<B>(request: &http::Request<B>) -> Self {
		Self {
			method: request.method().clone(),
			path: request.uri().path().to_owned(),
			headers: request.headers().clone(),
			path_params: BTreeMap::new(),
			remote_addr: None,
		}
	}

	/// Adds a header; invalid names or values are dropped, as an HTTP server would reject them
	/// before routing.
	pub fn with_header(mut self, name: &str, value: impl AsRef<str>) -> Self {
		if let (Ok(name), Ok(value)) =
			(HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value.as_ref()))
		{
			self.headers.append(name, value);
		}

		self
	}

	/// Adds an `Authorization: Bearer <token>` header.
	pub fn with_bearer(self, token: impl AsRef<str>) -> Self {
		let value = format!("Bearer {}", token.as_ref());

		self.with_header(AUTHORIZATION.as_str(), value)
	}

	/// Adds a path parameter.
	pub fn with_path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.path_params.insert(name.into(), value.into());

		self
	}

	/// Sets the peer address.
	pub fn with_remote_addr(mut self, addr: IpAddr) -> Self {
		self.remote_addr = Some(addr);

		self
	}

	/// First value of `name`, if present and visible ASCII.
	pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
		self.headers.get(name.as_ref()).and_then(|value| value.to_str().ok())
	}

	/// The `Authorization` header value.
	pub fn authorization(&self) -> Option<&str> {
		self.header(AUTHORIZATION)
	}

	/// Path parameter `name`.
	pub fn path_param(&self, name: &str) -> Option<&str> {
		self.path_params.get(name).map(String::as_str)
	}

	/// Correlation id from `X-Request-ID`; a fresh one when the header is absent or invalid.
	pub fn request_id(&self) -> RequestId {
		self.header(X_REQUEST_ID)
			.and_then(|raw| RequestId::new(raw).ok())
			.unwrap_or_else(RequestId::generate)
	}

	/// First hop listed in `X-Forwarded-For`.
	pub fn forwarded_for(&self) -> Option<IpAddr> {
		self.header(X_FORWARDED_FOR)?.split(',').next()?.trim().parse().ok()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn headers_and_params_are_readable() {
		let request = InboundRequest::new(Method::GET, "/v1/tenants/abc")
			.with_bearer("abc.def.ghi")
			.with_header("X-Tenant-ID", "tenant")
			.with_header("bad header", "dropped")
			.with_path_param("tenant_id", "abc");

		assert_eq!(request.authorization(), Some("Bearer abc.def.ghi"));
		assert_eq!(request.header(X_TENANT_ID), Some("tenant"));
		assert_eq!(request.path_param("tenant_id"), Some("abc"));
		assert_eq!(request.headers.len(), 2);
	}

	#[test]
	fn converts_from_http_requests() {
		let http_request = http::Request::builder()
			.method(Method::POST)
			.uri("https://gateway.example.com/v1/scan?x=1")
			.header(X_REQUEST_ID, "req-1")
			.body(())
			.expect("HTTP request fixture should build.");
		let request = InboundRequest::from_http(&http_request);

		assert_eq!(request.path, "/v1/scan");
		assert_eq!(request.header(X_REQUEST_ID), Some("req-1"));
	}

	#[test]
	fn forwarded_for_takes_first_hop() {
		let request = InboundRequest::new(Method::GET, "/")
			.with_header("x-forwarded-for", "198.51.100.4 , 10.0.0.1");

		assert_eq!(request.forwarded_for(), "198.51.100.4".parse().ok());
	}
}
