//! HS256 token issuance and validation.
//!
//! [`TokenService`] is a pure function of its secret and the clock: validation never touches the
//! network or storage. The verifier pins HS256, so tokens declaring any other algorithm are
//! rejected before their signature is considered, and issuer and audience must match exactly.

// crates.io
use jsonwebtoken::{
	Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind as JwtErrorKind,
};
use uuid::Uuid;
// self
use crate::{
	_prelude::*,
	auth::{Claims, Principal, TokenKind, TokenSecret},
	error::{AuthError, ConfigError},
};

/// Settings for [`TokenService`].
#[derive(Clone, Debug)]
pub struct TokenConfig {
	/// Symmetric signing secret.
	pub secret: TokenSecret,
	/// Expected `iss` claim.
	pub issuer: String,
	/// Expected `aud` claim.
	pub audience: String,
	/// Lifetime of access tokens.
	pub access_ttl: Duration,
	/// Lifetime of refresh tokens.
	pub refresh_ttl: Duration,
	/// Clock skew tolerated when checking `exp` and `nbf`.
	pub leeway: StdDuration,
}
impl TokenConfig {
	/// Default audience.
	pub const DEFAULT_AUDIENCE: &'static str = "tenant-platform";
	/// Default issuer.
	pub const DEFAULT_ISSUER: &'static str = "tenant-gateway";
	/// Shortest accepted signing secret, in bytes.
	pub const MIN_SECRET_LEN: usize = 32;

	/// Creates a configuration with default issuer, audience, and lifetimes
	/// (15 minutes for access tokens, 7 days for refresh tokens).
	pub fn new(secret: impl Into<String>) -> Self {
		Self {
			secret: TokenSecret::new(secret),
			issuer: Self::DEFAULT_ISSUER.into(),
			audience: Self::DEFAULT_AUDIENCE.into(),
			access_ttl: Duration::minutes(15),
			refresh_ttl: Duration::days(7),
			leeway: StdDuration::ZERO,
		}
	}

	/// Overrides the issuer.
	pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
		self.issuer = issuer.into();

		self
	}

	/// Overrides the audience.
	pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
		self.audience = audience.into();

		self
	}

	/// Overrides the access token lifetime.
	pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
		self.access_ttl = ttl;

		self
	}

	/// Overrides the refresh token lifetime.
	pub fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
		self.refresh_ttl = ttl;

		self
	}

	/// Overrides the tolerated clock skew.
	pub fn with_leeway(mut self, leeway: StdDuration) -> Self {
		self.leeway = leeway;

		self
	}

	/// Checks the settings without building a service.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.secret.is_empty() {
			return Err(ConfigError::MissingSecret);
		}
		if self.secret.len() < Self::MIN_SECRET_LEN {
			return Err(ConfigError::WeakSecret { min: Self::MIN_SECRET_LEN });
		}
		if self.issuer.trim().is_empty() {
			return Err(ConfigError::EmptySetting { field: "issuer" });
		}
		if self.audience.trim().is_empty() {
			return Err(ConfigError::EmptySetting { field: "audience" });
		}
		if !self.access_ttl.is_positive() {
			return Err(ConfigError::NonPositiveTtl { field: "access token" });
		}
		if !self.refresh_ttl.is_positive() {
			return Err(ConfigError::NonPositiveTtl { field: "refresh token" });
		}

		let now = OffsetDateTime::now_utc();

		if now.checked_add(self.access_ttl).is_none() {
			return Err(ConfigError::TtlOutOfRange { field: "access token" });
		}
		if now.checked_add(self.refresh_ttl).is_none() {
			return Err(ConfigError::TtlOutOfRange { field: "refresh token" });
		}

		Ok(())
	}
}

/// A freshly signed token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IssuedToken {
	/// Compact JWS; redacted in logs.
	pub token: TokenSecret,
	/// Token kind.
	pub kind: TokenKind,
	/// Token id (`jti`).
	pub id: String,
	/// Issue instant.
	#[serde(with = "time::serde::rfc3339")]
	pub issued_at: OffsetDateTime,
	/// Expiry instant.
	#[serde(with = "time::serde::rfc3339")]
	pub expires_at: OffsetDateTime,
}
impl IssuedToken {
	/// Remaining lifetime relative to `now`.
	pub fn expires_in(&self, now: OffsetDateTime) -> Duration {
		self.expires_at - now
	}
}

/// Access and refresh tokens issued together at login.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TokenPair {
	/// Access token.
	pub access: IssuedToken,
	/// Refresh token.
	pub refresh: IssuedToken,
}

/// Issues and validates HS256 identity tokens.
pub struct TokenService {
	config: TokenConfig,
	encoding: EncodingKey,
	decoding: DecodingKey,
	validation: Validation,
}
impl TokenService {
	/// Builds a service after validating `config`.
	pub fn new(config: TokenConfig) -> Result<Self, ConfigError> {
		config.validate()?;

		let secret = config.secret.expose().as_bytes();
		let encoding = EncodingKey::from_secret(secret);
		let decoding = DecodingKey::from_secret(secret);
		let mut validation = Validation::new(Algorithm::HS256);

		validation.set_issuer(&[config.issuer.as_str()]);
		validation.set_audience(&[config.audience.as_str()]);
		validation.set_required_spec_claims(&["exp", "nbf", "iss", "aud", "sub"]);
		validation.validate_exp = true;
		validation.validate_nbf = true;
		validation.leeway = config.leeway.as_secs();

		Ok(Self { config, encoding, decoding, validation })
	}

	/// Returns the active configuration.
	pub fn config(&self) -> &TokenConfig {
		&self.config
	}

	/// Issues a short-lived access token.
	pub fn issue_access_token(&self, principal: &Principal) -> Result<IssuedToken> {
		self.issue_at(
			principal,
			TokenKind::Access,
			self.config.access_ttl,
			OffsetDateTime::now_utc(),
		)
	}

	/// Issues a refresh token.
	pub fn issue_refresh_token(&self, principal: &Principal) -> Result<IssuedToken> {
		self.issue_at(
			principal,
			TokenKind::Refresh,
			self.config.refresh_ttl,
			OffsetDateTime::now_utc(),
		)
	}

	/// Issues a machine token with a caller-chosen lifetime.
	pub fn issue_api_token(&self, principal: &Principal, ttl: Duration) -> Result<IssuedToken> {
		if !ttl.is_positive() {
			return Err(ConfigError::NonPositiveTtl { field: "api token" }.into());
		}

		self.issue_at(principal, TokenKind::Api, ttl, OffsetDateTime::now_utc())
	}

	/// Issues an access and a refresh token sharing one issue instant.
	pub fn issue_token_pair(&self, principal: &Principal) -> Result<TokenPair> {
		let now = OffsetDateTime::now_utc();

		Ok(TokenPair {
			access: self.issue_at(principal, TokenKind::Access, self.config.access_ttl, now)?,
			refresh: self.issue_at(principal, TokenKind::Refresh, self.config.refresh_ttl, now)?,
		})
	}

	/// Issues a token of `kind` as if the clock read `issued_at`.
	pub fn issue_at(
		&self,
		principal: &Principal,
		kind: TokenKind,
		ttl: Duration,
		issued_at: OffsetDateTime,
	) -> Result<IssuedToken> {
		let expires_at = issued_at
			.checked_add(ttl)
			.ok_or(ConfigError::TtlOutOfRange { field: kind.as_str() })?;
		let id = Uuid::new_v4().to_string();
		let claims = Claims {
			jti: id.clone(),
			sub: principal.user_id.to_string(),
			iss: self.config.issuer.clone(),
			aud: self.config.audience.clone(),
			iat: issued_at.unix_timestamp(),
			nbf: issued_at.unix_timestamp(),
			exp: expires_at.unix_timestamp(),
			user_id: principal.user_id,
			tenant_id: principal.tenant_id,
			role: principal.role,
			scopes: principal.scopes.clone(),
			token_type: kind,
			email: principal.email.clone(),
			name: principal.name.clone(),
		};
		let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
			.map_err(|source| Error::Signing { source })?;

		Ok(IssuedToken { token: TokenSecret::new(token), kind, id, issued_at, expires_at })
	}

	/// Verifies `token` and returns its claims.
	///
	/// Fails with exactly one of [`AuthError::ExpiredToken`], [`AuthError::MalformedToken`],
	/// [`AuthError::BadSignature`], or [`AuthError::InvalidClaims`]; partial claims are never
	/// returned.
	pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
		let data =
			jsonwebtoken::decode::<serde_json::Value>(token, &self.decoding, &self.validation)
				.map_err(map_jwt_error)?;
		let claims = serde_json::from_value::<Claims>(data.claims)
			.map_err(|e| AuthError::invalid_claims(e.to_string()))?;

		if claims.iss != self.config.issuer {
			return Err(AuthError::invalid_claims("issuer mismatch"));
		}
		if claims.aud != self.config.audience {
			return Err(AuthError::invalid_claims("audience mismatch"));
		}
		if claims.sub != claims.user_id.to_string() {
			return Err(AuthError::invalid_claims("subject does not match the user id"));
		}
		if claims.exp < claims.iat {
			return Err(AuthError::invalid_claims("token expires before it was issued"));
		}

		Ok(claims)
	}

	/// Exchanges a refresh token for a new access token.
	///
	/// The new token is built from the refresh token's claims only.
	pub fn refresh(&self, refresh_token: &str) -> Result<IssuedToken> {
		let claims = self.validate(refresh_token)?;

		if claims.token_type != TokenKind::Refresh {
			return Err(AuthError::WrongTokenType { found: claims.token_type }.into());
		}

		self.issue_access_token(&claims.principal())
	}
}
impl Debug for TokenService {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenService")
			.field("issuer", &self.config.issuer)
			.field("audience", &self.config.audience)
			.field("access_ttl", &self.config.access_ttl)
			.field("refresh_ttl", &self.config.refresh_ttl)
			.finish()
	}
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn extract_bearer(header: Option<&str>) -> Result<&str, AuthError> {
	let value = header
		.map(str::trim)
		.filter(|value| !value.is_empty())
		.ok_or(AuthError::MissingToken)?;
	let (scheme, token) = value.split_once(' ').ok_or(AuthError::MalformedToken)?;
	let token = token.trim();

	if !scheme.eq_ignore_ascii_case("bearer") {
		return Err(AuthError::MalformedToken);
	}
	if token.is_empty() || token.contains(char::is_whitespace) {
		return Err(AuthError::MalformedToken);
	}

	Ok(token)
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
	match err.kind() {
		JwtErrorKind::ExpiredSignature => AuthError::ExpiredToken,
		JwtErrorKind::InvalidSignature | JwtErrorKind::InvalidAlgorithm => AuthError::BadSignature,
		JwtErrorKind::InvalidIssuer
		| JwtErrorKind::InvalidAudience
		| JwtErrorKind::InvalidSubject
		| JwtErrorKind::ImmatureSignature
		| JwtErrorKind::MissingRequiredClaim(_) => AuthError::invalid_claims(err.to_string()),
		_ => AuthError::MalformedToken,
	}
}
