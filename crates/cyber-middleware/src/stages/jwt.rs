//! HS256 JSON Web Token authentication.
//!
//! Tokens are looked up in a header (with an auth scheme), a query parameter,
//! or a cookie. The signature is checked in constant time and `exp` must not
//! be in the past. Valid claims are stored in the request context under
//! [`JwtConfig::context_key`].
//!
//! ## Example
//!
//! ```
//! use cyber_middleware::stages::{generate_token, verify_token, Claims, JwtConfig};
//!
//! let config = JwtConfig::new("secret");
//! let token = generate_token(&config, Claims::new("42", "ada", "ada@example.com", "admin")).unwrap();
//!
//! let claims = verify_token(&config, &token).unwrap();
//! assert_eq!(claims.username, "ada");
//! ```

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use cyber_core::{codes, handler_fn, middleware_fn, Handler, Middleware, RequestContext};
use hmac::{Hmac, Mac};
use http::{header, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "HS256";

/// JWT failures. Each one is answered with `401 UNAUTHORIZED` carrying the
/// error's message.
#[derive(Debug, Error)]
pub enum JwtError {
    /// The token lookup string is not `header:`, `query:` or `cookie:`.
    #[error("invalid token lookup: {0}")]
    InvalidLookup(String),

    /// No token was found in the configured location.
    #[error("missing token in {0}")]
    MissingToken(String),

    /// The header value does not start with the configured scheme.
    #[error("invalid authorization header format")]
    InvalidScheme,

    /// The token is not three dot-separated parts.
    #[error("invalid token format")]
    InvalidFormat,

    /// The token's header names an algorithm other than HS256.
    #[error("unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The signature does not match.
    #[error("invalid token signature")]
    InvalidSignature,

    /// A segment is not valid base64url.
    #[error("failed to decode token: {0}")]
    Decode(#[from] base64::DecodeError),

    /// A segment is not the expected JSON.
    #[error("failed to parse token: {0}")]
    Json(#[from] serde_json::Error),

    /// `exp` is in the past.
    #[error("token has expired")]
    Expired,

    /// The signing key was rejected by the MAC.
    #[error("invalid signing key")]
    InvalidKey,
}

/// Where the token is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenLookup {
    /// A header whose value is `<scheme> <token>`.
    Header {
        /// Header name.
        name: String,
        /// Auth scheme, e.g. `Bearer`.
        scheme: String,
    },
    /// A query parameter.
    Query(String),
    /// A cookie.
    Cookie(String),
}

impl Default for TokenLookup {
    fn default() -> Self {
        Self::Header {
            name: header::AUTHORIZATION.as_str().to_string(),
            scheme: "Bearer".to_string(),
        }
    }
}

impl FromStr for TokenLookup {
    type Err = JwtError;

    /// Parses `header:<name>`, `query:<name>` or `cookie:<name>`. A header
    /// lookup uses the `Bearer` scheme.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((source, key)) = s.split_once(':') else {
            return Err(JwtError::InvalidLookup(s.to_string()));
        };
        if key.is_empty() {
            return Err(JwtError::InvalidLookup(s.to_string()));
        }
        match source {
            "header" => Ok(Self::Header {
                name: key.to_string(),
                scheme: "Bearer".to_string(),
            }),
            "query" => Ok(Self::Query(key.to_string())),
            "cookie" => Ok(Self::Cookie(key.to_string())),
            _ => Err(JwtError::InvalidLookup(s.to_string())),
        }
    }
}

impl TokenLookup {
    /// Extracts the raw token from a request.
    pub fn extract(&self, ctx: &RequestContext) -> Result<String, JwtError> {
        match self {
            Self::Header { name, scheme } => {
                let value = ctx
                    .header(name.as_str())
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| JwtError::MissingToken(format!("header {name}")))?;
                match value.split_once(' ') {
                    Some((s, token)) if s == scheme && !token.is_empty() => {
                        Ok(token.to_string())
                    }
                    _ => Err(JwtError::InvalidScheme),
                }
            }
            Self::Query(name) => ctx
                .query_param(name)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| JwtError::MissingToken(format!("query {name}"))),
            Self::Cookie(name) => ctx
                .headers()
                .get_all(header::COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .flat_map(|v| v.split(';'))
                .filter_map(|pair| pair.trim().split_once('='))
                .find(|(k, v)| *k == name.as_str() && !v.is_empty())
                .map(|(_, v)| v.to_string())
                .ok_or_else(|| JwtError::MissingToken(format!("cookie {name}"))),
        }
    }
}

/// JWT settings.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// HMAC key.
    pub signing_key: String,
    /// Token location.
    pub lookup: TokenLookup,
    /// Context key the claims are stored under.
    pub context_key: String,
    /// Lifetime of issued tokens.
    pub timeout: Duration,
}

impl JwtConfig {
    /// Settings with `signing_key`, the `Authorization: Bearer` lookup, the
    /// `user` context key and a one hour lifetime.
    #[must_use]
    pub fn new(signing_key: impl Into<String>) -> Self {
        Self {
            signing_key: signing_key.into(),
            lookup: TokenLookup::default(),
            context_key: "user".to_string(),
            timeout: Duration::from_secs(3600),
        }
    }

    fn mac(&self) -> Result<HmacSha256, JwtError> {
        HmacSha256::new_from_slice(self.signing_key.as_bytes()).map_err(|_| JwtError::InvalidKey)
    }
}

/// Token claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject id.
    pub id: String,
    /// Username.
    pub username: String,
    /// Email.
    pub email: String,
    /// Role.
    pub role: String,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
    /// Issue time, seconds since the epoch.
    pub iat: i64,
    /// Application-defined claims.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<Map<String, Value>>,
}

impl Claims {
    /// Claims for a subject; timestamps are filled in by [`generate_token`].
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        username: impl Into<String>,
        email: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            email: email.into(),
            role: role.into(),
            exp: 0,
            iat: 0,
            custom: None,
        }
    }

    /// Adds an application-defined claim.
    #[must_use]
    pub fn with_custom(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }
}

#[derive(Serialize, Deserialize)]
struct JwtHeader {
    alg: String,
    typ: String,
}

/// Signs `claims` with `iat = now` and `exp = now + config.timeout`.
pub fn generate_token(config: &JwtConfig, mut claims: Claims) -> Result<String, JwtError> {
    let now = chrono::Utc::now().timestamp();
    claims.iat = now;
    claims.exp = now.saturating_add(i64::try_from(config.timeout.as_secs()).unwrap_or(i64::MAX));
    encode(config, &claims)
}

fn encode(config: &JwtConfig, claims: &Claims) -> Result<String, JwtError> {
    let header = JwtHeader {
        alg: ALGORITHM.to_string(),
        typ: "JWT".to_string(),
    };
    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?)
    );

    let mut mac = config.mac()?;
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{signing_input}.{signature}"))
}

/// Verifies `token` and returns its claims.
pub fn verify_token(config: &JwtConfig, token: &str) -> Result<Claims, JwtError> {
    let mut parts = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(JwtError::InvalidFormat);
    };

    let signing_input_len = header.len() + 1 + payload.len();
    let mut mac = config.mac()?;
    mac.update(&token.as_bytes()[..signing_input_len]);
    let signature = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| JwtError::InvalidSignature)?;
    mac.verify_slice(&signature)
        .map_err(|_| JwtError::InvalidSignature)?;

    let header: JwtHeader = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(header)?)?;
    if header.alg != ALGORITHM {
        return Err(JwtError::UnsupportedAlgorithm(header.alg));
    }

    let claims: Claims = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload)?)?;
    if claims.exp < chrono::Utc::now().timestamp() {
        return Err(JwtError::Expired);
    }
    Ok(claims)
}

/// Requires a valid token and stores its [`Claims`] in the context.
pub fn jwt_auth(config: JwtConfig) -> Middleware {
    let config = Arc::new(config);
    middleware_fn(move |next: Handler| {
        let config = Arc::clone(&config);
        handler_fn(move |ctx| {
            let next = next.clone();
            let config = Arc::clone(&config);
            async move {
                let claims = config
                    .lookup
                    .extract(&ctx)
                    .and_then(|token| verify_token(&config, &token));
                match claims {
                    Ok(claims) => {
                        ctx.set(config.context_key.clone(), claims);
                        next(ctx).await;
                    }
                    Err(e) => {
                        debug!(request_id = %ctx.request_id(), error = %e, "authentication failed");
                        ctx.error(StatusCode::UNAUTHORIZED, codes::UNAUTHORIZED, e.to_string());
                    }
                }
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use cyber_core::ErrorBody;
    use http::Request;

    fn ctx_with(name: &str, value: &str, uri: &str) -> Arc<RequestContext> {
        let req = Request::builder()
            .uri(uri)
            .header(name, value)
            .body(Bytes::new())
            .unwrap();
        Arc::new(RequestContext::from_request(req))
    }

    fn protected() -> Handler {
        handler_fn(|ctx| async move {
            let claims = ctx.get::<Claims>("user").unwrap();
            ctx.string(StatusCode::OK, claims.username.clone());
        })
    }

    fn error_code(ctx: &RequestContext) -> ErrorBody {
        let body = ctx.with_response(|r| r.body().clone()).unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[test]
    fn test_round_trip_and_timestamps() {
        let config = JwtConfig::new("k");
        let claims = Claims::new("1", "ada", "ada@example.com", "admin").with_custom("team", "core");
        let token = generate_token(&config, claims).unwrap();

        let verified = verify_token(&config, &token).unwrap();
        assert_eq!(verified.exp - verified.iat, 3600);
        assert_eq!(verified.custom.unwrap()["team"], "core");
    }

    #[test]
    fn test_rejects_wrong_key_and_tampering() {
        let token = generate_token(&JwtConfig::new("k1"), Claims::new("1", "a", "e", "r")).unwrap();
        assert!(matches!(
            verify_token(&JwtConfig::new("k2"), &token),
            Err(JwtError::InvalidSignature)
        ));

        let mut parts: Vec<&str> = token.split('.').collect();
        let forged = URL_SAFE_NO_PAD.encode(br#"{"id":"1","username":"root","email":"e","role":"admin","exp":9999999999,"iat":0}"#);
        parts[1] = &forged;
        assert!(matches!(
            verify_token(&JwtConfig::new("k1"), &parts.join(".")),
            Err(JwtError::InvalidSignature)
        ));
    }

    #[test]
    fn test_rejects_expired() {
        let config = JwtConfig::new("k");
        let mut claims = Claims::new("1", "a", "e", "r");
        claims.iat = chrono::Utc::now().timestamp() - 7200;
        claims.exp = claims.iat + 3600;
        let token = encode(&config, &claims).unwrap();

        assert!(matches!(verify_token(&config, &token), Err(JwtError::Expired)));
    }

    #[test]
    fn test_rejects_malformed() {
        let config = JwtConfig::new("k");
        assert!(matches!(verify_token(&config, "a.b"), Err(JwtError::InvalidFormat)));
        assert!(matches!(verify_token(&config, "a.b.c.d"), Err(JwtError::InvalidFormat)));
        assert!(verify_token(&config, "a.b.c").is_err());
    }

    #[test]
    fn test_lookup_parse() {
        assert_eq!(
            "query:token".parse::<TokenLookup>().unwrap(),
            TokenLookup::Query("token".into())
        );
        assert_eq!(
            "cookie:jwt".parse::<TokenLookup>().unwrap(),
            TokenLookup::Cookie("jwt".into())
        );
        assert!("body:token".parse::<TokenLookup>().is_err());
        assert!("header".parse::<TokenLookup>().is_err());
        assert!("header:".parse::<TokenLookup>().is_err());
    }

    #[tokio::test]
    async fn test_middleware_accepts_bearer_token() {
        let config = JwtConfig::new("k");
        let token = generate_token(&config, Claims::new("1", "ada", "e", "r")).unwrap();
        let handler = jwt_auth(config)(protected());

        let ctx = ctx_with("authorization", &format!("Bearer {token}"), "/me");
        handler(Arc::clone(&ctx)).await;

        assert_eq!(ctx.status_code(), StatusCode::OK);
        assert_eq!(ctx.with_response(|r| r.body().clone()).unwrap(), "ada");
    }

    #[tokio::test]
    async fn test_middleware_rejects_missing_or_bad_scheme() {
        let handler = jwt_auth(JwtConfig::new("k"))(protected());

        let ctx = Arc::new(RequestContext::mock());
        handler(Arc::clone(&ctx)).await;
        assert_eq!(ctx.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(&ctx).code, codes::UNAUTHORIZED);

        let ctx = ctx_with("authorization", "Basic abc", "/me");
        handler(Arc::clone(&ctx)).await;
        assert_eq!(ctx.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_query_and_cookie_lookup() {
        let mut config = JwtConfig::new("k");
        let token = generate_token(&config, Claims::new("1", "ada", "e", "r")).unwrap();

        config.lookup = TokenLookup::Query("token".into());
        let handler = jwt_auth(config.clone())(protected());
        let req = Request::builder()
            .uri(format!("/me?token={token}"))
            .body(Bytes::new())
            .unwrap();
        let ctx = Arc::new(RequestContext::from_request(req));
        handler(Arc::clone(&ctx)).await;
        assert_eq!(ctx.status_code(), StatusCode::OK);

        config.lookup = TokenLookup::Cookie("jwt".into());
        let handler = jwt_auth(config)(protected());
        let ctx = ctx_with("cookie", &format!("theme=dark; jwt={token}"), "/me");
        handler(Arc::clone(&ctx)).await;
        assert_eq!(ctx.status_code(), StatusCode::OK);
    }
}
