use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::{
    config::AppConfig,
    error::ApiError,
    models::Document,
    repository::RepositoryState,
};

/// Lifetime of an issued token, in seconds.
pub const TOKEN_TTL_SECS: i64 = 60 * 60;

/// Claims
///
/// The decoded payload of a verified token. Only `email` and the timing claims are
/// interpreted; whatever else the caller put in the payload at issuance rides along in
/// `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// The identity the token was issued for. Trusted once the signature checks out.
    /// A non-string `email` in the payload reads as absent.
    #[serde(
        default,
        deserialize_with = "string_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub email: Option<String>,
    /// Expiration Time (exp), seconds since the epoch.
    pub exp: i64,
    /// Issued At (iat), seconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn string_or_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(email)) => Some(email),
        _ => None,
    })
}

/// issue_token
///
/// Signs `payload` as the claims of an HS256 token that expires one hour from now.
/// Any `exp`/`iat` the caller supplied are replaced.
///
/// The payload is not checked against anything: whoever calls this gets a token for
/// whatever email they claim.
pub fn issue_token(
    mut payload: Map<String, Value>,
    secret: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp();
    payload.insert("iat".to_string(), Value::from(now));
    payload.insert("exp".to_string(), Value::from(now + TOKEN_TTL_SECS));

    let key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), &payload, &key)
}

/// verify_token
///
/// Checks the signature against `secret` and rejects tokens from the second `exp` has
/// passed, with no clock leeway.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::default();
    validation.validate_exp = true;
    validation.leeway = 0;
    // Issued payloads are arbitrary; an `aud` in them must not invalidate the token.
    validation.validate_aud = false;

    decode::<Claims>(token, &key, &validation).map(|data| data.claims)
}

/// Returns the second whitespace-delimited segment of an `Authorization` value.
/// The scheme in front of it is not checked.
pub fn token_from_header(value: &str) -> Option<&str> {
    value.split_whitespace().nth(1)
}

/// AuthUser
///
/// Stage one of the access gate: the caller presented a valid, unexpired bearer token.
/// Every rejection is `ApiError::Unauthorized` (401).
///
/// `auth_middleware` stores the extracted value in the request extensions, so handlers
/// behind it get the claims without decoding the token a second time.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub claims: Claims,
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let config = AppConfig::from_ref(state);

        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        let token = token_from_header(header_value).ok_or_else(|| {
            tracing::debug!("authorization header carries no token segment");
            ApiError::Unauthorized
        })?;

        match verify_token(token, &config.jwt_secret) {
            Ok(claims) => Ok(AuthUser { claims }),
            Err(e) => {
                match e.kind() {
                    ErrorKind::ExpiredSignature => tracing::debug!("rejected expired token"),
                    _ => tracing::warn!(error = %e, "rejected invalid token"),
                }
                Err(ApiError::Unauthorized)
            }
        }
    }
}

/// AdminUser
///
/// Stage two of the access gate, always run after stage one. The email from the token
/// claims is looked up in the `users` collection on every request; the request passes
/// only if that user exists and their `role` is `"admin"`. Otherwise `ApiError::Forbidden`
/// (403).
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub claims: Claims,
    /// The user record as it was read for this request.
    pub user: Document,
}

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthUser { claims } = AuthUser::from_request_parts(parts, state).await?;
        let repo = RepositoryState::from_ref(state);

        let Some(email) = claims.email.clone() else {
            tracing::debug!("token carries no email claim");
            return Err(ApiError::Forbidden);
        };

        let user = repo
            .find_user_by_email(&email)
            .await
            .map_err(|e| ApiError::store("Failed to verify access", e))?;

        match user {
            Some(user) if user.is_admin() => Ok(AdminUser { claims, user }),
            _ => {
                tracing::debug!(%email, "admin access denied");
                Err(ApiError::Forbidden)
            }
        }
    }
}
