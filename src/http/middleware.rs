//! Host authentication: signed host tokens and the middleware guarding host routes

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::app::AppState;
use crate::util::time::unix_millis;

type HmacSha256 = Hmac<Sha256>;

/// Host session lifetime
pub const HOST_TOKEN_TTL_SECS: u64 = 12 * 60 * 60;

/// Claims carried by a host token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostClaims {
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

fn mac(secret: &str) -> Result<HmacSha256, AuthError> {
    HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidToken)
}

/// `<base64url claims>.<hex HMAC-SHA256 of the claims part>`
pub fn issue_host_token(secret: &str, now_secs: u64) -> Result<String, AuthError> {
    let claims = HostClaims {
        iat: now_secs,
        exp: now_secs + HOST_TOKEN_TTL_SECS,
    };
    let json = serde_json::to_vec(&claims).map_err(|_| AuthError::InvalidToken)?;
    let payload = URL_SAFE_NO_PAD.encode(json);

    let mut mac = mac(secret)?;
    mac.update(payload.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    Ok(format!("{}.{}", payload, signature))
}

/// Verify a host token and extract its claims
pub fn verify_host_token(token: &str, secret: &str, now_secs: u64) -> Result<HostClaims, AuthError> {
    let (payload, signature) = token.split_once('.').ok_or(AuthError::InvalidToken)?;
    let signature = hex::decode(signature).map_err(|_| AuthError::InvalidToken)?;

    let mut mac = mac(secret)?;
    mac.update(payload.as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| AuthError::InvalidToken)?;

    let json = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| AuthError::InvalidToken)?;
    let claims: HostClaims = serde_json::from_slice(&json).map_err(|_| AuthError::InvalidToken)?;

    if claims.exp < now_secs {
        return Err(AuthError::TokenExpired);
    }

    Ok(claims)
}

/// Token from an Authorization header, `Bearer ` prefix optional
pub fn extract_token(auth_header: &str) -> &str {
    auth_header
        .strip_prefix("Bearer ")
        .unwrap_or(auth_header)
        .trim()
}

/// Authentication error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Unauthorized")]
    MissingHeader,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.to_string() });
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

/// Middleware to require a valid host token
pub async fn require_host(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(AuthError::MissingHeader)?;

    verify_host_token(
        extract_token(auth_header),
        &state.config.host_password,
        unix_millis() / 1000,
    )?;

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_760_000_000;

    #[test]
    fn issued_token_verifies_until_expiry() {
        let token = issue_host_token("host-secret", NOW).unwrap();
        let claims = verify_host_token(&token, "host-secret", NOW + 60).unwrap();
        assert_eq!(claims.exp, NOW + HOST_TOKEN_TTL_SECS);

        assert!(matches!(
            verify_host_token(&token, "host-secret", NOW + HOST_TOKEN_TTL_SECS + 1),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn tampered_or_foreign_tokens_are_rejected() {
        let token = issue_host_token("host-secret", NOW).unwrap();
        assert!(matches!(
            verify_host_token(&token, "other-secret", NOW),
            Err(AuthError::InvalidToken)
        ));

        let (payload, signature) = token.split_once('.').unwrap();
        let forged_claims = URL_SAFE_NO_PAD.encode(br#"{"iat":0,"exp":99999999999}"#);
        let forged = format!("{}.{}", forged_claims, signature);
        assert!(verify_host_token(&forged, "host-secret", NOW).is_err());

        assert!(verify_host_token(payload, "host-secret", NOW).is_err());
        assert!(verify_host_token("garbage", "host-secret", NOW).is_err());
    }

    #[test]
    fn bearer_prefix_is_optional() {
        assert_eq!(extract_token("Bearer abc.def"), "abc.def");
        assert_eq!(extract_token("abc.def"), "abc.def");
    }
}
