/// Local verification of provider-issued access tokens
///
/// The identity provider signs access tokens with HS256 and a secret shared
/// with this application. Verifying locally (signature + expiry) lets the
/// session deriver authenticate a request without a provider round-trip;
/// the provider remains the authority for everything else.
///
/// # Example
///
/// ```
/// use fakturo_shared::identity::jwt::{sign_access_token, verify_access_token, AccessClaims};
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let secret = "test-secret-key-at-least-32-bytes-long";
/// let claims = AccessClaims::new(Uuid::new_v4(), "user@example.com".to_string(), true, 3600);
///
/// let token = sign_access_token(&claims, secret)?;
/// let verified = verify_access_token(&token, secret)?;
/// assert_eq!(verified.sub, claims.sub);
/// # Ok(())
/// # }
/// ```

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audience the provider stamps on end-user tokens
pub const AUDIENCE: &str = "authenticated";

/// Error type for access-token verification
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Token has expired
    #[error("Token has expired")]
    Expired,

    /// Signature, format, or claim check failed
    #[error("Invalid token: {0}")]
    Invalid(String),
}

/// Claims carried by a provider access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject - provider user ID
    pub sub: Uuid,

    /// Email address at issue time
    pub email: String,

    /// Whether the email was confirmed at issue time
    #[serde(default)]
    pub email_confirmed: bool,

    /// Audience (always "authenticated" for end users)
    pub aud: String,

    /// Issued-at timestamp (Unix seconds)
    pub iat: i64,

    /// Expiration timestamp (Unix seconds)
    pub exp: i64,
}

impl AccessClaims {
    /// Builds claims for a token valid for `expires_in` seconds from now
    pub fn new(user_id: Uuid, email: String, email_confirmed: bool, expires_in: i64) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id,
            email,
            email_confirmed,
            aud: AUDIENCE.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(expires_in)).timestamp(),
        }
    }
}

/// Signs an access token the way the provider does
///
/// Production tokens come from the provider; this exists for the mock
/// provider and for tests.
pub fn sign_access_token(claims: &AccessClaims, secret: &str) -> Result<String, JwtError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| JwtError::Invalid(e.to_string()))
}

/// Verifies a provider access token
///
/// Checks the HS256 signature, the expiry, and the audience.
///
/// # Errors
///
/// - `JwtError::Expired` when the token is past its `exp`
/// - `JwtError::Invalid` for any other failure
pub fn verify_access_token(token: &str, secret: &str) -> Result<AccessClaims, JwtError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[AUDIENCE]);

    let data = decode::<AccessClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
        _ => JwtError::Invalid(e.to_string()),
    })?;

    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    #[test]
    fn test_sign_verify_roundtrip() {
        let user_id = Uuid::new_v4();
        let claims = AccessClaims::new(user_id, "user@example.com".to_string(), true, 3600);

        let token = sign_access_token(&claims, SECRET).expect("Sign should succeed");
        let verified = verify_access_token(&token, SECRET).expect("Verify should succeed");

        assert_eq!(verified.sub, user_id);
        assert_eq!(verified.email, "user@example.com");
        assert!(verified.email_confirmed);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let claims = AccessClaims::new(Uuid::new_v4(), "user@example.com".to_string(), true, 3600);
        let token = sign_access_token(&claims, SECRET).expect("Sign should succeed");

        let result = verify_access_token(&token, "another-secret-that-is-also-32-bytes");
        assert!(matches!(result, Err(JwtError::Invalid(_))));
    }

    #[test]
    fn test_expired_token_rejected() {
        let mut claims =
            AccessClaims::new(Uuid::new_v4(), "user@example.com".to_string(), true, 3600);
        claims.iat = (Utc::now() - Duration::hours(2)).timestamp();
        claims.exp = (Utc::now() - Duration::hours(1)).timestamp();

        let token = sign_access_token(&claims, SECRET).expect("Sign should succeed");
        let result = verify_access_token(&token, SECRET);
        assert!(matches!(result, Err(JwtError::Expired)));
    }

    #[test]
    fn test_garbage_token_rejected() {
        let result = verify_access_token("not-a-jwt", SECRET);
        assert!(matches!(result, Err(JwtError::Invalid(_))));
    }
}
