//! HS256 bearer token decoding.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;

use crate::claims::{JwtClaims, TokenValidationError, validate_claims};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JwtError {
    #[error("malformed or badly signed token: {0}")]
    Decode(String),

    #[error(transparent)]
    Claims(#[from] TokenValidationError),

    #[error("could not sign token: {0}")]
    Encode(String),
}

/// Turns a raw bearer token into trusted claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, JwtError>;
}

/// Shared-secret validator.
///
/// The time window lives in `issued_at`/`expires_at` (RFC 3339) rather than the
/// registered `exp` claim, so jsonwebtoken's own expiry checks are disabled and
/// [`validate_claims`] runs instead.
pub struct Hs256JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, JwtError> {
        let data = decode::<JwtClaims>(token, &self.key, &self.validation)
            .map_err(|e| JwtError::Decode(e.to_string()))?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

/// Sign claims with a shared secret (tenant sign-up and tests).
pub fn mint_hs256(secret: &[u8], claims: &JwtClaims) -> Result<String, JwtError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| JwtError::Encode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PrincipalId, Role};
    use atelier_core::TenantId;
    use chrono::Duration;

    fn claims() -> JwtClaims {
        let now = Utc::now();
        JwtClaims {
            sub: PrincipalId::new(),
            tenant_id: TenantId::new(),
            roles: vec![Role::new("admin")],
            issued_at: now - Duration::seconds(5),
            expires_at: now + Duration::minutes(10),
        }
    }

    #[test]
    fn minted_token_validates() {
        let c = claims();
        let token = mint_hs256(b"secret", &c).unwrap();
        let decoded = Hs256JwtValidator::new(b"secret").validate(&token, Utc::now()).unwrap();
        assert_eq!(decoded, c);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = mint_hs256(b"secret", &claims()).unwrap();
        match Hs256JwtValidator::new(b"other").validate(&token, Utc::now()) {
            Err(JwtError::Decode(_)) => {}
            other => panic!("Expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn expired_token_is_rejected() {
        let c = claims();
        let token = mint_hs256(b"secret", &c).unwrap();
        let later = c.expires_at + Duration::seconds(1);
        assert_eq!(
            Hs256JwtValidator::new(b"secret").validate(&token, later),
            Err(JwtError::Claims(TokenValidationError::Expired))
        );
    }
}
