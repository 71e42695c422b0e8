//! Signed, tenant-scoped access and refresh tokens.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;

/// Minimum HMAC secret length accepted for HS256.
pub const MIN_SIGNING_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims embedded in every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub principal_id: Uuid,
    pub tenant_id: Uuid,
    pub kind: TokenKind,
    pub iss: String,
    /// Issued-at (Unix seconds).
    pub iat: i64,
    /// Expiration (Unix seconds).
    pub exp: i64,
    /// Issued-at in Unix microseconds; compared against principal-wide
    /// revocation instants.
    pub iat_us: i64,
    pub jti: Uuid,
}

impl TokenClaims {
    /// Time left until `exp`, zero once expired.
    pub fn remaining_lifetime(&self, now: DateTime<Utc>) -> Duration {
        let secs = self.exp - now.timestamp();
        Duration::from_secs(u64::try_from(secs).unwrap_or(0))
    }
}

/// A freshly signed token together with its claims.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: TokenClaims,
}

/// Issues and validates HS256 tokens. Keys are derived once from the
/// configured secret.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: String,
    access_lifetime: Duration,
    refresh_lifetime: Duration,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("issuer", &self.issuer)
            .field("access_lifetime", &self.access_lifetime)
            .field("refresh_lifetime", &self.refresh_lifetime)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        if config.signing_secret.len() < MIN_SIGNING_SECRET_LEN {
            return Err(AuthError::Config(format!(
                "signing secret must be at least {MIN_SIGNING_SECRET_LEN} bytes"
            )));
        }
        if config.access_token_lifetime_secs == 0 || config.refresh_token_lifetime_secs == 0 {
            return Err(AuthError::Config("token lifetimes must be positive".into()));
        }

        let secret = config.signing_secret.as_bytes();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[&config.jwt_issuer]);
        validation.set_required_spec_claims(&["exp", "iat", "iss"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            issuer: config.jwt_issuer.clone(),
            access_lifetime: config.access_token_lifetime(),
            refresh_lifetime: config.refresh_token_lifetime(),
        })
    }

    pub fn issue_access(
        &self,
        principal_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<IssuedToken, AuthError> {
        self.issue_at(TokenKind::Access, principal_id, tenant_id, Utc::now())
    }

    pub fn issue_refresh(
        &self,
        principal_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<IssuedToken, AuthError> {
        self.issue_at(TokenKind::Refresh, principal_id, tenant_id, Utc::now())
    }

    fn issue_at(
        &self,
        kind: TokenKind,
        principal_id: Uuid,
        tenant_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, AuthError> {
        let lifetime = match kind {
            TokenKind::Access => self.access_lifetime,
            TokenKind::Refresh => self.refresh_lifetime,
        };
        let iat = now.timestamp();
        let exp = i64::try_from(lifetime.as_secs())
            .ok()
            .and_then(|secs| iat.checked_add(secs))
            .ok_or_else(|| AuthError::Config("token lifetime out of range".into()))?;
        let claims = TokenClaims {
            principal_id,
            tenant_id,
            kind,
            iss: self.issuer.clone(),
            iat,
            exp,
            iat_us: now.timestamp_micros(),
            jti: Uuid::new_v4(),
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Crypto(format!("JWT encode: {e}")))?;
        Ok(IssuedToken { token, claims })
    }

    /// Verify signature, algorithm, issuer and expiry.
    pub fn validate(&self, token: &str) -> Result<TokenClaims, AuthError> {
        jsonwebtoken::decode::<TokenClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                _ => AuthError::InvalidToken(e.to_string()),
            })
    }

    /// [`validate`](Self::validate) plus tenant and kind checks.
    pub fn validate_for(
        &self,
        token: &str,
        tenant_id: Uuid,
        kind: TokenKind,
    ) -> Result<TokenClaims, AuthError> {
        let claims = self.validate(token)?;
        if claims.tenant_id != tenant_id {
            return Err(AuthError::TenantMismatch);
        }
        if claims.kind != kind {
            return Err(AuthError::InvalidToken(format!(
                "expected {kind:?} token, got {:?}",
                claims.kind
            )));
        }
        Ok(claims)
    }

    pub fn access_lifetime(&self) -> Duration {
        self.access_lifetime
    }

    pub fn refresh_lifetime(&self) -> Duration {
        self.refresh_lifetime
    }
}
