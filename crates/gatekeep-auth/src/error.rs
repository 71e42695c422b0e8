//! Authentication error types.

use gatekeep_core::error::GatekeepError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown principal, wrong password and inactive account all map
    /// here so callers cannot enumerate accounts.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token has expired")]
    ExpiredToken,

    #[error("token has been revoked")]
    RevokedToken,

    #[error("token was issued for a different tenant")]
    TenantMismatch,

    #[error("invalid verification code")]
    InvalidCode,

    #[error("invalid or expired session")]
    InvalidOrExpiredSession,

    #[error("two-factor setup window has expired")]
    SetupExpired,

    #[error("two-factor authentication is not enabled")]
    TwoFactorNotEnabled,

    #[error("two-factor authentication is already enabled")]
    TwoFactorAlreadyEnabled,

    #[error("password must be at least {min_length} characters")]
    PasswordTooShort { min_length: usize },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("cryptography error: {0}")]
    Crypto(String),

    #[error(transparent)]
    Backend(#[from] GatekeepError),
}

impl AuthError {
    /// Bearer-token rejections that callers must report uniformly so the
    /// failing check is not revealed.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            Self::InvalidToken(_) | Self::ExpiredToken | Self::RevokedToken | Self::TenantMismatch
        )
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

impl From<AuthError> for GatekeepError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Backend(inner) => inner,
            AuthError::Crypto(msg) => GatekeepError::Crypto(msg),
            AuthError::Config(msg) => GatekeepError::Internal(msg),
            e @ AuthError::PasswordTooShort { .. } => GatekeepError::Validation {
                message: e.to_string(),
            },
            e if e.is_unauthorized() => GatekeepError::AuthenticationFailed {
                reason: "unauthorized".into(),
            },
            other => GatekeepError::AuthenticationFailed {
                reason: other.to_string(),
            },
        }
    }
}
