//! Authentication configuration.

use std::time::Duration;

/// What a revocation check does when the TTL store cannot be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReadFailurePolicy {
    /// Treat the token as revoked.
    #[default]
    FailClosed,
    /// Treat the token as trusted and log a warning.
    FailOpen,
}

/// Configuration for the authentication services.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC secret for HS256 token signing (at least 32 bytes).
    pub signing_secret: String,
    /// JWT issuer (`iss` claim).
    pub jwt_issuer: String,
    /// Access token lifetime in seconds (default: 900 = 15 minutes).
    pub access_token_lifetime_secs: u64,
    /// Refresh token lifetime in seconds (default: 604_800 = 7 days).
    pub refresh_token_lifetime_secs: u64,
    /// Admin GUI session lifetime in seconds (default: 28_800 = 8 hours).
    pub admin_session_lifetime_secs: u64,
    /// 2FA temp session lifetime in seconds (default: 300 = 5 minutes).
    pub two_factor_session_lifetime_secs: u64,
    /// Window for completing TOTP setup in seconds (default: 600).
    pub two_factor_setup_lifetime_secs: u64,
    /// Email code lifetime in seconds (default: 600).
    pub email_code_lifetime_secs: u64,
    /// Issuer name shown in authenticator apps.
    pub totp_issuer: String,
    /// Accepted TOTP steps on either side of the current one.
    pub totp_skew: u8,
    /// Recovery codes issued per batch.
    pub recovery_code_count: usize,
    /// Minimum accepted length for new passwords.
    pub min_password_length: usize,
    /// Optional pepper prepended to passwords before Argon2id.
    pub pepper: Option<String>,
    /// 256-bit AES-GCM key for encrypting TOTP secrets at rest.
    /// `None` stores secrets as plain base32.
    pub mfa_encryption_key: Option<[u8; 32]>,
    /// Namespace prepended to every TTL-store key.
    pub key_prefix: String,
    pub revocation_read_failure: ReadFailurePolicy,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            signing_secret: String::new(),
            jwt_issuer: "gatekeep".into(),
            access_token_lifetime_secs: 900,
            refresh_token_lifetime_secs: 604_800,
            admin_session_lifetime_secs: 28_800,
            two_factor_session_lifetime_secs: 300,
            two_factor_setup_lifetime_secs: 600,
            email_code_lifetime_secs: 600,
            totp_issuer: "gatekeep".into(),
            totp_skew: 1,
            recovery_code_count: 8,
            min_password_length: 12,
            pepper: None,
            mfa_encryption_key: None,
            key_prefix: "gatekeep".into(),
            revocation_read_failure: ReadFailurePolicy::FailClosed,
        }
    }
}

impl AuthConfig {
    pub fn access_token_lifetime(&self) -> Duration {
        Duration::from_secs(self.access_token_lifetime_secs)
    }

    pub fn refresh_token_lifetime(&self) -> Duration {
        Duration::from_secs(self.refresh_token_lifetime_secs)
    }

    /// Lifetime of the longest-lived token kind; bounds principal-wide
    /// blacklist entries.
    pub fn max_token_lifetime(&self) -> Duration {
        self.access_token_lifetime().max(self.refresh_token_lifetime())
    }

    pub fn admin_session_lifetime(&self) -> Duration {
        Duration::from_secs(self.admin_session_lifetime_secs)
    }

    pub fn two_factor_session_lifetime(&self) -> Duration {
        Duration::from_secs(self.two_factor_session_lifetime_secs)
    }

    pub fn two_factor_setup_lifetime(&self) -> Duration {
        Duration::from_secs(self.two_factor_setup_lifetime_secs)
    }

    pub fn email_code_lifetime(&self) -> Duration {
        Duration::from_secs(self.email_code_lifetime_secs)
    }
}
