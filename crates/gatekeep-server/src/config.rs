//! Command-line and environment configuration.

use std::time::Duration;

use clap::Args;
use gatekeep_auth::{AuthConfig, ReadFailurePolicy};
use gatekeep_store::{DbConfig, RedisConfig};

#[derive(Debug, Args)]
pub struct Settings {
    /// HMAC secret for signing tokens (at least 32 bytes)
    #[arg(long, env = "GATEKEEP_SIGNING_SECRET", hide_env_values = true)]
    pub signing_secret: String,

    #[arg(long, env = "GATEKEEP_JWT_ISSUER", default_value = "gatekeep")]
    pub jwt_issuer: String,

    #[arg(long, env = "GATEKEEP_ACCESS_TOKEN_MINUTES", default_value_t = 15)]
    pub access_token_minutes: u64,

    #[arg(long, env = "GATEKEEP_REFRESH_TOKEN_HOURS", default_value_t = 168)]
    pub refresh_token_hours: u64,

    #[arg(long, env = "GATEKEEP_ADMIN_SESSION_HOURS", default_value_t = 8)]
    pub admin_session_hours: u64,

    #[arg(long, env = "GATEKEEP_TWO_FACTOR_SESSION_MINUTES", default_value_t = 5)]
    pub two_factor_session_minutes: u64,

    #[arg(long, env = "GATEKEEP_TOTP_ISSUER", default_value = "gatekeep")]
    pub totp_issuer: String,

    /// Accepted TOTP steps either side of the current one
    #[arg(long, env = "GATEKEEP_TOTP_SKEW", default_value_t = 1)]
    pub totp_skew: u8,

    #[arg(long, env = "GATEKEEP_RECOVERY_CODE_COUNT", default_value_t = 8)]
    pub recovery_code_count: usize,

    #[arg(long, env = "GATEKEEP_PASSWORD_PEPPER", hide_env_values = true)]
    pub pepper: Option<String>,

    /// Hex-encoded 256-bit key for encrypting TOTP secrets at rest
    #[arg(long, env = "GATEKEEP_MFA_ENCRYPTION_KEY", hide_env_values = true)]
    pub mfa_encryption_key: Option<String>,

    #[arg(long, env = "GATEKEEP_KEY_PREFIX", default_value = "gatekeep")]
    pub key_prefix: String,

    /// Trust tokens when the revocation store cannot be read
    #[arg(long, env = "GATEKEEP_REVOCATION_FAIL_OPEN")]
    pub revocation_fail_open: bool,

    /// Write one-time codes to the log (local development only)
    #[arg(long, env = "GATEKEEP_DEV_LOG_CODES")]
    pub dev_log_codes: bool,

    #[arg(long, env = "GATEKEEP_REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    #[arg(long, env = "GATEKEEP_REDIS_TIMEOUT_MS", default_value_t = 500)]
    pub redis_timeout_ms: u64,

    #[arg(long, env = "GATEKEEP_DB_URL", default_value = "127.0.0.1:8000")]
    pub db_url: String,

    #[arg(long, env = "GATEKEEP_DB_NAMESPACE", default_value = "gatekeep")]
    pub db_namespace: String,

    #[arg(long, env = "GATEKEEP_DB_DATABASE", default_value = "credentials")]
    pub db_database: String,

    #[arg(long, env = "GATEKEEP_DB_USERNAME", default_value = "root")]
    pub db_username: String,

    #[arg(long, env = "GATEKEEP_DB_PASSWORD", hide_env_values = true, default_value = "root")]
    pub db_password: String,
}

impl Settings {
    pub fn auth_config(&self) -> Result<AuthConfig, String> {
        let mfa_encryption_key = self
            .mfa_encryption_key
            .as_deref()
            .map(parse_key)
            .transpose()?;

        Ok(AuthConfig {
            signing_secret: self.signing_secret.clone(),
            jwt_issuer: self.jwt_issuer.clone(),
            access_token_lifetime_secs: lifetime_secs(
                "access token lifetime",
                self.access_token_minutes,
                60,
            )?,
            refresh_token_lifetime_secs: lifetime_secs(
                "refresh token lifetime",
                self.refresh_token_hours,
                3600,
            )?,
            admin_session_lifetime_secs: lifetime_secs(
                "admin session lifetime",
                self.admin_session_hours,
                3600,
            )?,
            two_factor_session_lifetime_secs: lifetime_secs(
                "two-factor session lifetime",
                self.two_factor_session_minutes,
                60,
            )?,
            totp_issuer: self.totp_issuer.clone(),
            totp_skew: self.totp_skew,
            recovery_code_count: self.recovery_code_count,
            pepper: self.pepper.clone(),
            mfa_encryption_key,
            key_prefix: self.key_prefix.clone(),
            revocation_read_failure: if self.revocation_fail_open {
                ReadFailurePolicy::FailOpen
            } else {
                ReadFailurePolicy::FailClosed
            },
            ..AuthConfig::default()
        })
    }

    pub fn redis_config(&self) -> RedisConfig {
        RedisConfig {
            url: self.redis_url.clone(),
            op_timeout: Duration::from_millis(self.redis_timeout_ms),
        }
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig {
            url: self.db_url.clone(),
            namespace: self.db_namespace.clone(),
            database: self.db_database.clone(),
            username: self.db_username.clone(),
            password: self.db_password.clone(),
        }
    }
}

/// Longest lifetime accepted for any token or session.
const MAX_LIFETIME_SECS: u64 = 10 * 365 * 24 * 3600;

fn lifetime_secs(name: &str, value: u64, unit_secs: u64) -> Result<u64, String> {
    value
        .checked_mul(unit_secs)
        .filter(|secs| *secs <= MAX_LIFETIME_SECS)
        .ok_or_else(|| format!("{name} of {value} is out of range"))
}

fn parse_key(hex_key: &str) -> Result<[u8; 32], String> {
    let bytes = hex::decode(hex_key.trim())
        .map_err(|error| format!("MFA encryption key is not valid hex: {error}"))?;
    <[u8; 32]>::try_from(bytes.as_slice())
        .map_err(|_| format!("MFA encryption key must be 32 bytes, got {}", bytes.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_key() {
        let key = parse_key(&"ab".repeat(32)).unwrap();
        assert_eq!(key, [0xab; 32]);
    }

    #[test]
    fn scales_lifetimes() {
        assert_eq!(lifetime_secs("access", 15, 60).unwrap(), 900);
        assert_eq!(lifetime_secs("refresh", 168, 3600).unwrap(), 604_800);
    }

    #[test]
    fn rejects_overflowing_lifetimes() {
        assert!(lifetime_secs("refresh", u64::MAX, 3600).is_err());
        assert!(lifetime_secs("refresh", u64::MAX / 3600, 3600).is_err());
    }

    #[test]
    fn rejects_short_or_invalid_keys() {
        assert!(parse_key("abcd").is_err());
        assert!(parse_key(&"zz".repeat(32)).is_err());
    }
}
