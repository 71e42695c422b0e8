//! Two-factor enrollment, login challenges and recovery.

use std::sync::Arc;

use gatekeep_core::models::activity::{ActivityEvent, ActivityKind, Severity};
use gatekeep_core::models::principal::{Principal, TwoFactorMethod, UpdateTwoFactor};
use gatekeep_core::repository::{
    ActivitySink, CodeDelivery, CredentialRepository, DeliveryContext, TtlStore,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use super::email::EmailCodeService;
use super::recovery::RecoveryCodeSet;
use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::keys::KeySpace;
use crate::password;
use crate::secure::opaque_token;
use crate::totp::{self, Enrollment};

/// Who a temp session belongs to. `tenant_id` is `None` for admin logins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTwoFactor {
    pub principal_id: Uuid,
    pub tenant_id: Option<Uuid>,
}

/// Returned by a password step that needs a second factor.
#[derive(Debug, Clone)]
pub struct TwoFactorChallenge {
    pub temp_token: String,
    pub method: TwoFactorMethod,
    pub expires_in: u64,
}

pub struct TwoFactorService<C, S, D> {
    credentials: C,
    store: S,
    email: EmailCodeService<S, D>,
    keys: KeySpace,
    config: AuthConfig,
    activity: Arc<dyn ActivitySink>,
}

impl<C, S, D> TwoFactorService<C, S, D>
where
    C: CredentialRepository,
    S: TtlStore + Clone,
    D: CodeDelivery,
{
    pub fn new(
        credentials: C,
        store: S,
        delivery: D,
        config: AuthConfig,
        activity: Arc<dyn ActivitySink>,
    ) -> Self {
        let keys = KeySpace::new(&config.key_prefix);
        let email = EmailCodeService::new(
            store.clone(),
            delivery,
            keys.clone(),
            config.email_code_lifetime(),
        );
        Self {
            credentials,
            store,
            email,
            keys,
            config,
            activity,
        }
    }

    async fn principal(&self, principal_id: Uuid) -> AuthResult<Principal> {
        Ok(self.credentials.get_principal(principal_id).await?)
    }

    fn check_password(&self, principal: &Principal, password: &str) -> AuthResult<()> {
        let pepper = self.config.pepper.as_deref();
        if password::verify_password(password, &principal.password_hash, pepper)? {
            Ok(())
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }

    fn emit(
        &self,
        kind: ActivityKind,
        severity: Severity,
        principal: &Principal,
        metadata: serde_json::Value,
    ) {
        self.activity.record(
            ActivityEvent::new(kind, severity, Some(principal.id))
                .with_tenant(principal.tenant_id)
                .with_metadata(metadata),
        );
    }

    // -----------------------------------------------------------------
    // TOTP enrollment
    // -----------------------------------------------------------------

    /// Start TOTP setup. The secret is held in the TTL store until
    /// [`enable`](Self::enable) or the setup window closes.
    pub async fn generate_secret(&self, principal_id: Uuid) -> AuthResult<Enrollment> {
        let principal = self.principal(principal_id).await?;
        if principal.two_factor_enabled {
            return Err(AuthError::TwoFactorAlreadyEnabled);
        }

        let enrollment = totp::generate_enrollment(&self.config.totp_issuer, &principal.email)?;
        self.store
            .set_ex(
                &self.keys.two_factor_temp_secret(principal_id),
                &enrollment.secret_base32,
                self.config.two_factor_setup_lifetime(),
            )
            .await?;
        info!(%principal_id, "TOTP setup started");
        Ok(enrollment)
    }

    /// Check a code against the pending setup secret without changing
    /// any state.
    pub async fn verify_setup_code(&self, principal_id: Uuid, code: &str) -> AuthResult<()> {
        let secret = self.pending_secret(principal_id).await?;
        if totp::verify_code(&secret, code, self.config.totp_skew)? {
            Ok(())
        } else {
            Err(AuthError::InvalidCode)
        }
    }

    async fn pending_secret(&self, principal_id: Uuid) -> AuthResult<String> {
        self.store
            .get(&self.keys.two_factor_temp_secret(principal_id))
            .await?
            .ok_or(AuthError::SetupExpired)
    }

    /// Persist the pending secret once `code` proves possession, and
    /// issue the first batch of recovery codes. If the credential write
    /// fails the pending secret is kept so the caller can retry.
    pub async fn enable(&self, principal_id: Uuid, code: &str) -> AuthResult<RecoveryCodeSet> {
        let secret = self.pending_secret(principal_id).await?;
        if !totp::verify_code(&secret, code, self.config.totp_skew)? {
            return Err(AuthError::InvalidCode);
        }

        let principal = self.principal(principal_id).await?;
        if principal.two_factor_enabled {
            return Err(AuthError::TwoFactorAlreadyEnabled);
        }

        let codes = RecoveryCodeSet::generate(self.config.recovery_code_count)?;
        self.credentials
            .update_two_factor(
                principal_id,
                UpdateTwoFactor {
                    enabled: true,
                    method: Some(TwoFactorMethod::Totp),
                    secret: Some(totp::seal_secret(
                        self.config.mfa_encryption_key.as_ref(),
                        &secret,
                    )?),
                    recovery_codes: Some(codes.to_stored()?),
                },
            )
            .await?;

        if let Err(e) = self
            .store
            .delete(&self.keys.two_factor_temp_secret(principal_id))
            .await
        {
            warn!(%principal_id, error = %e, "failed to clear pending TOTP secret");
        }

        info!(%principal_id, "TOTP enabled");
        self.emit(
            ActivityKind::TwoFactorEnabled,
            Severity::Info,
            &principal,
            json!({ "method": "totp" }),
        );
        Ok(codes)
    }

    // -----------------------------------------------------------------
    // Email enrollment
    // -----------------------------------------------------------------

    pub async fn begin_email_setup(&self, principal_id: Uuid) -> AuthResult<()> {
        let principal = self.principal(principal_id).await?;
        if principal.two_factor_enabled {
            return Err(AuthError::TwoFactorAlreadyEnabled);
        }
        self.email
            .generate_and_send(principal.id, &principal.email, DeliveryContext::TwoFactorSetup)
            .await
    }

    pub async fn enable_email(
        &self,
        principal_id: Uuid,
        code: &str,
    ) -> AuthResult<RecoveryCodeSet> {
        let principal = self.principal(principal_id).await?;
        if principal.two_factor_enabled {
            return Err(AuthError::TwoFactorAlreadyEnabled);
        }
        self.email.verify(principal_id, code).await?;

        let codes = RecoveryCodeSet::generate(self.config.recovery_code_count)?;
        self.credentials
            .update_two_factor(
                principal_id,
                UpdateTwoFactor {
                    enabled: true,
                    method: Some(TwoFactorMethod::Email),
                    secret: None,
                    recovery_codes: Some(codes.to_stored()?),
                },
            )
            .await?;

        info!(%principal_id, "email two-factor enabled");
        self.emit(
            ActivityKind::TwoFactorEnabled,
            Severity::Info,
            &principal,
            json!({ "method": "email" }),
        );
        Ok(codes)
    }

    // -----------------------------------------------------------------
    // Management
    // -----------------------------------------------------------------

    /// Turn two-factor off after re-checking the password. Clears the
    /// secret, method and recovery codes in one write.
    pub async fn disable(&self, principal_id: Uuid, password: &str) -> AuthResult<()> {
        let principal = self.principal(principal_id).await?;
        if !principal.two_factor_enabled {
            return Err(AuthError::TwoFactorNotEnabled);
        }
        self.check_password(&principal, password)?;

        self.credentials
            .update_two_factor(principal_id, UpdateTwoFactor::disabled())
            .await?;

        if let Err(e) = self.email.discard(principal_id).await {
            warn!(%principal_id, error = %e, "failed to discard outstanding email code");
        }

        info!(%principal_id, "two-factor disabled");
        self.emit(
            ActivityKind::TwoFactorDisabled,
            Severity::Warning,
            &principal,
            json!({}),
        );
        Ok(())
    }

    /// Replace all outstanding recovery codes after re-checking the
    /// password.
    pub async fn regenerate_recovery_codes(
        &self,
        principal_id: Uuid,
        password: &str,
    ) -> AuthResult<RecoveryCodeSet> {
        let principal = self.principal(principal_id).await?;
        if !principal.two_factor_enabled {
            return Err(AuthError::TwoFactorNotEnabled);
        }
        self.check_password(&principal, password)?;

        let codes = RecoveryCodeSet::generate(self.config.recovery_code_count)?;
        self.credentials
            .update_two_factor(
                principal_id,
                UpdateTwoFactor {
                    enabled: true,
                    method: principal.two_factor_method,
                    secret: principal.two_factor_secret.clone(),
                    recovery_codes: Some(codes.to_stored()?),
                },
            )
            .await?;

        self.emit(
            ActivityKind::RecoveryCodesRegenerated,
            Severity::Warning,
            &principal,
            json!({ "count": codes.len() }),
        );
        Ok(codes)
    }

    // -----------------------------------------------------------------
    // Login challenge
    // -----------------------------------------------------------------

    /// Open a temp session for a principal that passed the password step.
    /// For the email method a login code is sent immediately.
    pub async fn create_temp_session(
        &self,
        principal: &Principal,
        tenant_id: Option<Uuid>,
    ) -> AuthResult<TwoFactorChallenge> {
        let method = match (principal.two_factor_enabled, principal.two_factor_method) {
            (true, Some(method)) => method,
            _ => return Err(AuthError::TwoFactorNotEnabled),
        };

        let temp_token = opaque_token()?;
        let pending = PendingTwoFactor {
            principal_id: principal.id,
            tenant_id,
        };
        let value = serde_json::to_string(&pending)
            .map_err(|e| AuthError::Crypto(format!("temp session encoding: {e}")))?;
        let lifetime = self.config.two_factor_session_lifetime();
        self.store
            .set_ex(&self.keys.two_factor_temp_session(&temp_token), &value, lifetime)
            .await?;

        if method == TwoFactorMethod::Email {
            self.email
                .generate_and_send(principal.id, &principal.email, DeliveryContext::TwoFactorLogin)
                .await?;
        }

        self.emit(
            ActivityKind::TwoFactorChallengeIssued,
            Severity::Info,
            principal,
            json!({ "method": method.as_str() }),
        );
        Ok(TwoFactorChallenge {
            temp_token,
            method,
            expires_in: lifetime.as_secs(),
        })
    }

    /// Send a fresh login code for an open email challenge.
    pub async fn resend_email_code(&self, temp_token: &str) -> AuthResult<()> {
        let pending = self.peek_temp_session(temp_token).await?;
        let principal = self.principal(pending.principal_id).await?;
        if principal.two_factor_method != Some(TwoFactorMethod::Email) {
            return Err(AuthError::TwoFactorNotEnabled);
        }
        self.email
            .generate_and_send(principal.id, &principal.email, DeliveryContext::TwoFactorLogin)
            .await
    }

    /// Read a temp session without consuming it, so a wrong code can be
    /// retried within the same session.
    pub async fn peek_temp_session(&self, temp_token: &str) -> AuthResult<PendingTwoFactor> {
        if temp_token.is_empty() {
            return Err(AuthError::InvalidOrExpiredSession);
        }
        let raw = self
            .store
            .get(&self.keys.two_factor_temp_session(temp_token))
            .await?;
        parse_pending(raw)
    }

    /// Atomically read and delete a temp session. Of two concurrent
    /// callers only one succeeds.
    pub async fn consume_temp_session(&self, temp_token: &str) -> AuthResult<PendingTwoFactor> {
        if temp_token.is_empty() {
            return Err(AuthError::InvalidOrExpiredSession);
        }
        let raw = self
            .store
            .get_del(&self.keys.two_factor_temp_session(temp_token))
            .await?;
        parse_pending(raw)
    }

    // -----------------------------------------------------------------
    // Verification
    // -----------------------------------------------------------------

    /// Check a second-factor code using the principal's enabled method.
    pub async fn verify_code(&self, principal_id: Uuid, code: &str) -> AuthResult<()> {
        let principal = self.principal(principal_id).await?;
        if !principal.two_factor_enabled {
            return Err(AuthError::TwoFactorNotEnabled);
        }

        match principal.two_factor_method {
            Some(TwoFactorMethod::Totp) => {
                let stored = principal
                    .two_factor_secret
                    .as_deref()
                    .ok_or_else(|| AuthError::Crypto("TOTP enabled without a secret".into()))?;
                let secret =
                    totp::open_secret(self.config.mfa_encryption_key.as_ref(), stored)?;
                if totp::verify_code(&secret, code, self.config.totp_skew)? {
                    Ok(())
                } else {
                    Err(AuthError::InvalidCode)
                }
            }
            Some(TwoFactorMethod::Email) => self.email.verify(principal_id, code).await,
            None => Err(AuthError::TwoFactorNotEnabled),
        }
    }

    /// Consume one recovery code. Returns how many remain.
    pub async fn verify_recovery_code(&self, principal_id: Uuid, code: &str) -> AuthResult<usize> {
        let principal = self.principal(principal_id).await?;
        if !principal.two_factor_enabled {
            return Err(AuthError::TwoFactorNotEnabled);
        }

        let codes = RecoveryCodeSet::from_stored(principal.recovery_codes.as_deref())?;
        let remaining = codes.consume(code).ok_or(AuthError::InvalidCode)?;
        self.credentials
            .update_two_factor(
                principal_id,
                UpdateTwoFactor {
                    enabled: true,
                    method: principal.two_factor_method,
                    secret: principal.two_factor_secret.clone(),
                    recovery_codes: Some(remaining.to_stored()?),
                },
            )
            .await?;

        warn!(%principal_id, remaining = remaining.len(), "recovery code used");
        self.emit(
            ActivityKind::RecoveryCodeUsed,
            Severity::Warning,
            &principal,
            json!({ "remaining": remaining.len() }),
        );
        Ok(remaining.len())
    }
}

fn parse_pending(raw: Option<String>) -> AuthResult<PendingTwoFactor> {
    let raw = raw.ok_or(AuthError::InvalidOrExpiredSession)?;
    serde_json::from_str(&raw).map_err(|e| {
        warn!(error = %e, "malformed two-factor temp session");
        AuthError::InvalidOrExpiredSession
    })
}
