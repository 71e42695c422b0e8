//! Token blacklisting, principal-wide revocation and the single-current
//! refresh token record.

use std::time::Duration;

use chrono::{DateTime, Utc};
use gatekeep_core::repository::TtlStore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{AuthConfig, ReadFailurePolicy};
use crate::error::{AuthError, AuthResult};
use crate::keys::KeySpace;
use crate::secure::constant_time_eq;
use crate::token::TokenClaims;

pub struct RevocationService<S: TtlStore> {
    store: S,
    keys: KeySpace,
    max_token_lifetime: Duration,
    refresh_lifetime: Duration,
    read_failure: ReadFailurePolicy,
}

impl<S: TtlStore> RevocationService<S> {
    pub fn new(store: S, config: &AuthConfig) -> Self {
        Self {
            store,
            keys: KeySpace::new(&config.key_prefix),
            max_token_lifetime: config.max_token_lifetime(),
            refresh_lifetime: config.refresh_token_lifetime(),
            read_failure: config.revocation_read_failure,
        }
    }

    /// Blacklist one token for its remaining lifetime. A token that has
    /// already expired needs no entry.
    pub async fn blacklist_token(
        &self,
        token: &str,
        principal_id: Uuid,
        remaining: Duration,
    ) -> AuthResult<()> {
        if remaining.is_zero() {
            debug!(%principal_id, "token already expired, nothing to blacklist");
            return Ok(());
        }
        self.store
            .set_ex(
                &self.keys.blacklisted_token(token),
                &principal_id.to_string(),
                remaining,
            )
            .await?;
        debug!(%principal_id, ttl_secs = remaining.as_secs(), "token blacklisted");
        Ok(())
    }

    /// Blacklist a validated token using the lifetime left in its claims.
    pub async fn blacklist_claims(&self, token: &str, claims: &TokenClaims) -> AuthResult<()> {
        self.blacklist_token(
            token,
            claims.principal_id,
            claims.remaining_lifetime(Utc::now()),
        )
        .await
    }

    /// Blacklist a token only if it is not blacklisted yet. Returns
    /// `false` when another caller got there first, which makes the
    /// check-and-retire of a refresh token atomic.
    pub async fn retire_token(&self, token: &str, claims: &TokenClaims) -> AuthResult<bool> {
        let remaining = claims.remaining_lifetime(Utc::now());
        if remaining.is_zero() {
            return Ok(false);
        }
        Ok(self
            .store
            .set_nx_ex(
                &self.keys.blacklisted_token(token),
                &claims.principal_id.to_string(),
                remaining,
            )
            .await?)
    }

    /// Invalidate every token the principal holds in `tenant_id` that was
    /// issued at or before now. Returns the recorded revocation instant.
    ///
    /// Does not return until the clock has moved past the recorded
    /// microsecond, so a token issued after the call is never covered.
    pub async fn blacklist_all_for_principal(
        &self,
        tenant_id: Uuid,
        principal_id: Uuid,
    ) -> AuthResult<DateTime<Utc>> {
        let now = Utc::now();
        let revoked_at_us = now.timestamp_micros();
        self.store
            .set_ex(
                &self.keys.blacklisted_principal(tenant_id, principal_id),
                &revoked_at_us.to_string(),
                self.max_token_lifetime,
            )
            .await?;
        while Utc::now().timestamp_micros() <= revoked_at_us {
            std::hint::spin_loop();
        }
        info!(%tenant_id, %principal_id, "all tokens revoked for principal");
        Ok(now)
    }

    /// True if the token is individually blacklisted or was issued at or
    /// before a principal-wide revocation in its tenant.
    pub async fn is_revoked(&self, token: &str, claims: &TokenClaims) -> AuthResult<bool> {
        if self
            .store
            .get(&self.keys.blacklisted_token(token))
            .await?
            .is_some()
        {
            return Ok(true);
        }

        let key = self
            .keys
            .blacklisted_principal(claims.tenant_id, claims.principal_id);
        match self.store.get(&key).await? {
            None => Ok(false),
            Some(raw) => match raw.parse::<i64>() {
                Ok(revoked_at_us) => Ok(claims.iat_us <= revoked_at_us),
                Err(_) => {
                    warn!(%key, "unparseable principal revocation entry, treating as revoked");
                    Ok(true)
                }
            },
        }
    }

    /// [`is_revoked`](Self::is_revoked) mapped to an error, applying the
    /// configured policy when the store cannot be read.
    pub async fn ensure_not_revoked(&self, token: &str, claims: &TokenClaims) -> AuthResult<()> {
        match self.is_revoked(token, claims).await {
            Ok(false) => Ok(()),
            Ok(true) => Err(AuthError::RevokedToken),
            Err(AuthError::Backend(e)) if e.is_store_failure() => match self.read_failure {
                ReadFailurePolicy::FailClosed => {
                    warn!(
                        error = %e,
                        principal_id = %claims.principal_id,
                        "revocation check failed, rejecting token"
                    );
                    Err(AuthError::RevokedToken)
                }
                ReadFailurePolicy::FailOpen => {
                    warn!(
                        error = %e,
                        principal_id = %claims.principal_id,
                        "revocation check failed, trusting token"
                    );
                    Ok(())
                }
            },
            Err(e) => Err(e),
        }
    }

    /// Record `token` as the principal's only valid refresh token in
    /// `tenant_id`, superseding any previous one.
    pub async fn store_refresh(
        &self,
        tenant_id: Uuid,
        principal_id: Uuid,
        token: &str,
    ) -> AuthResult<()> {
        self.store
            .set_ex(
                &self.keys.refresh(tenant_id, principal_id),
                token,
                self.refresh_lifetime,
            )
            .await?;
        Ok(())
    }

    pub async fn is_current_refresh(
        &self,
        tenant_id: Uuid,
        principal_id: Uuid,
        token: &str,
    ) -> AuthResult<bool> {
        let current = self
            .store
            .get(&self.keys.refresh(tenant_id, principal_id))
            .await?;
        Ok(current.is_some_and(|current| constant_time_eq(&current, token)))
    }

    pub async fn clear_refresh(&self, tenant_id: Uuid, principal_id: Uuid) -> AuthResult<()> {
        self.store
            .delete(&self.keys.refresh(tenant_id, principal_id))
            .await?;
        Ok(())
    }
}
