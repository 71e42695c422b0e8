//! Server-side admin GUI sessions and their CSRF tokens.

use std::sync::Arc;
use std::time::Duration;

use gatekeep_core::models::activity::{ActivityEvent, ActivityKind, Severity};
use gatekeep_core::repository::{ActivitySink, TtlStore};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::keys::KeySpace;
use crate::secure::{constant_time_eq, opaque_token};

pub struct AdminSessionService<S: TtlStore> {
    store: S,
    keys: KeySpace,
    lifetime: Duration,
    activity: Arc<dyn ActivitySink>,
}

impl<S: TtlStore> AdminSessionService<S> {
    pub fn new(store: S, config: &AuthConfig, activity: Arc<dyn ActivitySink>) -> Self {
        Self {
            store,
            keys: KeySpace::new(&config.key_prefix),
            lifetime: config.admin_session_lifetime(),
            activity,
        }
    }

    /// Open a session for `principal_id` and return its opaque ID.
    pub async fn create_session(&self, principal_id: Uuid) -> AuthResult<String> {
        let session_id = opaque_token()?;
        self.store
            .set_ex(
                &self.keys.session(&session_id),
                &principal_id.to_string(),
                self.lifetime,
            )
            .await?;

        info!(%principal_id, "admin session created");
        self.activity.record(ActivityEvent::new(
            ActivityKind::AdminSessionCreated,
            Severity::Info,
            Some(principal_id),
        ));
        Ok(session_id)
    }

    /// Resolve a session ID to its principal.
    pub async fn validate_session(&self, session_id: &str) -> AuthResult<Uuid> {
        if session_id.is_empty() {
            return Err(AuthError::InvalidOrExpiredSession);
        }
        let raw = self
            .store
            .get(&self.keys.session(session_id))
            .await?
            .ok_or(AuthError::InvalidOrExpiredSession)?;
        raw.parse().map_err(|_| {
            warn!("malformed admin session entry");
            AuthError::InvalidOrExpiredSession
        })
    }

    /// End a session and drop its CSRF token. Idempotent.
    pub async fn logout(&self, session_id: &str) -> AuthResult<()> {
        if session_id.is_empty() {
            return Ok(());
        }
        let principal_id = self
            .store
            .get_del(&self.keys.session(session_id))
            .await?
            .and_then(|raw| raw.parse::<Uuid>().ok());
        self.store.delete(&self.keys.csrf(session_id)).await?;

        if let Some(principal_id) = principal_id {
            info!(%principal_id, "admin session ended");
            self.activity.record(ActivityEvent::new(
                ActivityKind::AdminSessionEnded,
                Severity::Info,
                Some(principal_id),
            ));
        }
        Ok(())
    }

    /// Return the session's CSRF token, creating it on first use.
    /// Concurrent first calls all observe the same token.
    pub async fn csrf_token(&self, session_id: &str) -> AuthResult<String> {
        self.validate_session(session_id).await?;
        let key = self.keys.csrf(session_id);

        // A second round covers the token expiring between the failed
        // insert and the read.
        for _ in 0..2 {
            let candidate = opaque_token()?;
            if self.store.set_nx_ex(&key, &candidate, self.lifetime).await? {
                debug!("CSRF token issued");
                return Ok(candidate);
            }
            if let Some(existing) = self.store.get(&key).await? {
                return Ok(existing);
            }
        }
        Err(AuthError::InvalidOrExpiredSession)
    }

    /// True only when the session is live and `submitted` equals its
    /// CSRF token. Store failures count as a mismatch.
    pub async fn validate_csrf(&self, session_id: &str, submitted: &str) -> bool {
        if session_id.is_empty() || submitted.is_empty() {
            return false;
        }
        match self.check_csrf(session_id, submitted).await {
            Ok(valid) => valid,
            Err(e) => {
                warn!(error = %e, "CSRF validation failed closed");
                false
            }
        }
    }

    async fn check_csrf(&self, session_id: &str, submitted: &str) -> AuthResult<bool> {
        if self
            .store
            .get(&self.keys.session(session_id))
            .await?
            .is_none()
        {
            return Ok(false);
        }
        let stored = self.store.get(&self.keys.csrf(session_id)).await?;
        Ok(stored.is_some_and(|stored| constant_time_eq(&stored, submitted)))
    }
}
