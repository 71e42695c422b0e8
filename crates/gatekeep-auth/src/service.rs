//! Authentication service: login, second factor, refresh rotation,
//! logout and revocation orchestration.

use std::sync::Arc;

use chrono::Utc;
use gatekeep_core::error::GatekeepError;
use gatekeep_core::models::activity::{ActivityEvent, ActivityKind, Severity};
use gatekeep_core::models::principal::{Principal, PrincipalKind};
use gatekeep_core::repository::{ActivitySink, CodeDelivery, CredentialRepository, TtlStore};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::password;
use crate::revocation::RevocationService;
use crate::session::AdminSessionService;
use crate::token::{TokenClaims, TokenKind, TokenService};
use crate::two_factor::{PendingTwoFactor, TwoFactorChallenge, TwoFactorService};

/// Input for the tenant login flow.
#[derive(Debug)]
pub struct LoginInput {
    pub tenant_id: Uuid,
    pub email: String,
    pub password: String,
}

/// A freshly issued access/refresh pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
    /// Refresh token lifetime in seconds.
    pub refresh_expires_in: u64,
}

#[derive(Debug)]
pub enum LoginOutcome {
    Authenticated(TokenPair),
    TwoFactorRequired(TwoFactorChallenge),
}

#[derive(Debug)]
pub enum AdminLoginOutcome {
    Authenticated { session_id: String },
    TwoFactorRequired(TwoFactorChallenge),
}

#[derive(Debug, Clone, Copy)]
enum SecondFactor<'a> {
    Code(&'a str),
    RecoveryCode(&'a str),
}

/// Authentication service.
///
/// Generic over the credential store, TTL store and code delivery so
/// that it has no dependency on the storage crate.
pub struct AuthService<C, S, D>
where
    C: CredentialRepository + Clone,
    S: TtlStore + Clone,
    D: CodeDelivery,
{
    credentials: C,
    tokens: TokenService,
    revocation: RevocationService<S>,
    two_factor: TwoFactorService<C, S, D>,
    sessions: AdminSessionService<S>,
    activity: Arc<dyn ActivitySink>,
    config: AuthConfig,
}

impl<C, S, D> AuthService<C, S, D>
where
    C: CredentialRepository + Clone,
    S: TtlStore + Clone,
    D: CodeDelivery,
{
    pub fn new(
        credentials: C,
        store: S,
        delivery: D,
        config: AuthConfig,
        activity: Arc<dyn ActivitySink>,
    ) -> AuthResult<Self> {
        Ok(Self {
            tokens: TokenService::new(&config)?,
            revocation: RevocationService::new(store.clone(), &config),
            sessions: AdminSessionService::new(store.clone(), &config, activity.clone()),
            two_factor: TwoFactorService::new(
                credentials.clone(),
                store,
                delivery,
                config.clone(),
                activity.clone(),
            ),
            credentials,
            activity,
            config,
        })
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn revocation(&self) -> &RevocationService<S> {
        &self.revocation
    }

    pub fn two_factor(&self) -> &TwoFactorService<C, S, D> {
        &self.two_factor
    }

    pub fn sessions(&self) -> &AdminSessionService<S> {
        &self.sessions
    }

    fn emit(&self, event: ActivityEvent) {
        self.activity.record(event);
    }

    // -----------------------------------------------------------------
    // Password step
    // -----------------------------------------------------------------

    /// Look up and password-check a principal. Every failure, including
    /// an inactive account, is reported as `InvalidCredentials`.
    async fn check_credentials(
        &self,
        tenant_id: Option<Uuid>,
        email: &str,
        password: &str,
    ) -> AuthResult<Principal> {
        let principal = match self.credentials.find_by_login(tenant_id, email).await {
            Ok(p) => p,
            Err(GatekeepError::NotFound { .. }) => {
                password::verify_dummy(password, self.config.pepper.as_deref())?;
                self.login_failed(tenant_id, None, "unknown principal");
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => return Err(e.into()),
        };

        let pepper = self.config.pepper.as_deref();
        if !password::verify_password(password, &principal.password_hash, pepper)? {
            self.login_failed(tenant_id, Some(principal.id), "wrong password");
            return Err(AuthError::InvalidCredentials);
        }
        if !principal.active {
            self.login_failed(tenant_id, Some(principal.id), "inactive");
            return Err(AuthError::InvalidCredentials);
        }
        Ok(principal)
    }

    fn login_failed(&self, tenant_id: Option<Uuid>, principal_id: Option<Uuid>, reason: &str) {
        debug!(?tenant_id, ?principal_id, reason, "login failed");
        self.emit(
            ActivityEvent::new(ActivityKind::LoginFailed, Severity::Warning, principal_id)
                .with_tenant(tenant_id)
                .with_metadata(json!({ "reason": reason })),
        );
    }

    /// Password login into a tenant. Returns tokens directly, or a
    /// challenge when the principal has two-factor enabled.
    pub async fn login(&self, input: LoginInput) -> AuthResult<LoginOutcome> {
        let principal = self
            .check_credentials(Some(input.tenant_id), &input.email, &input.password)
            .await?;

        if principal.two_factor_enabled {
            let challenge = self
                .two_factor
                .create_temp_session(&principal, Some(input.tenant_id))
                .await?;
            return Ok(LoginOutcome::TwoFactorRequired(challenge));
        }

        let pair = self.start_token_session(&principal, input.tenant_id).await?;
        Ok(LoginOutcome::Authenticated(pair))
    }

    /// Password login for admin principals, yielding a GUI session.
    pub async fn admin_login(&self, email: &str, password: &str) -> AuthResult<AdminLoginOutcome> {
        let principal = self.check_credentials(None, email, password).await?;
        if principal.kind != PrincipalKind::Admin {
            self.login_failed(None, Some(principal.id), "not an admin");
            return Err(AuthError::InvalidCredentials);
        }

        if principal.two_factor_enabled {
            let challenge = self.two_factor.create_temp_session(&principal, None).await?;
            return Ok(AdminLoginOutcome::TwoFactorRequired(challenge));
        }

        let session_id = self.start_admin_session(&principal).await?;
        Ok(AdminLoginOutcome::Authenticated { session_id })
    }

    // -----------------------------------------------------------------
    // Second factor
    // -----------------------------------------------------------------

    /// Verify a factor against an open temp session and consume it.
    /// A wrong code leaves the session open for another attempt.
    async fn pass_challenge(
        &self,
        temp_token: &str,
        admin: bool,
        factor: SecondFactor<'_>,
    ) -> AuthResult<(PendingTwoFactor, Principal)> {
        let pending = self.two_factor.peek_temp_session(temp_token).await?;
        if pending.tenant_id.is_none() != admin {
            return Err(AuthError::InvalidOrExpiredSession);
        }

        let result = match factor {
            SecondFactor::Code(code) => {
                self.two_factor
                    .verify_code(pending.principal_id, code)
                    .await
            }
            SecondFactor::RecoveryCode(code) => self
                .two_factor
                .verify_recovery_code(pending.principal_id, code)
                .await
                .map(|_| ()),
        };
        if let Err(e) = result {
            if matches!(e, AuthError::InvalidCode) {
                self.emit(
                    ActivityEvent::new(
                        ActivityKind::TwoFactorFailed,
                        Severity::Warning,
                        Some(pending.principal_id),
                    )
                    .with_tenant(pending.tenant_id),
                );
            }
            return Err(e);
        }

        let pending = self.two_factor.consume_temp_session(temp_token).await?;
        let principal = self.credentials.get_principal(pending.principal_id).await?;
        if !principal.active {
            return Err(AuthError::InvalidCredentials);
        }
        Ok((pending, principal))
    }

    pub async fn complete_two_factor(&self, temp_token: &str, code: &str) -> AuthResult<TokenPair> {
        let (pending, principal) = self
            .pass_challenge(temp_token, false, SecondFactor::Code(code))
            .await?;
        let tenant_id = pending.tenant_id.ok_or(AuthError::InvalidOrExpiredSession)?;
        self.start_token_session(&principal, tenant_id).await
    }

    pub async fn complete_with_recovery_code(
        &self,
        temp_token: &str,
        recovery_code: &str,
    ) -> AuthResult<TokenPair> {
        let (pending, principal) = self
            .pass_challenge(temp_token, false, SecondFactor::RecoveryCode(recovery_code))
            .await?;
        let tenant_id = pending.tenant_id.ok_or(AuthError::InvalidOrExpiredSession)?;
        self.start_token_session(&principal, tenant_id).await
    }

    pub async fn complete_admin_two_factor(
        &self,
        temp_token: &str,
        code: &str,
    ) -> AuthResult<String> {
        let (_, principal) = self
            .pass_challenge(temp_token, true, SecondFactor::Code(code))
            .await?;
        self.start_admin_session(&principal).await
    }

    pub async fn complete_admin_with_recovery_code(
        &self,
        temp_token: &str,
        recovery_code: &str,
    ) -> AuthResult<String> {
        let (_, principal) = self
            .pass_challenge(temp_token, true, SecondFactor::RecoveryCode(recovery_code))
            .await?;
        self.start_admin_session(&principal).await
    }

    // -----------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------

    async fn issue_pair(&self, principal_id: Uuid, tenant_id: Uuid) -> AuthResult<TokenPair> {
        let access = self.tokens.issue_access(principal_id, tenant_id)?;
        let refresh = self.tokens.issue_refresh(principal_id, tenant_id)?;
        self.revocation
            .store_refresh(tenant_id, principal_id, &refresh.token)
            .await?;

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
            expires_in: self.tokens.access_lifetime().as_secs(),
            refresh_expires_in: self.tokens.refresh_lifetime().as_secs(),
        })
    }

    async fn touch_last_login(&self, principal_id: Uuid) {
        if let Err(e) = self.credentials.record_login(principal_id, Utc::now()).await {
            warn!(%principal_id, error = %e, "failed to record last login");
        }
    }

    async fn start_token_session(
        &self,
        principal: &Principal,
        tenant_id: Uuid,
    ) -> AuthResult<TokenPair> {
        let pair = self.issue_pair(principal.id, tenant_id).await?;
        self.touch_last_login(principal.id).await;

        info!(principal_id = %principal.id, %tenant_id, "login succeeded");
        self.emit(
            ActivityEvent::new(ActivityKind::LoginSucceeded, Severity::Info, Some(principal.id))
                .with_tenant(Some(tenant_id)),
        );
        Ok(pair)
    }

    async fn start_admin_session(&self, principal: &Principal) -> AuthResult<String> {
        let session_id = self.sessions.create_session(principal.id).await?;
        self.touch_last_login(principal.id).await;
        Ok(session_id)
    }

    // -----------------------------------------------------------------
    // Token lifecycle
    // -----------------------------------------------------------------

    /// Validate an access token for `tenant_id`, including revocation.
    pub async fn authenticate(
        &self,
        tenant_id: Uuid,
        access_token: &str,
    ) -> AuthResult<TokenClaims> {
        let claims = self
            .tokens
            .validate_for(access_token, tenant_id, TokenKind::Access)?;
        self.revocation
            .ensure_not_revoked(access_token, &claims)
            .await?;
        Ok(claims)
    }

    /// Exchange the current refresh token for a new pair. The presented
    /// token is retired; presenting it again is rejected.
    pub async fn refresh(&self, tenant_id: Uuid, refresh_token: &str) -> AuthResult<TokenPair> {
        let claims = self
            .tokens
            .validate_for(refresh_token, tenant_id, TokenKind::Refresh)?;
        self.revocation
            .ensure_not_revoked(refresh_token, &claims)
            .await?;

        let principal_id = claims.principal_id;
        let current = self
            .revocation
            .is_current_refresh(tenant_id, principal_id, refresh_token)
            .await?;
        if !current || !self.revocation.retire_token(refresh_token, &claims).await? {
            warn!(%principal_id, %tenant_id, "superseded refresh token presented");
            self.emit(
                ActivityEvent::new(
                    ActivityKind::RefreshReplayRejected,
                    Severity::Critical,
                    Some(principal_id),
                )
                .with_tenant(Some(tenant_id)),
            );
            return Err(AuthError::RevokedToken);
        }

        let principal = self.credentials.get_principal(principal_id).await?;
        if !principal.active || !principal.belongs_to(tenant_id) {
            self.revocation.clear_refresh(tenant_id, principal_id).await?;
            return Err(AuthError::RevokedToken);
        }

        let pair = self.issue_pair(principal_id, tenant_id).await?;
        debug!(%principal_id, %tenant_id, "refresh token rotated");
        self.emit(
            ActivityEvent::new(ActivityKind::TokenRefreshed, Severity::Info, Some(principal_id))
                .with_tenant(Some(tenant_id)),
        );
        Ok(pair)
    }

    /// Blacklist the access token. When the refresh token is presented
    /// too, it is blacklisted and the principal's refresh record in this
    /// tenant is dropped; otherwise the refresh token stays usable.
    pub async fn logout(
        &self,
        tenant_id: Uuid,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> AuthResult<()> {
        let claims = self
            .tokens
            .validate_for(access_token, tenant_id, TokenKind::Access)?;
        self.revocation
            .blacklist_claims(access_token, &claims)
            .await?;

        if let Some(refresh_token) = refresh_token {
            match self
                .tokens
                .validate_for(refresh_token, tenant_id, TokenKind::Refresh)
            {
                Ok(refresh) if refresh.principal_id == claims.principal_id => {
                    self.revocation
                        .blacklist_claims(refresh_token, &refresh)
                        .await?;
                    self.revocation
                        .clear_refresh(tenant_id, claims.principal_id)
                        .await?;
                }
                Ok(_) => warn!("logout presented a refresh token of another principal"),
                Err(e) => debug!(error = %e, "ignoring unusable refresh token on logout"),
            }
        }

        info!(principal_id = %claims.principal_id, %tenant_id, "logout");
        self.emit(
            ActivityEvent::new(ActivityKind::Logout, Severity::Info, Some(claims.principal_id))
                .with_tenant(Some(tenant_id)),
        );
        Ok(())
    }

    /// Change the password of the token's principal and revoke every
    /// token it holds in the tenant.
    pub async fn change_password(
        &self,
        tenant_id: Uuid,
        access_token: &str,
        current_password: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        let claims = self.authenticate(tenant_id, access_token).await?;
        let principal = self.credentials.get_principal(claims.principal_id).await?;

        let pepper = self.config.pepper.as_deref();
        if !password::verify_password(current_password, &principal.password_hash, pepper)? {
            return Err(AuthError::InvalidCredentials);
        }
        if new_password.chars().count() < self.config.min_password_length {
            return Err(AuthError::PasswordTooShort {
                min_length: self.config.min_password_length,
            });
        }

        let hash = password::hash_password(new_password, pepper)?;
        self.credentials
            .update_password(principal.id, &hash)
            .await?;
        self.revoke_tokens(tenant_id, principal.id).await?;

        self.emit(
            ActivityEvent::new(ActivityKind::PasswordChanged, Severity::Warning, Some(principal.id))
                .with_tenant(Some(tenant_id)),
        );
        Ok(())
    }

    /// Force-logout a principal from a tenant, e.g. after deactivation.
    pub async fn revoke_principal(&self, tenant_id: Uuid, principal_id: Uuid) -> AuthResult<()> {
        self.revoke_tokens(tenant_id, principal_id).await?;
        self.emit(
            ActivityEvent::new(
                ActivityKind::PrincipalRevoked,
                Severity::Critical,
                Some(principal_id),
            )
            .with_tenant(Some(tenant_id)),
        );
        Ok(())
    }

    async fn revoke_tokens(&self, tenant_id: Uuid, principal_id: Uuid) -> AuthResult<()> {
        self.revocation
            .blacklist_all_for_principal(tenant_id, principal_id)
            .await?;
        self.revocation.clear_refresh(tenant_id, principal_id).await
    }
}
