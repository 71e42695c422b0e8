//! Activity events emitted to the activity-log collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ActivityKind {
    LoginSucceeded,
    LoginFailed,
    TwoFactorChallengeIssued,
    TwoFactorFailed,
    RecoveryCodeUsed,
    Logout,
    TokenRefreshed,
    RefreshReplayRejected,
    TwoFactorEnabled,
    TwoFactorDisabled,
    RecoveryCodesRegenerated,
    PasswordChanged,
    PrincipalRevoked,
    AdminSessionCreated,
    AdminSessionEnded,
}

impl ActivityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoginSucceeded => "login_succeeded",
            Self::LoginFailed => "login_failed",
            Self::TwoFactorChallengeIssued => "2fa_challenge_issued",
            Self::TwoFactorFailed => "2fa_failed",
            Self::RecoveryCodeUsed => "recovery_code_used",
            Self::Logout => "logout",
            Self::TokenRefreshed => "token_refreshed",
            Self::RefreshReplayRejected => "refresh_replay_rejected",
            Self::TwoFactorEnabled => "2fa_enabled",
            Self::TwoFactorDisabled => "2fa_disabled",
            Self::RecoveryCodesRegenerated => "recovery_codes_regenerated",
            Self::PasswordChanged => "password_changed",
            Self::PrincipalRevoked => "principal_revoked",
            Self::AdminSessionCreated => "admin_session_created",
            Self::AdminSessionEnded => "admin_session_ended",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub kind: ActivityKind,
    pub severity: Severity,
    pub principal_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl ActivityEvent {
    pub fn new(kind: ActivityKind, severity: Severity, principal_id: Option<Uuid>) -> Self {
        Self {
            kind,
            severity,
            principal_id,
            tenant_id: None,
            metadata: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_tenant(mut self, tenant_id: Option<Uuid>) -> Self {
        self.tenant_id = tenant_id;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}
