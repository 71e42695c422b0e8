//! Principal (user or administrative operator) domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PrincipalKind {
    /// End user scoped to a single tenant application.
    User,
    /// Administrative operator; global, not bound to a tenant.
    Admin,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TwoFactorMethod {
    Totp,
    Email,
}

impl TwoFactorMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Totp => "totp",
            Self::Email => "email",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "totp" => Some(Self::Totp),
            "email" => Some(Self::Email),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub kind: PrincipalKind,
    /// Tenant application scope. `None` for admin principals.
    pub tenant_id: Option<Uuid>,
    /// Login identifier, also the destination for email codes.
    pub email: String,
    pub password_hash: String,
    pub active: bool,
    pub two_factor_enabled: bool,
    pub two_factor_method: Option<TwoFactorMethod>,
    /// TOTP secret, possibly encrypted at rest. Only set for the TOTP method.
    pub two_factor_secret: Option<String>,
    /// JSON array of outstanding recovery codes.
    pub recovery_codes: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Principal {
    /// True when the principal may act inside `tenant_id`.
    ///
    /// Admin principals are global and belong to no tenant.
    pub fn belongs_to(&self, tenant_id: Uuid) -> bool {
        self.tenant_id == Some(tenant_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePrincipal {
    pub kind: PrincipalKind,
    pub tenant_id: Option<Uuid>,
    pub email: String,
    /// Already-hashed password (PHC string).
    pub password_hash: String,
}

/// Full replacement of a principal's two-factor fields.
///
/// Written as one unit so a half-configured state is never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateTwoFactor {
    pub enabled: bool,
    pub method: Option<TwoFactorMethod>,
    pub secret: Option<String>,
    pub recovery_codes: Option<String>,
}

impl UpdateTwoFactor {
    /// The cleared state written on disable.
    pub fn disabled() -> Self {
        Self::default()
    }
}
