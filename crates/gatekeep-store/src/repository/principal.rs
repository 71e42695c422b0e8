//! SurrealDB implementation of [`CredentialRepository`].
//!
//! Users are unique per `(tenant, email)`; admins live in the `global`
//! scope. Password hashes arrive already hashed: hashing belongs to the
//! auth layer so the pepper never reaches the database crate.

use chrono::{DateTime, Utc};
use gatekeep_core::error::{GatekeepError, GatekeepResult};
use gatekeep_core::models::principal::{
    CreatePrincipal, Principal, PrincipalKind, TwoFactorMethod, UpdateTwoFactor,
};
use gatekeep_core::repository::CredentialRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;

const GLOBAL_SCOPE: &str = "global";

/// DB-side row struct for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct PrincipalRow {
    kind: String,
    tenant_id: Option<String>,
    email: String,
    password_hash: String,
    active: bool,
    two_factor_enabled: bool,
    two_factor_method: Option<String>,
    two_factor_secret: Option<String>,
    recovery_codes: Option<String>,
    last_login_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct PrincipalRowWithId {
    record_id: String,
    kind: String,
    tenant_id: Option<String>,
    email: String,
    password_hash: String,
    active: bool,
    two_factor_enabled: bool,
    two_factor_method: Option<String>,
    two_factor_secret: Option<String>,
    recovery_codes: Option<String>,
    last_login_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Row returned by write queries; only used to detect a missing record.
#[derive(Debug, SurrealValue)]
struct TouchedRow {
    updated_at: DateTime<Utc>,
}

fn parse_kind(s: &str) -> Result<PrincipalKind, StoreError> {
    match s {
        "User" => Ok(PrincipalKind::User),
        "Admin" => Ok(PrincipalKind::Admin),
        other => Err(StoreError::Malformed(format!("unknown principal kind: {other}"))),
    }
}

fn kind_to_string(kind: PrincipalKind) -> &'static str {
    match kind {
        PrincipalKind::User => "User",
        PrincipalKind::Admin => "Admin",
    }
}

fn parse_uuid(field: &str, value: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(value).map_err(|e| StoreError::Malformed(format!("invalid {field} UUID: {e}")))
}

fn scope_key(tenant_id: Option<Uuid>) -> String {
    tenant_id
        .map(|t| t.to_string())
        .unwrap_or_else(|| GLOBAL_SCOPE.to_string())
}

impl PrincipalRow {
    fn into_principal(self, id: Uuid) -> Result<Principal, StoreError> {
        let tenant_id = self
            .tenant_id
            .as_deref()
            .map(|t| parse_uuid("tenant", t))
            .transpose()?;
        Ok(Principal {
            id,
            kind: parse_kind(&self.kind)?,
            tenant_id,
            email: self.email,
            password_hash: self.password_hash,
            active: self.active,
            two_factor_enabled: self.two_factor_enabled,
            two_factor_method: self
                .two_factor_method
                .as_deref()
                .and_then(TwoFactorMethod::parse),
            two_factor_secret: self.two_factor_secret,
            recovery_codes: self.recovery_codes,
            last_login_at: self.last_login_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl PrincipalRowWithId {
    fn try_into_principal(self) -> Result<Principal, StoreError> {
        let id = parse_uuid("principal", &self.record_id)?;
        PrincipalRow {
            kind: self.kind,
            tenant_id: self.tenant_id,
            email: self.email,
            password_hash: self.password_hash,
            active: self.active,
            two_factor_enabled: self.two_factor_enabled,
            two_factor_method: self.two_factor_method,
            two_factor_secret: self.two_factor_secret,
            recovery_codes: self.recovery_codes,
            last_login_at: self.last_login_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
        .into_principal(id)
    }
}

/// SurrealDB implementation of the credential store.
#[derive(Clone)]
pub struct SurrealPrincipalRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealPrincipalRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    /// Provision a new principal. Admins must not carry a tenant.
    pub async fn create(&self, input: CreatePrincipal) -> GatekeepResult<Principal> {
        if input.kind == PrincipalKind::Admin && input.tenant_id.is_some() {
            return Err(StoreError::Malformed("admin principals are global".into()).into());
        }

        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('principal', $id) SET \
                 kind = $kind, \
                 tenant_id = $tenant_id, \
                 scope = $scope, \
                 email = $email, \
                 password_hash = $password_hash",
            )
            .bind(("id", id_str.clone()))
            .bind(("kind", kind_to_string(input.kind).to_string()))
            .bind(("tenant_id", input.tenant_id.map(|t| t.to_string())))
            .bind(("scope", scope_key(input.tenant_id)))
            .bind(("email", input.email))
            .bind(("password_hash", input.password_hash))
            .await
            .map_err(StoreError::from)?;

        let mut result = result.check().map_err(|e| {
            let message = e.to_string();
            if message.contains("already contains") {
                GatekeepError::AlreadyExists {
                    entity: "principal".into(),
                }
            } else {
                StoreError::Query(message).into()
            }
        })?;

        let rows: Vec<PrincipalRow> = result.take(0).map_err(StoreError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| StoreError::NotFound {
            entity: "principal".into(),
            id: id_str,
        })?;

        Ok(row.into_principal(id)?)
    }

    /// Flip the active flag (deactivation is a credential-store concern;
    /// token revocation is handled by the auth layer).
    pub async fn set_active(&self, id: Uuid, active: bool) -> GatekeepResult<()> {
        let result = self
            .db
            .query(
                "UPDATE type::record('principal', $id) SET \
                 active = $active, updated_at = time::now()",
            )
            .bind(("id", id.to_string()))
            .bind(("active", active))
            .await
            .map_err(StoreError::from)?;

        let mut result = result
            .check()
            .map_err(|e| StoreError::Query(e.to_string()))?;
        let rows: Vec<TouchedRow> = result.take(0).map_err(StoreError::from)?;
        ensure_touched(id, rows)
    }
}

fn ensure_touched(id: Uuid, rows: Vec<TouchedRow>) -> GatekeepResult<()> {
    match rows.first() {
        Some(row) => {
            debug!(principal_id = %id, updated_at = %row.updated_at, "principal updated");
            Ok(())
        }
        None => Err(StoreError::NotFound {
            entity: "principal".into(),
            id: id.to_string(),
        }
        .into()),
    }
}

impl<C: Connection> CredentialRepository for SurrealPrincipalRepository<C> {
    async fn get_principal(&self, id: Uuid) -> GatekeepResult<Principal> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('principal', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(StoreError::from)?;

        let rows: Vec<PrincipalRow> = result.take(0).map_err(StoreError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| StoreError::NotFound {
            entity: "principal".into(),
            id: id_str,
        })?;

        Ok(row.into_principal(id)?)
    }

    async fn find_by_login(
        &self,
        tenant_id: Option<Uuid>,
        email: &str,
    ) -> GatekeepResult<Principal> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM principal \
                 WHERE scope = $scope AND email = $email",
            )
            .bind(("scope", scope_key(tenant_id)))
            .bind(("email", email.to_string()))
            .await
            .map_err(StoreError::from)?;

        let rows: Vec<PrincipalRowWithId> = result.take(0).map_err(StoreError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| StoreError::NotFound {
            entity: "principal".into(),
            id: format!("email={email}"),
        })?;

        Ok(row.try_into_principal()?)
    }

    async fn update_two_factor(&self, id: Uuid, input: UpdateTwoFactor) -> GatekeepResult<()> {
        let result = self
            .db
            .query(
                "UPDATE type::record('principal', $id) SET \
                 two_factor_enabled = $enabled, \
                 two_factor_method = $method, \
                 two_factor_secret = $secret, \
                 recovery_codes = $recovery_codes, \
                 updated_at = time::now()",
            )
            .bind(("id", id.to_string()))
            .bind(("enabled", input.enabled))
            .bind(("method", input.method.map(|m| m.as_str().to_string())))
            .bind(("secret", input.secret))
            .bind(("recovery_codes", input.recovery_codes))
            .await
            .map_err(StoreError::from)?;

        let mut result = result
            .check()
            .map_err(|e| StoreError::Query(e.to_string()))?;
        let rows: Vec<TouchedRow> = result.take(0).map_err(StoreError::from)?;
        ensure_touched(id, rows)
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> GatekeepResult<()> {
        let result = self
            .db
            .query(
                "UPDATE type::record('principal', $id) SET \
                 password_hash = $password_hash, updated_at = time::now()",
            )
            .bind(("id", id.to_string()))
            .bind(("password_hash", password_hash.to_string()))
            .await
            .map_err(StoreError::from)?;

        let mut result = result
            .check()
            .map_err(|e| StoreError::Query(e.to_string()))?;
        let rows: Vec<TouchedRow> = result.take(0).map_err(StoreError::from)?;
        ensure_touched(id, rows)
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> GatekeepResult<()> {
        let result = self
            .db
            .query(
                "UPDATE type::record('principal', $id) SET \
                 last_login_at = $at, updated_at = time::now()",
            )
            .bind(("id", id.to_string()))
            .bind(("at", at))
            .await
            .map_err(StoreError::from)?;

        let mut result = result
            .check()
            .map_err(|e| StoreError::Query(e.to_string()))?;
        let rows: Vec<TouchedRow> = result.take(0).map_err(StoreError::from)?;
        ensure_touched(id, rows)
    }
}
