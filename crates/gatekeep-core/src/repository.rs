//! Collaborator trait definitions.
//!
//! The authentication services are generic over these traits so that
//! they carry no dependency on a concrete database, key/value store or
//! mail transport. All store operations are async and individually
//! atomic; nothing here spans more than one key.

use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::GatekeepResult;
use crate::models::{
    activity::ActivityEvent,
    principal::{Principal, UpdateTwoFactor},
};

// ---------------------------------------------------------------------------
// Credential store
// ---------------------------------------------------------------------------

pub trait CredentialRepository: Send + Sync {
    fn get_principal(&self, id: Uuid) -> impl Future<Output = GatekeepResult<Principal>> + Send;

    /// Look up a principal by login identifier. `tenant_id` is `None`
    /// for admin principals.
    fn find_by_login(
        &self,
        tenant_id: Option<Uuid>,
        email: &str,
    ) -> impl Future<Output = GatekeepResult<Principal>> + Send;

    /// Replace all two-factor fields in one write.
    fn update_two_factor(
        &self,
        id: Uuid,
        input: UpdateTwoFactor,
    ) -> impl Future<Output = GatekeepResult<()>> + Send;

    fn update_password(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> impl Future<Output = GatekeepResult<()>> + Send;

    fn record_login(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> impl Future<Output = GatekeepResult<()>> + Send;
}

// ---------------------------------------------------------------------------
// Shared TTL store
// ---------------------------------------------------------------------------

pub trait TtlStore: Send + Sync {
    fn get(&self, key: &str) -> impl Future<Output = GatekeepResult<Option<String>>> + Send;

    /// Store `value` under `key`, replacing any previous value, expiring
    /// after `ttl`.
    fn set_ex(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = GatekeepResult<()>> + Send;

    /// Store `value` only if `key` is absent. Returns `true` when this
    /// call wrote the value.
    fn set_nx_ex(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = GatekeepResult<bool>> + Send;

    /// Delete `key`. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> impl Future<Output = GatekeepResult<()>> + Send;

    /// Atomically read and delete `key`.
    fn get_del(&self, key: &str) -> impl Future<Output = GatekeepResult<Option<String>>> + Send;

    /// Delete `key` only while it still holds `expected`. Returns `true`
    /// when this call removed it.
    fn delete_if_eq(
        &self,
        key: &str,
        expected: &str,
    ) -> impl Future<Output = GatekeepResult<bool>> + Send;
}

// ---------------------------------------------------------------------------
// Outbound collaborators
// ---------------------------------------------------------------------------

/// Why a code is being delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryContext {
    TwoFactorLogin,
    TwoFactorSetup,
}

impl DeliveryContext {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TwoFactorLogin => "2fa_login",
            Self::TwoFactorSetup => "2fa_setup",
        }
    }
}

/// Delivers one-time codes. The core decides that and what to send,
/// never how.
pub trait CodeDelivery: Send + Sync {
    fn send_code(
        &self,
        destination: &str,
        code: &str,
        context: DeliveryContext,
    ) -> impl Future<Output = GatekeepResult<()>> + Send;
}

/// Fire-and-forget activity log. Implementations must not block and
/// must swallow their own failures.
pub trait ActivitySink: Send + Sync {
    fn record(&self, event: ActivityEvent);
}
