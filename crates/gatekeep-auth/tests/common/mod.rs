//! Shared fixtures for the auth integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gatekeep_auth::password;
use gatekeep_auth::{AuthConfig, AuthService};
use gatekeep_core::error::{GatekeepError, GatekeepResult};
use gatekeep_core::models::activity::{ActivityEvent, ActivityKind};
use chrono::{DateTime, Utc};
use gatekeep_core::models::principal::{CreatePrincipal, Principal, PrincipalKind, UpdateTwoFactor};
use gatekeep_core::repository::{
    ActivitySink, CodeDelivery, CredentialRepository, DeliveryContext, TtlStore,
};
use gatekeep_store::{MemoryTtlStore, SurrealPrincipalRepository};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use totp_rs::{Algorithm, Secret, TOTP};
use uuid::Uuid;

pub const PASSWORD: &str = "correct horse battery";

pub type Service<S = MemoryTtlStore> =
    AuthService<SurrealPrincipalRepository<Db>, S, CapturingDelivery>;

/// Records every code handed to it, or fails on demand.
#[derive(Clone, Default)]
pub struct CapturingDelivery {
    sent: Arc<Mutex<Vec<(String, String, DeliveryContext)>>>,
    failing: Arc<AtomicBool>,
}

impl CapturingDelivery {
    pub fn fail(&self, fail: bool) {
        self.failing.store(fail, Ordering::SeqCst);
    }

    pub fn last(&self) -> Option<(String, String, DeliveryContext)> {
        self.sent.lock().unwrap().last().cloned()
    }

    pub fn last_code(&self) -> String {
        self.last().expect("no code was delivered").1
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl CodeDelivery for CapturingDelivery {
    async fn send_code(
        &self,
        destination: &str,
        code: &str,
        context: DeliveryContext,
    ) -> GatekeepResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GatekeepError::Delivery("mail relay unavailable".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((destination.to_string(), code.to_string(), context));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ActivityEvent>>,
}

impl RecordingSink {
    pub fn kinds(&self) -> Vec<ActivityKind> {
        self.events.lock().unwrap().iter().map(|e| e.kind).collect()
    }
}

impl ActivitySink for RecordingSink {
    fn record(&self, event: ActivityEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// A TTL store whose reads or writes can be made to fail.
#[derive(Clone, Default)]
pub struct FlakyStore {
    inner: MemoryTtlStore,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl FlakyStore {
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_read(&self) -> GatekeepResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            Err(GatekeepError::StoreTimeout {
                operation: "GET".into(),
            })
        } else {
            Ok(())
        }
    }

    fn check_write(&self) -> GatekeepResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(GatekeepError::Store("READONLY replica".into()))
        } else {
            Ok(())
        }
    }
}

impl TtlStore for FlakyStore {
    async fn get(&self, key: &str) -> GatekeepResult<Option<String>> {
        self.check_read()?;
        self.inner.get(key).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> GatekeepResult<()> {
        self.check_write()?;
        self.inner.set_ex(key, value, ttl).await
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> GatekeepResult<bool> {
        self.check_write()?;
        self.inner.set_nx_ex(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> GatekeepResult<()> {
        self.inner.delete(key).await
    }

    async fn get_del(&self, key: &str) -> GatekeepResult<Option<String>> {
        self.check_read()?;
        self.inner.get_del(key).await
    }

    async fn delete_if_eq(&self, key: &str, expected: &str) -> GatekeepResult<bool> {
        self.inner.delete_if_eq(key, expected).await
    }
}

/// A TTL store that overwrites a key with a new value right after it is
/// read, as a concurrent writer would.
#[derive(Clone, Default)]
pub struct OverwriteAfterRead {
    inner: MemoryTtlStore,
    pending: Arc<Mutex<Option<(String, String)>>>,
}

impl OverwriteAfterRead {
    pub fn overwrite_next_read(&self, key: &str, value: &str) {
        *self.pending.lock().unwrap() = Some((key.to_string(), value.to_string()));
    }
}

impl TtlStore for OverwriteAfterRead {
    async fn get(&self, key: &str) -> GatekeepResult<Option<String>> {
        let value = self.inner.get(key).await?;
        let pending = self.pending.lock().unwrap().take_if(|(k, _)| k == key);
        if let Some((k, v)) = pending {
            self.inner.set_ex(&k, &v, Duration::from_secs(600)).await?;
        }
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> GatekeepResult<()> {
        self.inner.set_ex(key, value, ttl).await
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> GatekeepResult<bool> {
        self.inner.set_nx_ex(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> GatekeepResult<()> {
        self.inner.delete(key).await
    }

    async fn get_del(&self, key: &str) -> GatekeepResult<Option<String>> {
        self.inner.get_del(key).await
    }

    async fn delete_if_eq(&self, key: &str, expected: &str) -> GatekeepResult<bool> {
        self.inner.delete_if_eq(key, expected).await
    }
}

/// A credential store whose next two-factor write fails.
#[derive(Clone)]
pub struct FlakyCredentials {
    inner: SurrealPrincipalRepository<Db>,
    failing_two_factor_writes: Arc<AtomicUsize>,
}

impl FlakyCredentials {
    pub fn new(inner: SurrealPrincipalRepository<Db>) -> Self {
        Self {
            inner,
            failing_two_factor_writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn fail_next_two_factor_write(&self) {
        self.failing_two_factor_writes.store(1, Ordering::SeqCst);
    }
}

impl CredentialRepository for FlakyCredentials {
    async fn get_principal(&self, id: Uuid) -> GatekeepResult<Principal> {
        self.inner.get_principal(id).await
    }

    async fn find_by_login(
        &self,
        tenant_id: Option<Uuid>,
        email: &str,
    ) -> GatekeepResult<Principal> {
        self.inner.find_by_login(tenant_id, email).await
    }

    async fn update_two_factor(&self, id: Uuid, input: UpdateTwoFactor) -> GatekeepResult<()> {
        let remaining = self.failing_two_factor_writes.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_two_factor_writes
                .store(remaining - 1, Ordering::SeqCst);
            return Err(GatekeepError::Database("connection reset".into()));
        }
        self.inner.update_two_factor(id, input).await
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> GatekeepResult<()> {
        self.inner.update_password(id, password_hash).await
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> GatekeepResult<()> {
        self.inner.record_login(id, at).await
    }
}

pub fn test_config() -> AuthConfig {
    AuthConfig {
        signing_secret: "test-signing-secret-0123456789abcdef".into(),
        jwt_issuer: "gatekeep-test".into(),
        totp_issuer: "Gatekeep-Test".into(),
        key_prefix: "test".into(),
        ..AuthConfig::default()
    }
}

pub struct Harness<S: TtlStore + Clone = MemoryTtlStore> {
    pub service: Service<S>,
    pub repo: SurrealPrincipalRepository<Db>,
    pub store: S,
    pub delivery: CapturingDelivery,
    pub sink: Arc<RecordingSink>,
    pub tenant_id: Uuid,
}

impl<S: TtlStore + Clone> Harness<S> {
    pub async fn user(&self, email: &str) -> Principal {
        create_principal(&self.repo, PrincipalKind::User, Some(self.tenant_id), email).await
    }

    pub async fn user_in(&self, tenant_id: Uuid, email: &str) -> Principal {
        create_principal(&self.repo, PrincipalKind::User, Some(tenant_id), email).await
    }

    pub async fn admin(&self, email: &str) -> Principal {
        create_principal(&self.repo, PrincipalKind::Admin, None, email).await
    }
}

pub async fn setup() -> Harness {
    setup_with(test_config()).await
}

pub async fn setup_with(config: AuthConfig) -> Harness {
    setup_with_store(config, MemoryTtlStore::new()).await
}

pub async fn principal_repository() -> SurrealPrincipalRepository<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    gatekeep_store::run_migrations(&db).await.unwrap();
    SurrealPrincipalRepository::new(db)
}

pub async fn setup_with_store<S: TtlStore + Clone>(config: AuthConfig, store: S) -> Harness<S> {
    let repo = principal_repository().await;
    let delivery = CapturingDelivery::default();
    let sink = Arc::new(RecordingSink::default());
    let service = AuthService::new(
        repo.clone(),
        store.clone(),
        delivery.clone(),
        config,
        sink.clone(),
    )
    .unwrap();

    Harness {
        service,
        repo,
        store,
        delivery,
        sink,
        tenant_id: Uuid::new_v4(),
    }
}

pub async fn create_principal(
    repo: &SurrealPrincipalRepository<Db>,
    kind: PrincipalKind,
    tenant_id: Option<Uuid>,
    email: &str,
) -> Principal {
    repo.create(CreatePrincipal {
        kind,
        tenant_id,
        email: email.into(),
        password_hash: password::hash_password(PASSWORD, None).unwrap(),
    })
    .await
    .unwrap()
}

/// The code an authenticator app would show right now.
pub fn totp_now(secret_base32: &str) -> String {
    let bytes = Secret::Encoded(secret_base32.to_string()).to_bytes().unwrap();
    TOTP::new(Algorithm::SHA1, 6, 1, 30, bytes, None, "test".into())
        .unwrap()
        .generate_current()
        .unwrap()
}

/// A six-digit code guaranteed to differ from `code`.
pub fn wrong_code(code: &str) -> String {
    let n: u32 = code.parse().unwrap();
    format!("{:06}", (n + 500_000) % 1_000_000)
}
