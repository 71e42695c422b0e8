//! Integration tests for two-factor enrollment and login challenges.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    CapturingDelivery, FlakyCredentials, Harness, OverwriteAfterRead, PASSWORD, create_principal,
    principal_repository, setup, setup_with, test_config, totp_now, wrong_code,
};
use gatekeep_auth::keys::KeySpace;
use gatekeep_auth::two_factor::EmailCodeService;
use gatekeep_auth::{
    AuthConfig, AuthError, LoginInput, LoginOutcome, RecoveryCodeSet, TracingActivitySink,
    TwoFactorService,
};
use gatekeep_core::error::GatekeepError;
use gatekeep_core::models::activity::ActivityKind;
use gatekeep_core::models::principal::{PrincipalKind, TwoFactorMethod};
use gatekeep_core::repository::{CredentialRepository, DeliveryContext, TtlStore};
use gatekeep_store::MemoryTtlStore;
use uuid::Uuid;

async fn login(h: &Harness, email: &str) -> LoginOutcome {
    h.service
        .login(LoginInput {
            tenant_id: h.tenant_id,
            email: email.into(),
            password: PASSWORD.into(),
        })
        .await
        .unwrap()
}

async fn challenge(h: &Harness, email: &str) -> String {
    match login(h, email).await {
        LoginOutcome::TwoFactorRequired(c) => c.temp_token,
        LoginOutcome::Authenticated(_) => panic!("expected a two-factor challenge"),
    }
}

/// Enroll TOTP for `principal_id`, returning the secret and recovery codes.
async fn enroll_totp(h: &Harness, principal_id: Uuid) -> (String, RecoveryCodeSet) {
    let enrollment = h.service.two_factor().generate_secret(principal_id).await.unwrap();
    let codes = h
        .service
        .two_factor()
        .enable(principal_id, &totp_now(&enrollment.secret_base32))
        .await
        .unwrap();
    (enrollment.secret_base32, codes)
}

#[tokio::test]
async fn totp_enrollment_and_login() {
    let h = setup().await;
    let u2 = h.user("u2@example.com").await;
    let tf = h.service.two_factor();

    let enrollment = tf.generate_secret(u2.id).await.unwrap();
    assert!(enrollment.provisioning_uri.starts_with("otpauth://totp/"));
    let good = totp_now(&enrollment.secret_base32);

    // Setup verification is side-effect free.
    assert!(matches!(
        tf.verify_setup_code(u2.id, &wrong_code(&good)).await,
        Err(AuthError::InvalidCode)
    ));
    tf.verify_setup_code(u2.id, &good).await.unwrap();
    assert!(!h.repo.get_principal(u2.id).await.unwrap().two_factor_enabled);

    assert!(matches!(
        tf.enable(u2.id, &wrong_code(&good)).await,
        Err(AuthError::InvalidCode)
    ));
    let codes = tf.enable(u2.id, &good).await.unwrap();
    assert_eq!(codes.len(), 8);

    let stored = h.repo.get_principal(u2.id).await.unwrap();
    assert!(stored.two_factor_enabled);
    assert_eq!(stored.two_factor_method, Some(TwoFactorMethod::Totp));
    assert!(stored.two_factor_secret.is_some());
    assert!(h.sink.kinds().contains(&ActivityKind::TwoFactorEnabled));

    // The pending secret is gone once enabled.
    assert!(matches!(
        tf.verify_setup_code(u2.id, &good).await,
        Err(AuthError::SetupExpired)
    ));

    let temp_token = match login(&h, "u2@example.com").await {
        LoginOutcome::TwoFactorRequired(c) => {
            assert_eq!(c.method, TwoFactorMethod::Totp);
            assert_eq!(c.expires_in, 300);
            c.temp_token
        }
        LoginOutcome::Authenticated(_) => panic!("expected a two-factor challenge"),
    };

    // A wrong code does not burn the temp session.
    let code = totp_now(&enrollment.secret_base32);
    assert!(matches!(
        h.service.complete_two_factor(&temp_token, &wrong_code(&code)).await,
        Err(AuthError::InvalidCode)
    ));
    assert!(h.sink.kinds().contains(&ActivityKind::TwoFactorFailed));

    let pair = h.service.complete_two_factor(&temp_token, &code).await.unwrap();
    let claims = h
        .service
        .authenticate(h.tenant_id, &pair.access_token)
        .await
        .unwrap();
    assert_eq!(claims.principal_id, u2.id);

    // Temp sessions are single-use.
    assert!(matches!(
        h.service.complete_two_factor(&temp_token, &code).await,
        Err(AuthError::InvalidOrExpiredSession)
    ));
}

#[tokio::test]
async fn recovery_codes_are_single_use() {
    let h = setup().await;
    let u2 = h.user("u2@example.com").await;
    let (_, codes) = enroll_totp(&h, u2.id).await;

    let first = codes.codes()[0].clone();
    let temp = challenge(&h, "u2@example.com").await;
    h.service
        .complete_with_recovery_code(&temp, &first)
        .await
        .unwrap();
    assert!(h.sink.kinds().contains(&ActivityKind::RecoveryCodeUsed));

    let temp = challenge(&h, "u2@example.com").await;
    assert!(matches!(
        h.service.complete_with_recovery_code(&temp, &first).await,
        Err(AuthError::InvalidCode)
    ));

    // Input is normalized.
    let second = codes.codes()[1].replace('-', "").to_lowercase();
    h.service
        .complete_with_recovery_code(&temp, &second)
        .await
        .unwrap();

    let stored = h.repo.get_principal(u2.id).await.unwrap();
    let remaining = RecoveryCodeSet::from_stored(stored.recovery_codes.as_deref()).unwrap();
    assert_eq!(remaining.len(), 6);
}

#[tokio::test]
async fn every_recovery_code_works_exactly_once() {
    let h = setup().await;
    let u2 = h.user("u2@example.com").await;
    let (_, codes) = enroll_totp(&h, u2.id).await;
    let tf = h.service.two_factor();

    for (used, code) in codes.codes().iter().enumerate() {
        let remaining = tf.verify_recovery_code(u2.id, code).await.unwrap();
        assert_eq!(remaining, codes.len() - used - 1);
        assert!(matches!(
            tf.verify_recovery_code(u2.id, code).await,
            Err(AuthError::InvalidCode)
        ));
    }
}

#[tokio::test]
async fn enable_without_setup_reports_expiry() {
    let h = setup().await;
    let u = h.user("u@example.com").await;
    assert!(matches!(
        h.service.two_factor().enable(u.id, "123456").await,
        Err(AuthError::SetupExpired)
    ));
}

#[tokio::test]
async fn failed_enable_keeps_pending_secret_for_retry() {
    let repo = principal_repository().await;
    let alice = create_principal(
        &repo,
        PrincipalKind::User,
        Some(Uuid::new_v4()),
        "alice@example.com",
    )
    .await;
    let credentials = FlakyCredentials::new(repo.clone());
    let store = MemoryTtlStore::new();
    let svc = TwoFactorService::new(
        credentials.clone(),
        store.clone(),
        CapturingDelivery::default(),
        test_config(),
        Arc::new(TracingActivitySink),
    );
    let pending_key = KeySpace::new("test").two_factor_temp_secret(alice.id);

    let enrollment = svc.generate_secret(alice.id).await.unwrap();
    credentials.fail_next_two_factor_write();
    let err = svc
        .enable(alice.id, &totp_now(&enrollment.secret_base32))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Backend(GatekeepError::Database(_))));
    assert!(store.get(&pending_key).await.unwrap().is_some());
    assert!(!repo.get_principal(alice.id).await.unwrap().two_factor_enabled);

    let codes = svc
        .enable(alice.id, &totp_now(&enrollment.secret_base32))
        .await
        .unwrap();
    assert!(!codes.is_empty());
    assert!(store.get(&pending_key).await.unwrap().is_none());
    assert!(repo.get_principal(alice.id).await.unwrap().two_factor_enabled);
}

#[tokio::test]
async fn setup_window_expires() {
    let h = setup_with(AuthConfig {
        two_factor_setup_lifetime_secs: 1,
        ..test_config()
    })
    .await;
    let u = h.user("u@example.com").await;
    let enrollment = h.service.two_factor().generate_secret(u.id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert!(matches!(
        h.service
            .two_factor()
            .enable(u.id, &totp_now(&enrollment.secret_base32))
            .await,
        Err(AuthError::SetupExpired)
    ));
}

#[tokio::test]
async fn cannot_enroll_twice() {
    let h = setup().await;
    let u = h.user("u@example.com").await;
    enroll_totp(&h, u.id).await;

    assert!(matches!(
        h.service.two_factor().generate_secret(u.id).await,
        Err(AuthError::TwoFactorAlreadyEnabled)
    ));
    assert!(matches!(
        h.service.two_factor().begin_email_setup(u.id).await,
        Err(AuthError::TwoFactorAlreadyEnabled)
    ));
}

#[tokio::test]
async fn disable_requires_password() {
    let h = setup().await;
    let u = h.user("u@example.com").await;
    let tf = h.service.two_factor();

    assert!(matches!(
        tf.disable(u.id, PASSWORD).await,
        Err(AuthError::TwoFactorNotEnabled)
    ));
    enroll_totp(&h, u.id).await;

    assert!(matches!(
        tf.disable(u.id, "wrong").await,
        Err(AuthError::InvalidCredentials)
    ));
    tf.disable(u.id, PASSWORD).await.unwrap();

    let stored = h.repo.get_principal(u.id).await.unwrap();
    assert!(!stored.two_factor_enabled);
    assert!(stored.two_factor_method.is_none());
    assert!(stored.two_factor_secret.is_none());
    assert!(stored.recovery_codes.is_none());
    assert!(matches!(
        login(&h, "u@example.com").await,
        LoginOutcome::Authenticated(_)
    ));
}

#[tokio::test]
async fn regenerating_recovery_codes_invalidates_old_ones() {
    let h = setup().await;
    let u = h.user("u@example.com").await;
    let (_, old) = enroll_totp(&h, u.id).await;
    let tf = h.service.two_factor();

    assert!(matches!(
        tf.regenerate_recovery_codes(u.id, "wrong").await,
        Err(AuthError::InvalidCredentials)
    ));
    let fresh = tf.regenerate_recovery_codes(u.id, PASSWORD).await.unwrap();
    assert_eq!(fresh.len(), 8);

    assert!(matches!(
        tf.verify_recovery_code(u.id, &old.codes()[0]).await,
        Err(AuthError::InvalidCode)
    ));
    tf.verify_recovery_code(u.id, &fresh.codes()[0]).await.unwrap();

    // The TOTP secret survives regeneration.
    let stored = h.repo.get_principal(u.id).await.unwrap();
    assert_eq!(stored.two_factor_method, Some(TwoFactorMethod::Totp));
    assert!(stored.two_factor_secret.is_some());
}

#[tokio::test]
async fn email_two_factor_flow() {
    let h = setup().await;
    let u = h.user("mail@example.com").await;
    let tf = h.service.two_factor();

    tf.begin_email_setup(u.id).await.unwrap();
    let (destination, setup_code, context) = h.delivery.last().unwrap();
    assert_eq!(destination, "mail@example.com");
    assert_eq!(context, DeliveryContext::TwoFactorSetup);
    assert_eq!(setup_code.len(), 6);

    assert!(matches!(
        tf.enable_email(u.id, &wrong_code(&setup_code)).await,
        Err(AuthError::InvalidCode)
    ));
    // A wrong guess leaves the code usable.
    let codes = tf.enable_email(u.id, &setup_code).await.unwrap();
    assert_eq!(codes.len(), 8);

    let temp = match login(&h, "mail@example.com").await {
        LoginOutcome::TwoFactorRequired(c) => {
            assert_eq!(c.method, TwoFactorMethod::Email);
            c.temp_token
        }
        LoginOutcome::Authenticated(_) => panic!("expected a two-factor challenge"),
    };
    let (_, login_code, context) = h.delivery.last().unwrap();
    assert_eq!(context, DeliveryContext::TwoFactorLogin);

    h.service.complete_two_factor(&temp, &login_code).await.unwrap();

    // Codes are consumed on success.
    let temp = challenge(&h, "mail@example.com").await;
    let fresh = h.delivery.last_code();
    if fresh != login_code {
        assert!(matches!(
            h.service.complete_two_factor(&temp, &login_code).await,
            Err(AuthError::InvalidCode)
        ));
    }
    h.service.complete_two_factor(&temp, &fresh).await.unwrap();
}

#[tokio::test]
async fn failed_delivery_leaves_no_usable_code() {
    let h = setup().await;
    let u = h.user("mail@example.com").await;
    let tf = h.service.two_factor();

    h.delivery.fail(true);
    let err = tf.begin_email_setup(u.id).await.unwrap_err();
    assert!(matches!(
        err,
        AuthError::Backend(GatekeepError::Delivery(_))
    ));
    assert_eq!(h.delivery.count(), 0);

    let key = format!("test:2fa:email-code:{}", u.id);
    assert!(h.store.get(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn email_code_can_be_resent() {
    let h = setup().await;
    let u = h.user("mail@example.com").await;
    let tf = h.service.two_factor();
    tf.begin_email_setup(u.id).await.unwrap();
    tf.enable_email(u.id, &h.delivery.last_code()).await.unwrap();

    let temp = challenge(&h, "mail@example.com").await;
    let sent = h.delivery.count();
    tf.resend_email_code(&temp).await.unwrap();
    assert_eq!(h.delivery.count(), sent + 1);

    h.service
        .complete_two_factor(&temp, &h.delivery.last_code())
        .await
        .unwrap();
}

#[tokio::test]
async fn stale_email_code_does_not_consume_a_resent_one() {
    let store = OverwriteAfterRead::default();
    let delivery = CapturingDelivery::default();
    let keys = KeySpace::new("test");
    let email = EmailCodeService::new(
        store.clone(),
        delivery.clone(),
        keys.clone(),
        Duration::from_secs(600),
    );
    let principal = Uuid::new_v4();

    email
        .generate_and_send(principal, "alice@example.com", DeliveryContext::TwoFactorLogin)
        .await
        .unwrap();
    let first = delivery.last_code();
    let resent = wrong_code(&first);

    store.overwrite_next_read(&keys.two_factor_email_code(principal), &resent);
    assert!(matches!(
        email.verify(principal, &first).await,
        Err(AuthError::InvalidCode)
    ));

    email.verify(principal, &resent).await.unwrap();
    assert!(matches!(
        email.verify(principal, &resent).await,
        Err(AuthError::InvalidCode)
    ));
}

#[tokio::test]
async fn unknown_temp_token_is_rejected() {
    let h = setup().await;
    for token in ["", "does-not-exist"] {
        assert!(matches!(
            h.service.complete_two_factor(token, "123456").await,
            Err(AuthError::InvalidOrExpiredSession)
        ));
    }
}

#[tokio::test]
async fn totp_secret_is_encrypted_when_key_configured() {
    let h = setup_with(AuthConfig {
        mfa_encryption_key: Some([9u8; 32]),
        ..test_config()
    })
    .await;
    let u = h.user("enc@example.com").await;
    let (secret, _) = enroll_totp(&h, u.id).await;

    let stored = h.repo.get_principal(u.id).await.unwrap();
    let at_rest = stored.two_factor_secret.unwrap();
    assert_ne!(at_rest, secret);
    assert!(!at_rest.contains(&secret));

    let temp = challenge(&h, "enc@example.com").await;
    h.service
        .complete_two_factor(&temp, &totp_now(&secret))
        .await
        .unwrap();
}
