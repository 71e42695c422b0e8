//! Six-digit codes delivered by email.

use std::time::Duration;

use gatekeep_core::repository::{CodeDelivery, DeliveryContext, TtlStore};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use crate::keys::KeySpace;
use crate::secure::{constant_time_eq, numeric_code};

const CODE_DIGITS: u32 = 6;

pub struct EmailCodeService<S, D> {
    store: S,
    delivery: D,
    keys: KeySpace,
    lifetime: Duration,
}

impl<S: TtlStore, D: CodeDelivery> EmailCodeService<S, D> {
    pub fn new(store: S, delivery: D, keys: KeySpace, lifetime: Duration) -> Self {
        Self {
            store,
            delivery,
            keys,
            lifetime,
        }
    }

    /// Generate a code, store it (replacing any earlier one) and send it.
    pub async fn generate_and_send(
        &self,
        principal_id: Uuid,
        destination: &str,
        context: DeliveryContext,
    ) -> AuthResult<()> {
        let code = numeric_code(CODE_DIGITS)?;
        let key = self.keys.two_factor_email_code(principal_id);
        self.store.set_ex(&key, &code, self.lifetime).await?;

        if let Err(e) = self.delivery.send_code(destination, &code, context).await {
            if let Err(cleanup) = self.store.delete(&key).await {
                warn!(%principal_id, error = %cleanup, "failed to discard undelivered email code");
            }
            return Err(e.into());
        }
        debug!(%principal_id, context = context.as_str(), "email code sent");
        Ok(())
    }

    /// Check `code` and consume it on success. A wrong code leaves the
    /// stored one in place for retries.
    pub async fn verify(&self, principal_id: Uuid, code: &str) -> AuthResult<()> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AuthError::InvalidCode);
        }

        let key = self.keys.two_factor_email_code(principal_id);
        let stored = self.store.get(&key).await?.ok_or(AuthError::InvalidCode)?;
        if !constant_time_eq(&stored, code) {
            return Err(AuthError::InvalidCode);
        }

        // Only remove the value that was matched; a code resent in the
        // meantime stays usable.
        if self.store.delete_if_eq(&key, &stored).await? {
            Ok(())
        } else {
            Err(AuthError::InvalidCode)
        }
    }

    pub async fn discard(&self, principal_id: Uuid) -> AuthResult<()> {
        self.store
            .delete(&self.keys.two_factor_email_code(principal_id))
            .await?;
        Ok(())
    }
}
