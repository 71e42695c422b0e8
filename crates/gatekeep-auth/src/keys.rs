//! TTL-store key layout.
//!
//! Bearer-equivalent secrets (tokens, session IDs) are hashed before
//! they become part of a key.

use uuid::Uuid;

use crate::secure::hash_token;

#[derive(Debug, Clone)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(prefix: &str) -> Self {
        let prefix = if prefix.is_empty() {
            String::new()
        } else {
            format!("{prefix}:")
        };
        Self { prefix }
    }

    pub fn refresh(&self, tenant_id: Uuid, principal_id: Uuid) -> String {
        format!("{}refresh:{tenant_id}:{principal_id}", self.prefix)
    }

    pub fn blacklisted_token(&self, token: &str) -> String {
        format!("{}blacklist:token:{}", self.prefix, hash_token(token))
    }

    pub fn blacklisted_principal(&self, tenant_id: Uuid, principal_id: Uuid) -> String {
        format!("{}blacklist:principal:{tenant_id}:{principal_id}", self.prefix)
    }

    pub fn two_factor_temp_secret(&self, principal_id: Uuid) -> String {
        format!("{}2fa:temp-secret:{principal_id}", self.prefix)
    }

    pub fn two_factor_temp_session(&self, temp_token: &str) -> String {
        format!("{}2fa:temp-session:{}", self.prefix, hash_token(temp_token))
    }

    pub fn two_factor_email_code(&self, principal_id: Uuid) -> String {
        format!("{}2fa:email-code:{principal_id}", self.prefix)
    }

    pub fn session(&self, session_id: &str) -> String {
        format!("{}session:{}", self.prefix, hash_token(session_id))
    }

    pub fn csrf(&self, session_id: &str) -> String {
        format!("{}csrf:{}", self.prefix, hash_token(session_id))
    }
}
