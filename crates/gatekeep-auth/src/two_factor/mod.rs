//! Second-factor authentication: TOTP, emailed codes and recovery codes.

mod email;
mod recovery;
mod service;

pub use email::EmailCodeService;
pub use recovery::RecoveryCodeSet;
pub use service::{PendingTwoFactor, TwoFactorChallenge, TwoFactorService};
