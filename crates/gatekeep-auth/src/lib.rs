//! Gatekeep Auth — token lifecycle, revocation, two-factor
//! authentication and admin GUI sessions.

pub mod activity;
pub mod config;
pub mod error;
pub mod keys;
pub mod password;
pub mod revocation;
pub mod secure;
pub mod service;
pub mod session;
pub mod token;
pub mod totp;
pub mod two_factor;

pub use activity::TracingActivitySink;
pub use config::{AuthConfig, ReadFailurePolicy};
pub use error::{AuthError, AuthResult};
pub use revocation::RevocationService;
pub use service::{AdminLoginOutcome, AuthService, LoginInput, LoginOutcome, TokenPair};
pub use session::AdminSessionService;
pub use token::{IssuedToken, TokenClaims, TokenKind, TokenService};
pub use two_factor::{RecoveryCodeSet, TwoFactorChallenge, TwoFactorService};
