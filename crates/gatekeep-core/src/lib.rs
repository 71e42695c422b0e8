//! gatekeep core — domain models, the workspace error type and the
//! collaborator traits the authentication services are written against.

pub mod error;
pub mod models;
pub mod repository;

pub use error::{GatekeepError, GatekeepResult};
