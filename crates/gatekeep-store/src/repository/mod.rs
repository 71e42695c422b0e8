//! SurrealDB repository implementations.

mod principal;

pub use principal::SurrealPrincipalRepository;
