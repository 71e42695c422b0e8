//! gatekeep storage backends.
//!
//! This crate provides:
//! - The shared TTL store ([`RedisTtlStore`], plus [`MemoryTtlStore`]
//!   for tests and single-process development)
//! - The SurrealDB credential store ([`DbManager`],
//!   [`SurrealPrincipalRepository`]) and its migrations
//! - Error types ([`StoreError`])

mod connection;
mod error;
pub mod repository;
mod schema;
pub mod ttl;

pub use connection::{DbConfig, DbManager, RemotePrincipalRepository};
pub use error::StoreError;
pub use repository::SurrealPrincipalRepository;
pub use schema::run_migrations;
pub use ttl::{MemoryTtlStore, RedisConfig, RedisTtlStore};
