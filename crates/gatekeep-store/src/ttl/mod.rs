//! [`TtlStore`](gatekeep_core::repository::TtlStore) backends.

mod memory;
mod redis_store;

pub use memory::MemoryTtlStore;
pub use redis_store::{RedisConfig, RedisTtlStore};
