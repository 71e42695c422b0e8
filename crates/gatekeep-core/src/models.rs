//! Domain models for gatekeep.
//!
//! These are the types shared between the storage backends and the
//! authentication services.

pub mod activity;
pub mod principal;
