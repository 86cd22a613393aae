//! # Fakturo Shared Library
//!
//! This crate contains shared types, clients, and business logic used across
//! the Fakturo API server and background worker.
//!
//! ## Module Organization
//!
//! - `models`: Database models and data structures
//! - `identity`: Identity-provider client (sessions, users, magic links)
//! - `session`: Session derivation and access gating
//! - `tokens`: Opaque one-time tokens (verification, reset, magic link)
//! - `redis`: Redis client, rate limiter, and read-through caches
//! - `email`: Email job types and the Redis outbox queue
//! - `audit`: Best-effort audit logging

pub mod audit;
pub mod db;
pub mod email;
pub mod identity;
pub mod models;
pub mod redis;
pub mod session;
pub mod tokens;

/// Current version of the Fakturo shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
