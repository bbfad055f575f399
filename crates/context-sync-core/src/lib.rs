//! # Context Sync Core
//!
//! Shared, WASM-safe logic for Context Sync: entity and job models, the
//! optimistic list engine, the per-job state machine, the key-value store
//! abstraction, and the validator and entity caches.
//!
//! This crate contains no tokio, no HTTP client, and no filesystem I/O.
//! Everything that suspends (network, durable storage) lives behind traits
//! so the native crate and tests can plug in their own collaborators.

pub mod clock;
pub mod entity_cache;
pub mod job;
pub mod models;
pub mod optimistic;
pub mod store;
pub mod validators;
