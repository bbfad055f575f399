//! # Context Sync
//!
//! Client-side state synchronization for a knowledge-base dashboard.
//!
//! Context Sync keeps a local view of server-owned data consistent while the
//! user mutates it and while long-running server jobs (crawls, refreshes,
//! uploads) make progress in the background.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Collections  │   │  JobTracker  │──▶│   KvStore    │
//! │ (optimistic) │   │ poll/persist │   │ jobs:index…  │
//! └──────┬───────┘   └──────┬───────┘   └──────────────┘
//!        │   promote/discard │ invalidate on completion
//!        ▼                   ▼
//!   ┌──────────────────────────────┐
//!   │         EntityCache          │
//!   └──────────────────────────────┘
//!        │                   │
//!        ▼                   ▼
//!   ┌──────────────────────────────┐
//!   │  RevalidatingClient (ETag)   │──▶ Transport (reqwest)
//!   └──────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | `SyncError` taxonomy |
//! | [`transport`] | HTTP transport trait and `reqwest` implementation |
//! | [`revalidate`] | Conditional-request client with validator cache |
//! | [`api`] | Typed job and knowledge endpoints |
//! | [`mutation`] | Optimistic collections (projects, tasks) |
//! | [`persistence`] | Job handle mirror in a key-value store |
//! | [`fs_store`] | Directory-backed key-value store |
//! | [`tracker`] | Job tracker: polling, recovery, completion effects |
//! | [`progress`] | Job progress reporters |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`commands`] | `csync` subcommands |
//!
//! Domain types, the optimistic list engine, the job state machine and the
//! caches live in the I/O-free `context-sync-core` crate.

pub mod api;
pub mod commands;
pub mod config;
pub mod error;
pub mod fs_store;
pub mod logging;
pub mod mutation;
pub mod persistence;
pub mod progress;
pub mod revalidate;
pub mod tracker;
pub mod transport;
