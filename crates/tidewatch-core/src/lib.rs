//! Typed value cache and synchronization layer between `tidewatch-api`
//! and embedding applications.
//!
//! This crate owns the business logic of mirroring a SignalK server's
//! vessel data locally:
//!
//! - **[`SignalKClient`]** — Central facade. Vends identity-stable cache
//!   handles, drives staleness-based batch refresh, tracks durable writes
//!   to completion, and runs the background poll task.
//!
//! - **[`ValueCache`]** — Seven typed sub-caches (one per [`ValueKind`])
//!   plus the shared per-path metadata registry. Mutations fan out so
//!   typed and `Any` entries for a path never diverge.
//!
//! - **[`ValueEntry`]** — One cached value, identified by
//!   (path, source, kind). Exposes typed accessors and a
//!   `tokio::sync::watch` channel for reactive consumers.
//!
//! - **[`WriteUpdate`]** — Progress of a tracked write, delivered over an
//!   `mpsc` channel until the request reaches a terminal state.
//!
//! - **[`SessionStore`]** — Durable record of in-flight batch fetches,
//!   rehydrated on the next start so interrupted work is handed back to
//!   the caller instead of silently re-sent.

pub mod client;
pub mod config;
pub mod error;
pub mod session;
pub mod store;
pub mod value;
pub mod write;

// ── Primary re-exports ──────────────────────────────────────────────
pub use client::SignalKClient;
pub use config::ClientConfig;
pub use error::CoreError;
pub use session::{FileBackend, PendingSession, SessionBackend, SessionStore, ValueSpec};
pub use store::{ValueCache, ValueEntry, ValueHandle, ValueState};
pub use store::path_info::PathInfo;
pub use value::{Value, ValueKind};
pub use write::WriteUpdate;

// Re-export the wire-level request state so consumers of [`WriteUpdate`]
// need not depend on `tidewatch-api` directly.
pub use tidewatch_api::RequestState;
