//! Purpose: Library crate behind the `obt` CLI: one-big-table storage and a sharded file cache.
//! Exports: `api` (stable surface), `core` (codec, schema, table, store, cache, errors).
//! Role: Embeddable storage engine; the binary is a thin JSON shell over `api`.
//! Invariants: Single writer per physical file; no internal locking.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
