//! stampa: a render service that merges document templates with structured
//! data through an external conversion engine and returns the artifact.
//!
//! The engine itself is a black box; this crate owns the request lifecycle
//! around it — per-request artifact workspaces, bounded admission to the
//! engine, and the orchestration that guarantees teardown on every exit path.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
