//! Server-side note store
//!
//! Persists notes per owner in libSQL and commits every write
//! last-writer-wins. Each write runs the optimistic-concurrency check
//! from [`concurrency::is_stale`]; a stale write still commits, but the
//! reply flags the conflict and carries the pre-write snapshot so the
//! client can surface what was overridden.

pub mod concurrency;
pub mod db;
pub mod error;
pub mod repository;

pub use concurrency::is_stale;
pub use db::Database;
pub use error::{Error, Result};
pub use repository::{LibSqlNoteRepository, NoteRepository};
