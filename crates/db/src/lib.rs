//! `db` crate: pure persistence layer.
//!
//! Provides the [`Store`] trait the engine talks to, typed row structs, a
//! Postgres implementation backed by repository functions, and an in-memory
//! implementation for tests and single-process runs.  No business logic
//! lives here.

pub mod error;
pub mod memory;
pub mod models;
pub mod pg;
pub mod pool;
pub mod repository;
pub mod store;

pub use error::DbError;
pub use memory::MemoryStore;
pub use models::{ResultRow, TaskRow, TaskStatus, WorkflowRow, WorkflowStatus};
pub use pg::PgStore;
pub use pool::DbPool;
pub use store::Store;
