//! Repository functions: one function per database operation.
//!
//! Every function takes a `&DbPool` and returns a `Result<T, DbError>`.
//! No business logic and no scheduling, only SQL.

pub mod results;
pub mod tasks;
pub mod workflows;
