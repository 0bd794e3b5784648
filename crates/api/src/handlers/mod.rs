pub mod workflows;

pub use crate::AppState;
