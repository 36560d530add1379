//! Task-level orchestration for the nugget annotation workflow.
//!
//! Loads a [`TaskConfig`] and its content universe, hands each user session
//! its own cache of annotation stores and nugget savers, and implements the
//! cross-store workflow steps, admin curation, export and rubric conversion
//! on top of `nugget-store-sqlite`.

pub mod config;
pub mod curation;
pub mod error;
pub mod export;
pub mod resources;
pub mod rubric;
pub mod session;
pub mod workflow;

pub use config::TaskConfig;
pub use error::{Error, Result};
pub use resources::{ContentUniverse, Task};
pub use session::{ManagerKind, SessionCache};
pub use workflow::Workbench;

#[cfg(test)]
mod tests;
