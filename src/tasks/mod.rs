//! Task registry: named container task definitions.
//!
//! - `model`: the immutable `Task` definition
//! - `registry`: `TaskSource` (where definitions live) and `TaskRegistry` (one loaded snapshot)

pub mod model;
pub mod registry;

pub use model::Task;
pub use registry::{TaskRegistry, TaskSource};
