//! steved: spawns registry-defined container jobs on request.

pub mod api;
pub mod config;
pub mod error;
pub mod jobs;
pub mod notify;
pub mod runtime;
pub mod tasks;
