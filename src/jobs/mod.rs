//! Job execution core.
//!
//! Core components:
//! - `job`: one runtime instance of a task
//! - `guard`: per-name admission control (one running job per task name)
//! - `lifecycle`: container state machine (pull, create, watch, attach, start, wait)
//! - `orchestrator`: `spawn()` façade tying registry, guard, lifecycle and notifications together

pub mod guard;
pub mod job;
pub mod lifecycle;
pub mod orchestrator;

pub use guard::{Claim, Conflict, RunGuard, RunningJob};
pub use job::{Job, build_env};
pub use lifecycle::{Failure, JobOutcome, JobState, LifecycleController, RunningContainer};
pub use orchestrator::{Accepted, JobOrchestrator, SpawnOutcome};
