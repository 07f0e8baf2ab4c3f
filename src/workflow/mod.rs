//! Workflow execution: phase planning, per-worker exchanges and the scheduler

pub mod exchange;
pub mod plan;
pub mod scheduler;

pub use scheduler::{Scheduler, SchedulerSettings};
