//! Actor-based coordination
//!
//! The Guardian supervises the WorkerRegistry, which owns the set of
//! connected workers, and the WorkflowManager, which owns the shared dataset
//! and runs the scheduler. Built on Ractor.

pub mod guardian;
pub mod message;
pub mod registry;
pub mod workflow;

pub use guardian::*;
pub use message::*;
pub use registry::{RegistryHandle, WorkerRegistry};
pub use workflow::*;
