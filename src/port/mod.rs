//! Interfaces to collaborators outside the coordination core

pub mod dataset;
pub mod notifier;
pub mod storage;
pub mod transform;
