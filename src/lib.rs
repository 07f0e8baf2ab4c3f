//! # Pipeline Coordinator
//!
//! A central coordinator and a set of remote workers run a multi-stage data
//! processing pipeline over TCP.
//!
//! This crate provides:
//! - A framed wire protocol for bulk file transfer plus plain-text commands
//! - A registry of connected workers with unique names, levels and modes
//! - A scheduler that routes a shared dataset through sequential, parallel and
//!   final-tier phases, tolerating per-worker timeouts and failures
//! - A worker runtime with pluggable transforms and an operator console

pub mod actor;
pub mod adapter;
pub mod cli;
pub mod client;
pub mod config;
pub mod console;
pub mod domain;
pub mod port;
pub mod protocol;
pub mod server;
pub mod workflow;

// Re-export commonly used types
pub use client::{ClientSettings, WorkerClient};
pub use config::{CoordinatorConfig, load_config};
pub use domain::{dataset::Dataset, error::CoordinatorError, report::WorkflowReport, worker::WorkerMode};
pub use server::Coordinator;
