//! Typed messages for actor communication

use std::{net::SocketAddr, path::PathBuf};

use ractor::{ActorRef, Message, RpcReplyPort};
use tokio_util::sync::CancellationToken;

use crate::{
    domain::{
        dataset::{Dataset, DatasetSummary},
        error::CoordinatorError,
        report::WorkflowReport,
        worker::WorkerInfo
    },
    protocol::{Handshake, WorkerConnection}
};

/// Messages for the Guardian actor (root of actor system)
#[derive(Debug)]
pub enum GuardianMessage {
    /// Spawn the registry and workflow manager
    Initialize { reply: RpcReplyPort<Result<(), CoordinatorError>> },
    /// Hand out the registry so the acceptor can register workers
    GetRegistry { reply: RpcReplyPort<Option<ActorRef<RegistryMessage>>> },
    /// Forwarded to the WorkflowManager
    StartWorkflow { reply: RpcReplyPort<Result<String, CoordinatorError>> },
    /// Forwarded to the WorkflowManager
    GetStatus { reply: RpcReplyPort<WorkflowStatus> },
    /// Forwarded to the WorkflowManager
    ResetDataset { reply: RpcReplyPort<Result<DatasetSummary, CoordinatorError>> },
    /// Forwarded to the WorkflowManager
    BackupDataset { reply: RpcReplyPort<Result<PathBuf, CoordinatorError>> },
    /// Shutdown the entire system
    Shutdown,
    /// System health check
    HealthCheck { reply: RpcReplyPort<SystemHealth> }
}

/// Messages for the WorkerRegistry actor
#[derive(Debug)]
pub enum RegistryMessage {
    /// Add a worker after a successful handshake; the token releases its connection
    Register {
        address:    SocketAddr,
        connection: WorkerConnection,
        handshake:  Handshake,
        reply:      RpcReplyPort<Result<CancellationToken, CoordinatorError>>
    },
    /// Remove by address; replies whether an entry existed
    Unregister { address: SocketAddr, reply: RpcReplyPort<bool> },
    /// Remove by name; replies whether an entry existed
    UnregisterByName { name: String, reply: RpcReplyPort<bool> },
    /// Remove everyone; replies with the number removed
    UnregisterAll { reply: RpcReplyPort<usize> },
    /// Snapshot in registration order
    List { reply: RpcReplyPort<Vec<RegisteredWorker>> },
    /// Snapshot ordered by level, ties by registration order
    SortedByLevel { reply: RpcReplyPort<Vec<RegisteredWorker>> },
    Contains { address: SocketAddr, reply: RpcReplyPort<bool> }
}

/// Messages for the WorkflowManager actor
#[derive(Debug)]
pub enum WorkflowManagerMessage {
    /// Start a run unless one is in flight; replies with the run id
    StartWorkflow { reply: RpcReplyPort<Result<String, CoordinatorError>> },
    /// A run finished; carries the dataset as it stands after the run
    WorkflowFinished { run_id: String, dataset: Dataset, report: Box<WorkflowReport> },
    /// A run task died without producing a result
    WorkflowAborted { run_id: String, error: String },
    GetStatus { reply: RpcReplyPort<WorkflowStatus> },
    /// Reload the initial dataset; refused while a run is in flight
    ResetDataset { reply: RpcReplyPort<Result<DatasetSummary, CoordinatorError>> },
    /// Copy the current dataset to a timestamped backup
    BackupDataset { reply: RpcReplyPort<Result<PathBuf, CoordinatorError>> }
}

/// Registry snapshot entry; the connection handle is shared, not copied
#[derive(Debug, Clone)]
pub struct RegisteredWorker {
    pub info:       WorkerInfo,
    pub connection: WorkerConnection
}

/// Workflow information for the operator
#[derive(Debug, Clone)]
pub struct WorkflowStatus {
    /// Run id of the workflow in flight
    pub running:        Option<String>,
    pub last_report:    Option<WorkflowReport>,
    pub dataset:        DatasetSummary,
    pub completed_runs: u64,
    /// Runs whose task died before reporting
    pub failed_runs:    u64
}

/// System health information
#[derive(Debug)]
pub struct SystemHealth {
    pub registered_workers: usize,
    pub workflow_running:   bool,
    pub completed_runs:     u64,
    pub uptime_seconds:     u64
}

// Implement Message trait for Ractor
impl Message for GuardianMessage {}
impl Message for RegistryMessage {}
impl Message for WorkflowManagerMessage {}
