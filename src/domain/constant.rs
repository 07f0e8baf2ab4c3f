//! Domain Events - Structured events for internal monitoring and debugging

/// Guardian Actor Events
pub mod guardian {
    pub const GUARDIAN_STARTED: &str = "guardian.started";
    pub const CHILDREN_SPAWNING: &str = "children.spawning";
    pub const CHILDREN_SPAWNED: &str = "children.spawned";
    pub const CHILDREN_SPAWN_FAILED: &str = "children.spawn_failed";
    pub const CHILD_TERMINATED: &str = "children.terminated";
    pub const CHILD_FAILED: &str = "children.failed";
    pub const SYSTEM_INITIALIZED: &str = "system.initialized";
    pub const SYSTEM_SHUTDOWN_STARTED: &str = "system.shutdown_started";
    pub const SYSTEM_SHUTDOWN_COMPLETED: &str = "system.shutdown_completed";
    pub const HEALTH_CHECK_COMPLETED: &str = "health.check_completed";
    pub const REQUEST_ROUTED: &str = "request.routed";
}

/// Registry Actor Events
pub mod registry {
    pub const REGISTRY_STARTED: &str = "registry.started";
    pub const WORKER_REGISTERED: &str = "worker.registered";
    pub const WORKER_REJECTED: &str = "worker.rejected";
    pub const WORKER_UNREGISTERED: &str = "worker.unregistered";
    pub const REPLY_FAILED: &str = "reply.failed";
}

/// Connection Acceptor Events
pub mod acceptor {
    pub const LISTENING: &str = "acceptor.listening";
    pub const CONNECTION_ACCEPTED: &str = "connection.accepted";
    pub const ACCEPT_FAILED: &str = "connection.accept_failed";
    pub const HANDSHAKE_TIMEOUT: &str = "handshake.timeout";
    pub const HANDSHAKE_FAILED: &str = "handshake.failed";
    pub const CONNECTION_HELD: &str = "connection.held";
    pub const PEER_CLOSED: &str = "connection.peer_closed";
    pub const CONNECTION_RELEASED: &str = "connection.released";
}

/// WorkflowManager Actor Events
pub mod workflow_manager {
    pub const MANAGER_STARTED: &str = "manager.started";
    pub const WORKFLOW_REQUESTED: &str = "workflow.requested";
    pub const WORKFLOW_REJECTED: &str = "workflow.rejected";
    pub const WORKFLOW_SPAWNED: &str = "workflow.spawned";
    pub const WORKFLOW_COMPLETED: &str = "workflow.completed";
    pub const WORKFLOW_FAILED: &str = "workflow.failed";
    pub const DATASET_RESET: &str = "dataset.reset";
    pub const DATASET_BACKED_UP: &str = "dataset.backed_up";
    pub const REPLY_FAILED: &str = "reply.failed";
}

/// Dataset Loading Events
pub mod dataset {
    pub const DATASET_LOADED: &str = "dataset.loaded";
    pub const WORKING_COPY_WRITTEN: &str = "dataset.working_copy_written";
}

/// Console Events
pub mod console {
    pub const CONSOLE_STARTED: &str = "console.started";
    pub const COMMAND_RECEIVED: &str = "console.command_received";
    pub const COMMAND_FAILED: &str = "console.command_failed";
    pub const RESULTS_READY: &str = "console.results_ready";
}

/// Scheduler Events
pub mod scheduler {
    pub const REGISTRY_UNAVAILABLE: &str = "run.registry_unavailable";
    pub const PHASE_STARTED: &str = "phase.started";
    pub const PHASE_COMPLETED: &str = "phase.completed";
    pub const WORKER_DISPATCHED: &str = "worker.dispatched";
    pub const WORKER_RESULT: &str = "worker.result";
    pub const WORKER_SKIPPED: &str = "worker.skipped";
    pub const WORKER_FAILED: &str = "worker.failed";
    pub const WORKER_DROPPED: &str = "worker.dropped";
    pub const DATASET_UPDATED: &str = "dataset.updated";
    pub const DATASET_UNCHANGED: &str = "dataset.unchanged";
    pub const OUTPUT_SAVED: &str = "output.saved";
    pub const STALE_BYTES_DISCARDED: &str = "exchange.stale_bytes_discarded";
    pub const OWED_REPLY_DISCARDED: &str = "exchange.owed_reply_discarded";
    pub const FINAL_PERSISTED: &str = "final.persisted";
    pub const FINAL_PERSIST_FAILED: &str = "final.persist_failed";
}

/// Worker Runtime Events
pub mod worker_client {
    pub const CONNECTING: &str = "client.connecting";
    pub const CONNECTED: &str = "client.connected";
    pub const HANDSHAKE_UNCONFIRMED: &str = "client.handshake_unconfirmed";
    pub const DATASET_RECEIVED: &str = "client.dataset_received";
    pub const WORK_STARTED: &str = "client.work_started";
    pub const WORK_COMPLETED: &str = "client.work_completed";
    pub const COMMAND_IGNORED: &str = "client.command_ignored";
    pub const COMMAND_FAILED: &str = "client.transform_command_failed";
    pub const DISCONNECTED: &str = "client.disconnected";
}
