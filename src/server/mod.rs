//! Coordinator facade
//!
//! Ties the actor system and the acceptor together and exposes the operator
//! actions: list workers, disconnect, start a workflow, status, reset and
//! backup of the dataset.

pub mod acceptor;

use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use ractor::{
    ActorRef, RpcReplyPort,
    rpc::{CallResult, call}
};
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{Level, event};

use crate::{
    actor::{
        guardian::{Guardian, GuardianArgs},
        message::{GuardianMessage, SystemHealth, WorkflowStatus},
        registry::RegistryHandle
    },
    config::ServerConfig,
    domain::{constant::guardian, dataset::DatasetSummary, error::CoordinatorError, worker::WorkerInfo},
    port::{dataset::DatasetLoader, notifier::ResultsNotifier, storage::ArtifactStore}
};

const GUARDIAN_CALL_TIMEOUT: Duration = Duration::from_secs(30);
/// Upper bound on waiting for connection tasks to say goodbye
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// A running coordinator
pub struct Coordinator {
    guardian:    ActorRef<GuardianMessage>,
    registry:    RegistryHandle,
    local_addr:  SocketAddr,
    shutdown:    CancellationToken,
    connections: TaskTracker,
    acceptor:    JoinHandle<()>
}

impl Coordinator {
    /// Load the initial dataset, bind, start the actors and begin accepting.
    ///
    /// Failing to load the dataset or to bind is fatal.
    pub async fn start(
        config: &ServerConfig,
        loader: Arc<dyn DatasetLoader>,
        store: Arc<dyn ArtifactStore>,
        notifier: Arc<dyn ResultsNotifier>
    ) -> Result<Self, CoordinatorError> {
        let dataset = loader.load().await?;

        let bind_address = config.bind_address();
        let listener = TcpListener::bind(&bind_address)
            .await
            .map_err(|e| CoordinatorError::Network(format!("cannot bind {}: {}", bind_address, e)))?;
        let local_addr = listener.local_addr()?;

        let args = GuardianArgs { loader, store, notifier, settings: config.scheduler_settings(), dataset };
        let guardian = Guardian::spawn_system(args).await?;

        let registry = match ask(&guardian, |reply| GuardianMessage::GetRegistry { reply }).await? {
            Some(registry) => RegistryHandle::new(registry),
            None => {
                guardian.stop(None);
                return Err(CoordinatorError::Spawn("worker registry is not running".to_string()));
            }
        };

        let shutdown = CancellationToken::new();
        let connections = TaskTracker::new();
        let acceptor = tokio::spawn(acceptor::serve(
            listener,
            registry.clone(),
            config.acceptor_settings(),
            connections.clone(),
            shutdown.clone()
        ));

        Ok(Self { guardian, registry, local_addr, shutdown, connections, acceptor })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    /// Registered workers in registration order
    pub async fn list_workers(&self) -> Result<Vec<WorkerInfo>, CoordinatorError> {
        Ok(self.registry.list().await?.into_iter().map(|w| w.info).collect())
    }

    /// Release one worker by name; `false` if nobody has that name
    pub async fn disconnect(&self, name: &str) -> Result<bool, CoordinatorError> {
        self.registry.unregister_by_name(name).await
    }

    pub async fn disconnect_all(&self) -> Result<usize, CoordinatorError> {
        self.registry.unregister_all().await
    }

    /// Start a run; `WorkflowBusy` if one is in flight, `NoWorkers` if nobody is registered
    pub async fn start_workflow(&self) -> Result<String, CoordinatorError> {
        ask(&self.guardian, |reply| GuardianMessage::StartWorkflow { reply }).await?
    }

    pub async fn status(&self) -> Result<WorkflowStatus, CoordinatorError> {
        ask(&self.guardian, |reply| GuardianMessage::GetStatus { reply }).await
    }

    /// Reload the initial dataset
    pub async fn reset_dataset(&self) -> Result<DatasetSummary, CoordinatorError> {
        ask(&self.guardian, |reply| GuardianMessage::ResetDataset { reply }).await?
    }

    pub async fn backup_dataset(&self) -> Result<PathBuf, CoordinatorError> {
        ask(&self.guardian, |reply| GuardianMessage::BackupDataset { reply }).await?
    }

    pub async fn health(&self) -> Result<SystemHealth, CoordinatorError> {
        ask(&self.guardian, |reply| GuardianMessage::HealthCheck { reply }).await
    }

    /// Stop accepting, release every worker and stop the actors
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.acceptor.await {
            event!(Level::WARN, event = guardian::SYSTEM_SHUTDOWN_STARTED, error = %e);
        }

        match self.registry.unregister_all().await {
            Ok(released) => event!(Level::DEBUG, event = guardian::SYSTEM_SHUTDOWN_STARTED, released = released),
            Err(e) => event!(Level::WARN, event = guardian::SYSTEM_SHUTDOWN_STARTED, error = %e)
        }

        // Every holder was released above; wait for their goodbyes
        self.connections.close();
        if tokio::time::timeout(SHUTDOWN_GRACE, self.connections.wait()).await.is_err() {
            event!(Level::WARN, event = guardian::SYSTEM_SHUTDOWN_STARTED, pending = self.connections.len());
        }

        if let Err(e) = self.guardian.cast(GuardianMessage::Shutdown) {
            event!(Level::ERROR, event = guardian::SYSTEM_SHUTDOWN_STARTED, error = %e);
        }
    }
}

/// Request-response with the guardian
async fn ask<T, F>(guardian: &ActorRef<GuardianMessage>, build: F) -> Result<T, CoordinatorError>
where
    T: Send + 'static,
    F: FnOnce(RpcReplyPort<T>) -> GuardianMessage
{
    match call(guardian, build, Some(GUARDIAN_CALL_TIMEOUT)).await {
        Ok(CallResult::Success(value)) => Ok(value),
        Ok(CallResult::Timeout) => Err(CoordinatorError::Timeout("coordinator did not answer in time".to_string())),
        Ok(CallResult::SenderError) => Err(CoordinatorError::Generic("request was dropped".to_string())),
        Err(e) => Err(CoordinatorError::Generic(format!("coordinator unreachable: {:?}", e)))
    }
}
