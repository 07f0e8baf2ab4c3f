//! Guardian Actor - Root Supervisor
//!
//! The Guardian is the root of the actor hierarchy and manages system-wide concerns:
//! - Spawns and supervises the WorkerRegistry and the WorkflowManager
//! - Routes workflow requests to the WorkflowManager
//! - Handles system initialization and shutdown
//! - Provides health checks

use std::{sync::Arc, time::SystemTime};

use ractor::{
    Actor, ActorProcessingErr, ActorRef, RpcReplyPort, SupervisionEvent,
    rpc::{CallResult, call}
};
use tracing::{Level, event};

use crate::{
    actor::{
        message::{GuardianMessage, RegistryMessage, SystemHealth, WorkflowManagerMessage},
        registry::{RegistryHandle, WorkerRegistry},
        workflow::{WorkflowManager, WorkflowManagerArgs}
    },
    domain::{constant::guardian, dataset::Dataset, error::CoordinatorError},
    port::{dataset::DatasetLoader, notifier::ResultsNotifier, storage::ArtifactStore},
    workflow::{Scheduler, SchedulerSettings}
};

/// Collaborators handed to the children on initialization
pub struct GuardianArgs {
    pub loader:   Arc<dyn DatasetLoader>,
    pub store:    Arc<dyn ArtifactStore>,
    pub notifier: Arc<dyn ResultsNotifier>,
    pub settings: SchedulerSettings,
    /// Dataset loaded at startup
    pub dataset:  Dataset
}

/// Guardian Actor State - tracks child actors and system metrics
pub struct GuardianState {
    /// Consumed by the first Initialize
    args:             Option<GuardianArgs>,
    registry:         Option<ActorRef<RegistryMessage>>,
    workflow_manager: Option<ActorRef<WorkflowManagerMessage>>,
    /// System startup time for uptime calculation
    startup_time:     SystemTime
}

/// Guardian Actor - Root supervisor of the actor system
pub struct Guardian;

#[async_trait::async_trait]
impl Actor for Guardian {
    type Arguments = GuardianArgs;
    type Msg = GuardianMessage;
    type State = GuardianState;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments
    ) -> Result<Self::State, ActorProcessingErr> {
        event!(Level::DEBUG, event = guardian::GUARDIAN_STARTED);

        Ok(GuardianState {
            args:             Some(args),
            registry:         None,
            workflow_manager: None,
            startup_time:     SystemTime::now()
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State
    ) -> Result<(), ActorProcessingErr> {
        match message {
            GuardianMessage::Initialize { reply } => {
                let result = self.handle_initialize(myself, state).await;
                if reply.send(result).is_err() {
                    event!(Level::ERROR, event = guardian::SYSTEM_INITIALIZED, error = "reply dropped");
                }
            }
            GuardianMessage::GetRegistry { reply } => {
                if reply.send(state.registry.clone()).is_err() {
                    event!(Level::WARN, event = guardian::REQUEST_ROUTED, error = "reply dropped");
                }
            }
            GuardianMessage::StartWorkflow { reply } => {
                Self::route(state, WorkflowManagerMessage::StartWorkflow { reply })
            }
            GuardianMessage::GetStatus { reply } => Self::route(state, WorkflowManagerMessage::GetStatus { reply }),
            GuardianMessage::ResetDataset { reply } => {
                Self::route(state, WorkflowManagerMessage::ResetDataset { reply })
            }
            GuardianMessage::BackupDataset { reply } => {
                Self::route(state, WorkflowManagerMessage::BackupDataset { reply })
            }
            GuardianMessage::Shutdown => self.handle_shutdown(myself, state),
            GuardianMessage::HealthCheck { reply } => self.handle_health_check(reply, state).await
        }
        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                event!(Level::DEBUG, event = guardian::CHILD_TERMINATED, actor = %cell.get_id(), reason = ?reason);
                Self::forget(state, cell.get_id());
            }
            SupervisionEvent::ActorFailed(cell, error) => {
                event!(Level::ERROR, event = guardian::CHILD_FAILED, actor = %cell.get_id(), error = %error);
                Self::forget(state, cell.get_id());
            }
            _ => {}
        }
        Ok(())
    }
}

impl Guardian {
    /// Spawn the complete actor system and wait until the children are up
    pub async fn spawn_system(args: GuardianArgs) -> Result<ActorRef<GuardianMessage>, CoordinatorError> {
        let (guardian_ref, _handle) = Actor::spawn(None, Guardian, args).await?;

        match call(&guardian_ref, |reply| GuardianMessage::Initialize { reply }, None).await {
            Ok(CallResult::Success(Ok(()))) => Ok(guardian_ref),
            Ok(CallResult::Success(Err(e))) => {
                guardian_ref.stop(None);
                Err(e)
            }
            Ok(_) => {
                guardian_ref.stop(None);
                Err(CoordinatorError::Spawn("guardian did not answer initialization".to_string()))
            }
            Err(e) => Err(CoordinatorError::Spawn(format!("guardian unreachable: {:?}", e)))
        }
    }

    /// Spawn child actors, linked to the guardian
    async fn handle_initialize(
        &self,
        myself: ActorRef<GuardianMessage>,
        state: &mut GuardianState
    ) -> Result<(), CoordinatorError> {
        let Some(args) = state.args.take() else {
            return Err(CoordinatorError::Generic("actor system already initialized".to_string()));
        };
        event!(Level::DEBUG, event = guardian::CHILDREN_SPAWNING);

        let (registry_ref, _handle) = Actor::spawn_linked(None, WorkerRegistry, (), myself.get_cell())
            .await
            .inspect_err(|e| {
                event!(Level::ERROR, event = guardian::CHILDREN_SPAWN_FAILED, actor = "worker_registry", error = %e)
            })?;
        event!(Level::DEBUG, event = guardian::CHILDREN_SPAWNED, actor = "worker_registry");

        let registry = RegistryHandle::new(registry_ref.clone());
        let scheduler = Scheduler::new(registry.clone(), args.store.clone(), args.notifier, args.settings);
        let manager_args = WorkflowManagerArgs {
            registry,
            scheduler,
            loader: args.loader,
            store: args.store,
            dataset: args.dataset
        };

        let manager_ref = match Actor::spawn_linked(None, WorkflowManager, manager_args, myself.get_cell()).await {
            Ok((manager_ref, _handle)) => manager_ref,
            Err(e) => {
                event!(Level::ERROR, event = guardian::CHILDREN_SPAWN_FAILED, actor = "workflow_manager", error = %e);
                registry_ref.stop(None);
                return Err(e.into());
            }
        };
        event!(Level::DEBUG, event = guardian::CHILDREN_SPAWNED, actor = "workflow_manager");

        state.registry = Some(registry_ref);
        state.workflow_manager = Some(manager_ref);

        event!(Level::INFO, event = guardian::SYSTEM_INITIALIZED);
        Ok(())
    }

    /// Hand the request to the manager; the reply port travels with it
    fn route(state: &GuardianState, message: WorkflowManagerMessage) {
        let Some(manager) = &state.workflow_manager else {
            // Dropping the message drops its reply port, which the caller sees as a sender error
            event!(Level::WARN, event = guardian::REQUEST_ROUTED, error = "workflow manager not running");
            return;
        };
        if let Err(e) = manager.cast(message) {
            event!(Level::ERROR, event = guardian::REQUEST_ROUTED, error = %e);
        }
    }

    /// Stop children, then the guardian itself
    fn handle_shutdown(&self, myself: ActorRef<GuardianMessage>, state: &mut GuardianState) {
        event!(Level::DEBUG, event = guardian::SYSTEM_SHUTDOWN_STARTED);

        if let Some(manager) = state.workflow_manager.take() {
            manager.stop(None);
        }
        if let Some(registry) = state.registry.take() {
            registry.stop(None);
        }

        event!(Level::INFO, event = guardian::SYSTEM_SHUTDOWN_COMPLETED);
        myself.stop(None);
    }

    async fn handle_health_check(&self, reply: RpcReplyPort<SystemHealth>, state: &GuardianState) {
        let uptime_seconds = state.startup_time.elapsed().unwrap_or_default().as_secs();

        let registered_workers = match &state.registry {
            Some(registry) => RegistryHandle::new(registry.clone()).list().await.map(|w| w.len()).unwrap_or(0),
            None => 0
        };

        let (workflow_running, completed_runs) = match &state.workflow_manager {
            Some(manager) => match call(manager, |reply| WorkflowManagerMessage::GetStatus { reply }, None).await {
                Ok(CallResult::Success(status)) => (status.running.is_some(), status.completed_runs),
                _ => (false, 0)
            },
            None => (false, 0)
        };

        let health = SystemHealth { registered_workers, workflow_running, completed_runs, uptime_seconds };

        event!(Level::DEBUG, event = guardian::HEALTH_CHECK_COMPLETED,
               registered_workers = %registered_workers, uptime_seconds = %uptime_seconds);

        if let Err(e) = reply.send(health) {
            event!(Level::ERROR, event = guardian::HEALTH_CHECK_COMPLETED, error = %e);
        }
    }

    fn forget(state: &mut GuardianState, id: ractor::ActorId) {
        if state.registry.as_ref().is_some_and(|r| r.get_id() == id) {
            state.registry = None;
        }
        if state.workflow_manager.as_ref().is_some_and(|m| m.get_id() == id) {
            state.workflow_manager = None;
        }
    }
}
