//! WorkerRegistry Actor - single owner of the connected-worker table
//!
//! Every mutation and snapshot goes through this actor's mailbox, so
//! registrations from concurrent connection tasks and reads from the scheduler
//! never interleave. Snapshots are consistent at the instant they are taken;
//! entries may be removed right after.

use std::{
    collections::{HashMap, HashSet},
    net::SocketAddr,
    time::Duration
};

use chrono::Utc;
use ractor::{
    Actor, ActorProcessingErr, ActorRef, RpcReplyPort,
    rpc::{CallResult, call}
};
use tokio_util::sync::CancellationToken;
use tracing::{Level, event};

use crate::{
    actor::message::{RegisteredWorker, RegistryMessage},
    domain::{constant::registry, error::CoordinatorError, worker::WorkerInfo},
    protocol::{Handshake, WorkerConnection}
};

const REGISTRY_CALL_TIMEOUT: Duration = Duration::from_secs(10);

struct Entry {
    worker:  RegisteredWorker,
    release: CancellationToken
}

/// WorkerRegistry Actor State
pub struct RegistryState {
    entries:       HashMap<SocketAddr, Entry>,
    /// Names currently reserved
    names:         HashSet<String>,
    next_sequence: u64
}

impl RegistryState {
    fn new() -> Self {
        Self { entries: HashMap::new(), names: HashSet::new(), next_sequence: 0 }
    }

    fn register(
        &mut self,
        address: SocketAddr,
        connection: WorkerConnection,
        handshake: Handshake
    ) -> Result<CancellationToken, CoordinatorError> {
        if self.names.contains(&handshake.name) {
            return Err(CoordinatorError::NameConflict(handshake.name));
        }

        // A reused address means the old entry is stale; release it first.
        self.unregister(&address);

        let info = WorkerInfo {
            address,
            name: handshake.name.clone(),
            level: handshake.level,
            mode: handshake.mode,
            registered_at: Utc::now(),
            sequence: self.next_sequence
        };
        self.next_sequence += 1;

        let release = CancellationToken::new();
        self.names.insert(handshake.name);
        self.entries.insert(address, Entry { worker: RegisteredWorker { info, connection }, release: release.clone() });
        Ok(release)
    }

    fn unregister(&mut self, address: &SocketAddr) -> Option<WorkerInfo> {
        let entry = self.entries.remove(address)?;
        self.names.remove(&entry.worker.info.name);
        entry.release.cancel();
        Some(entry.worker.info)
    }

    fn address_of(&self, name: &str) -> Option<SocketAddr> {
        self.entries.values().find(|e| e.worker.info.name == name).map(|e| e.worker.info.address)
    }

    fn list(&self) -> Vec<RegisteredWorker> {
        let mut workers: Vec<RegisteredWorker> = self.entries.values().map(|e| e.worker.clone()).collect();
        workers.sort_by_key(|w| w.info.sequence);
        workers
    }

    fn sorted_by_level(&self) -> Vec<RegisteredWorker> {
        let mut workers = self.list();
        workers.sort_by_key(|w| (w.info.level, w.info.sequence));
        workers
    }
}

/// WorkerRegistry Actor
pub struct WorkerRegistry;

#[async_trait::async_trait]
impl Actor for WorkerRegistry {
    type Arguments = ();
    type Msg = RegistryMessage;
    type State = RegistryState;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        _args: Self::Arguments
    ) -> Result<Self::State, ActorProcessingErr> {
        event!(Level::DEBUG, event = registry::REGISTRY_STARTED);
        Ok(RegistryState::new())
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State
    ) -> Result<(), ActorProcessingErr> {
        match message {
            RegistryMessage::Register { address, connection, handshake, reply } => {
                let name = handshake.name.clone();
                let result = state.register(address, connection, handshake);
                match &result {
                    Ok(_) => event!(Level::INFO, event = registry::WORKER_REGISTERED,
                                    worker = %name, address = %address, total = state.entries.len()),
                    Err(e) => event!(Level::WARN, event = registry::WORKER_REJECTED,
                                     worker = %name, address = %address, error = %e)
                }
                Self::respond(reply, result);
            }
            RegistryMessage::Unregister { address, reply } => {
                let removed = Self::remove(state, &address);
                Self::respond(reply, removed);
            }
            RegistryMessage::UnregisterByName { name, reply } => {
                let removed = match state.address_of(&name) {
                    Some(address) => Self::remove(state, &address),
                    None => false
                };
                Self::respond(reply, removed);
            }
            RegistryMessage::UnregisterAll { reply } => {
                let addresses: Vec<SocketAddr> = state.entries.keys().copied().collect();
                let removed = addresses.iter().filter(|address| Self::remove(state, address)).count();
                Self::respond(reply, removed);
            }
            RegistryMessage::List { reply } => Self::respond(reply, state.list()),
            RegistryMessage::SortedByLevel { reply } => Self::respond(reply, state.sorted_by_level()),
            RegistryMessage::Contains { address, reply } => {
                Self::respond(reply, state.entries.contains_key(&address))
            }
        }
        Ok(())
    }
}

impl WorkerRegistry {
    /// Spawn an unnamed registry actor
    pub async fn spawn() -> Result<ActorRef<RegistryMessage>, CoordinatorError> {
        let (registry_ref, _handle) = Actor::spawn(None, WorkerRegistry, ()).await?;
        Ok(registry_ref)
    }

    fn remove(state: &mut RegistryState, address: &SocketAddr) -> bool {
        match state.unregister(address) {
            Some(info) => {
                event!(Level::INFO, event = registry::WORKER_UNREGISTERED,
                       worker = %info.name, address = %address, total = state.entries.len());
                true
            }
            None => false
        }
    }

    fn respond<T>(reply: RpcReplyPort<T>, value: T) {
        if reply.send(value).is_err() {
            event!(Level::WARN, event = registry::REPLY_FAILED);
        }
    }
}

/// Typed async access to the registry actor
#[derive(Debug, Clone)]
pub struct RegistryHandle {
    actor: ActorRef<RegistryMessage>
}

impl RegistryHandle {
    pub fn new(actor: ActorRef<RegistryMessage>) -> Self {
        Self { actor }
    }

    pub fn actor(&self) -> &ActorRef<RegistryMessage> {
        &self.actor
    }

    pub async fn register(
        &self,
        address: SocketAddr,
        connection: WorkerConnection,
        handshake: Handshake
    ) -> Result<CancellationToken, CoordinatorError> {
        self.request(|reply| RegistryMessage::Register { address, connection, handshake, reply }).await?
    }

    /// Idempotent; the entry's connection holder sends `DISCONNECT` and closes
    pub async fn unregister(&self, address: SocketAddr) -> Result<bool, CoordinatorError> {
        self.request(|reply| RegistryMessage::Unregister { address, reply }).await
    }

    pub async fn unregister_by_name(&self, name: &str) -> Result<bool, CoordinatorError> {
        let name = name.to_string();
        self.request(|reply| RegistryMessage::UnregisterByName { name, reply }).await
    }

    pub async fn unregister_all(&self) -> Result<usize, CoordinatorError> {
        self.request(|reply| RegistryMessage::UnregisterAll { reply }).await
    }

    pub async fn list(&self) -> Result<Vec<RegisteredWorker>, CoordinatorError> {
        self.request(|reply| RegistryMessage::List { reply }).await
    }

    pub async fn sorted_by_level(&self) -> Result<Vec<RegisteredWorker>, CoordinatorError> {
        self.request(|reply| RegistryMessage::SortedByLevel { reply }).await
    }

    pub async fn contains(&self, address: SocketAddr) -> Result<bool, CoordinatorError> {
        self.request(|reply| RegistryMessage::Contains { address, reply }).await
    }

    async fn request<T, F>(&self, build: F) -> Result<T, CoordinatorError>
    where
        T: Send + 'static,
        F: FnOnce(RpcReplyPort<T>) -> RegistryMessage
    {
        match call(&self.actor, build, Some(REGISTRY_CALL_TIMEOUT)).await {
            Ok(CallResult::Success(value)) => Ok(value),
            Ok(CallResult::Timeout) => Err(CoordinatorError::Registry("call timed out".to_string())),
            Ok(CallResult::SenderError) => Err(CoordinatorError::Registry("registry dropped the reply".to_string())),
            Err(e) => Err(CoordinatorError::Registry(format!("registry unreachable: {:?}", e)))
        }
    }
}
