//! Accepting worker connections
//!
//! Each connection gets its own task: read the `name|level|mode` record,
//! register, acknowledge, then hold the stream until the registry releases it
//! or the worker goes away.

use std::{net::SocketAddr, time::Duration};

use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream},
    time::timeout
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{Level, event};

use crate::{
    actor::registry::RegistryHandle,
    domain::{constant::acceptor, error::CoordinatorError},
    protocol::{
        Handshake, Liveness, WorkerConnection,
        message::{self, CONNECTED, ERROR_PREFIX, HANDSHAKE_MAX_BYTES, NAME_IN_USE}
    }
};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
pub struct AcceptorSettings {
    /// How long a new connection has to send its registration record
    pub handshake_timeout: Duration,
    /// Interval between liveness checks of an idle connection
    pub liveness_interval: Duration
}

/// Accept connections until `shutdown` is cancelled.
///
/// Connection tasks are spawned on `connections` so the caller can wait for
/// their goodbyes.
pub async fn serve(
    listener: TcpListener,
    registry: RegistryHandle,
    settings: AcceptorSettings,
    connections: TaskTracker,
    shutdown: CancellationToken
) {
    if let Ok(address) = listener.local_addr() {
        event!(Level::INFO, event = acceptor::LISTENING, address = %address);
    }

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, address)) => {
                    event!(Level::DEBUG, event = acceptor::CONNECTION_ACCEPTED, address = %address);
                    connections.spawn(handle_connection(stream, address, registry.clone(), settings));
                }
                Err(e) => {
                    event!(Level::WARN, event = acceptor::ACCEPT_FAILED, error = %e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
}

async fn handle_connection(mut stream: TcpStream, address: SocketAddr, registry: RegistryHandle, settings: AcceptorSettings) {
    let record = match timeout(settings.handshake_timeout, message::read_text(&mut stream, HANDSHAKE_MAX_BYTES)).await {
        Ok(Ok(Some(record))) => record,
        Ok(Ok(None)) => {
            event!(Level::DEBUG, event = acceptor::HANDSHAKE_FAILED, address = %address, reason = "closed");
            return;
        }
        Ok(Err(e)) => {
            event!(Level::WARN, event = acceptor::HANDSHAKE_FAILED, address = %address, error = %e);
            return;
        }
        Err(_) => {
            event!(Level::WARN, event = acceptor::HANDSHAKE_TIMEOUT, address = %address);
            return;
        }
    };

    let handshake = match Handshake::parse(&record) {
        Ok(handshake) => handshake,
        Err(e) => {
            event!(Level::WARN, event = acceptor::HANDSHAKE_FAILED, address = %address, error = %e);
            let _ = message::write_text(&mut stream, &format!("{} {}", ERROR_PREFIX, e)).await;
            let _ = stream.shutdown().await;
            return;
        }
    };
    let name = handshake.name.clone();

    let connection = WorkerConnection::new(stream);
    let release = {
        // Held until the ack is out so no exchange can write to the worker first
        let mut link = connection.lock().await;
        let release = match registry.register(address, connection.clone(), handshake).await {
            Ok(release) => release,
            Err(CoordinatorError::NameConflict(_)) => {
                let _ = message::write_text(&mut link.stream, NAME_IN_USE).await;
                let _ = link.stream.shutdown().await;
                return;
            }
            Err(e) => {
                event!(Level::ERROR, event = acceptor::HANDSHAKE_FAILED, worker = %name, error = %e);
                let _ = link.stream.shutdown().await;
                return;
            }
        };

        if let Err(e) = message::write_text(&mut link.stream, CONNECTED).await {
            event!(Level::WARN, event = acceptor::HANDSHAKE_FAILED, worker = %name, error = %e);
            drop(link);
            let _ = registry.unregister(address).await;
            return;
        }
        release
    };

    hold(connection, address, &name, registry, release, settings.liveness_interval).await;
}

/// Keep the connection until it is released or the worker leaves
async fn hold(
    connection: WorkerConnection,
    address: SocketAddr,
    name: &str,
    registry: RegistryHandle,
    release: CancellationToken,
    interval: Duration
) {
    event!(Level::DEBUG, event = acceptor::CONNECTION_HELD, worker = %name, address = %address);

    loop {
        tokio::select! {
            _ = release.cancelled() => {
                connection.goodbye().await;
                event!(Level::INFO, event = acceptor::CONNECTION_RELEASED, worker = %name, address = %address);
                return;
            }
            _ = tokio::time::sleep(interval) => match connection.check_liveness().await {
                Liveness::Alive | Liveness::Busy | Liveness::Pending => {}
                liveness @ (Liveness::PeerDisconnect | Liveness::Closed) => {
                    event!(Level::INFO, event = acceptor::PEER_CLOSED, worker = %name, liveness = ?liveness);
                    // Unregistering cancels `release`; the next iteration closes the stream
                    if let Err(e) = registry.unregister(address).await {
                        event!(Level::ERROR, event = acceptor::PEER_CLOSED, worker = %name, error = %e);
                        connection.goodbye().await;
                        return;
                    }
                }
            }
        }
    }
}
