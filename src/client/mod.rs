//! Worker runtime
//!
//! Connects to the coordinator, registers, then serves requests: a
//! `send_file` frame stores the dataset, `WORK` runs the transform and answers
//! with a status text followed by a `return_file` frame.

use std::time::Duration;

use tokio::{io::AsyncReadExt, net::TcpStream, time::timeout};
use tracing::{Level, event};

use crate::{
    domain::{
        constant::worker_client,
        dataset::{NO_UPDATE_FILENAME, NO_UPDATE_MARKER},
        error::CoordinatorError
    },
    port::transform::Transform,
    protocol::{
        ControlMessage, FrameAction, FrameHeader, FrameLimits, Handshake, MessageKind,
        message::{self, COMMAND_MAX_BYTES, CONNECTED, ERROR_PREFIX, STATUS_MAX_BYTES},
        peek_message_kind, read_frame, write_frame
    }
};

const NO_DATASET_STATUS: &str = "Error: dataset not received";

#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Coordinator address, `host:port`
    pub server:            String,
    /// How long to wait for `CONNECTED` or an error; silence is not a failure
    pub handshake_timeout: Duration,
    /// Pause between the status text and the returned frame
    pub settle_delay:      Duration,
    pub limits:            FrameLimits
}

/// Last dataset received from the coordinator
#[derive(Debug, Clone)]
struct Received {
    filename: String,
    content:  String
}

/// A registered connection to the coordinator
#[derive(Debug)]
pub struct WorkerClient {
    stream:    TcpStream,
    handshake: Handshake,
    settings:  ClientSettings,
    dataset:   Option<Received>
}

impl WorkerClient {
    /// Connect and register.
    ///
    /// An `ERROR:` reply (e.g. the name is taken) fails with
    /// [`CoordinatorError::Handshake`]. No reply within the handshake timeout
    /// is accepted and the worker proceeds.
    pub async fn connect(settings: ClientSettings, handshake: Handshake) -> Result<Self, CoordinatorError> {
        event!(Level::INFO, event = worker_client::CONNECTING, server = %settings.server, worker = %handshake.name);

        let mut stream = TcpStream::connect(&settings.server).await?;
        message::write_text(&mut stream, &handshake.encode()).await?;

        let mut first = [0u8; 1];
        match timeout(settings.handshake_timeout, stream.peek(&mut first)).await {
            Err(_) => {
                event!(Level::WARN, event = worker_client::HANDSHAKE_UNCONFIRMED, worker = %handshake.name);
            }
            Ok(Ok(0)) => {
                return Err(CoordinatorError::ConnectionClosed("coordinator closed during registration".to_string()));
            }
            Ok(Ok(_)) if first[0] == ERROR_PREFIX.as_bytes()[0] => {
                let reply = message::read_text(&mut stream, COMMAND_MAX_BYTES).await?.unwrap_or_default();
                let reason = match ControlMessage::parse(&reply) {
                    ControlMessage::Error(reason) => reason,
                    _ => reply.trim().to_string()
                };
                return Err(CoordinatorError::Handshake(reason));
            }
            Ok(Ok(_)) if first[0] == CONNECTED.as_bytes()[0] => {
                // Consume exactly the ack; a frame may already follow it
                let mut ack = [0u8; CONNECTED.len()];
                timeout(settings.handshake_timeout, stream.read_exact(&mut ack)).await??;
                event!(Level::INFO, event = worker_client::CONNECTED, worker = %handshake.name);
            }
            Ok(Ok(_)) => {
                event!(Level::WARN, event = worker_client::HANDSHAKE_UNCONFIRMED, worker = %handshake.name);
            }
            Ok(Err(e)) => return Err(e.into())
        }

        Ok(Self { stream, handshake, settings, dataset: None })
    }

    pub fn name(&self) -> &str {
        &self.handshake.name
    }

    /// Serve the coordinator until it disconnects us or closes the stream
    pub async fn run(mut self, transform: &dyn Transform) -> Result<(), CoordinatorError> {
        loop {
            let Some(kind) = peek_message_kind(&self.stream).await? else {
                event!(Level::INFO, event = worker_client::DISCONNECTED, worker = %self.handshake.name, reason = "closed");
                return Ok(());
            };

            match kind {
                MessageKind::Frame => {
                    let Some(frame) = read_frame(&mut self.stream, &self.settings.limits).await? else {
                        return Ok(());
                    };
                    if frame.header.action != FrameAction::SendFile {
                        event!(Level::WARN, event = worker_client::COMMAND_IGNORED, action = ?frame.header.action);
                        continue;
                    }
                    event!(
                        Level::INFO,
                        event = worker_client::DATASET_RECEIVED,
                        worker = %self.handshake.name,
                        filename = %frame.header.filename,
                        bytes = frame.payload.len()
                    );
                    let content = String::from_utf8_lossy(&frame.payload).into_owned();
                    self.dataset = Some(Received { filename: frame.header.filename, content });
                }
                MessageKind::Command => {
                    let Some(text) = message::read_text(&mut self.stream, COMMAND_MAX_BYTES).await? else {
                        return Ok(());
                    };
                    match ControlMessage::parse(&text) {
                        ControlMessage::Work => self.work(transform).await?,
                        ControlMessage::Disconnect => {
                            event!(Level::INFO, event = worker_client::DISCONNECTED, worker = %self.handshake.name);
                            return Ok(());
                        }
                        ControlMessage::Error(reason) => return Err(CoordinatorError::Generic(reason)),
                        ControlMessage::Connected => {}
                        ControlMessage::Other(text) => {
                            event!(Level::DEBUG, event = worker_client::COMMAND_IGNORED, command = %text);
                        }
                    }
                }
            }
        }
    }

    /// Answer one `WORK`: status text, settle delay, returned frame
    async fn work(&mut self, transform: &dyn Transform) -> Result<(), CoordinatorError> {
        let (status, update) = match &self.dataset {
            Some(received) => {
                event!(Level::INFO, event = worker_client::WORK_STARTED, worker = %self.handshake.name);
                let outcome = transform.apply(&received.content).await;
                (outcome.status, outcome.updated.map(|content| (format!("processed_{}", received.filename), content)))
            }
            None => (NO_DATASET_STATUS.to_string(), None)
        };

        let status = if status.trim().is_empty() { "OK".to_string() } else { fit_status(status) };
        message::write_text(&mut self.stream, &status).await?;
        tokio::time::sleep(self.settings.settle_delay).await;

        let updated = update.is_some();
        match update {
            Some((filename, content)) => {
                let header = FrameHeader::for_payload(FrameAction::ReturnFile, filename, content.as_bytes());
                write_frame(&mut self.stream, &header, content.as_bytes()).await?;
            }
            None => {
                let header = FrameHeader::for_payload(FrameAction::ReturnFile, NO_UPDATE_FILENAME, NO_UPDATE_MARKER);
                write_frame(&mut self.stream, &header, NO_UPDATE_MARKER).await?;
            }
        }

        event!(Level::INFO, event = worker_client::WORK_COMPLETED, worker = %self.handshake.name, updated = updated);
        Ok(())
    }
}

/// Cut a status to what the coordinator reads in one go, on a char boundary
fn fit_status(mut status: String) -> String {
    if status.len() > STATUS_MAX_BYTES {
        let mut end = STATUS_MAX_BYTES;
        while !status.is_char_boundary(end) {
            end -= 1;
        }
        status.truncate(end);
    }
    status
}
