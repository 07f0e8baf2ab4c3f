//! One dataset round trip with one worker
//!
//! send_file frame, settle delay, `WORK`, status text, returned frame. The
//! connection lock is held for the whole round trip so the liveness check and
//! other exchanges cannot interleave with it.
//!
//! Once `WORK` is out the worker owes a status and a frame. If we stop waiting
//! for them, the debt stays on the connection and the next exchange reads and
//! drops them before sending anything. A worker that still has not answered
//! by then is reported busy and gets no new request.

use std::time::Duration;

use tokio::time::timeout;
use tracing::{Level, event};

use crate::{
    domain::{
        constant::scheduler,
        dataset::{Dataset, NO_UPDATE_FILENAME, NO_UPDATE_MARKER},
        error::CoordinatorError
    },
    protocol::{
        Frame, FrameAction, FrameHeader, FrameLimits, MessageKind, WorkerConnection, WorkerLink,
        connection::drain_pending,
        message::{self, STATUS_MAX_BYTES, WORK},
        peek_message_kind, read_frame, write_frame
    }
};

/// Timing and size rules for one exchange
#[derive(Debug, Clone, Copy)]
pub struct ExchangeSettings {
    pub work_timeout:       Duration,
    pub settle_delay:       Duration,
    /// How long to wait for replies owed by an earlier exchange
    pub owed_reply_wait:    Duration,
    pub min_artifact_bytes: usize,
    pub limits:             FrameLimits
}

/// How the returned frame was interpreted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnedArtifact {
    /// Replacement dataset content
    Updated { content: String },
    /// The worker kept the dataset as it was
    NoUpdate { reason: String }
}

/// What the worker answered
#[derive(Debug, Clone)]
pub struct ExchangeResult {
    pub status:   String,
    pub artifact: ReturnedArtifact
}

/// Run one round trip; any error leaves the dataset untouched.
pub async fn exchange(
    worker: &str,
    connection: &WorkerConnection,
    dataset: &Dataset,
    settings: &ExchangeSettings
) -> Result<ExchangeResult, CoordinatorError> {
    let mut link = connection.lock().await;

    if link.owed() > 0 {
        discard_owed(worker, &mut link, settings).await?;
    }

    let stale = drain_pending(&link.stream);
    if stale > 0 {
        event!(Level::WARN, event = scheduler::STALE_BYTES_DISCARDED, worker = %worker, bytes = stale);
    }

    let header = FrameHeader::for_payload(FrameAction::SendFile, dataset.file_name(), dataset.as_bytes());
    timeout(settings.work_timeout, write_frame(&mut link.stream, &header, dataset.as_bytes())).await??;

    tokio::time::sleep(settings.settle_delay).await;
    timeout(settings.work_timeout, message::write_text(&mut link.stream, WORK)).await??;
    link.expect_reply();

    let status = timeout(settings.work_timeout, message::read_text(&mut link.stream, STATUS_MAX_BYTES))
        .await??
        .ok_or_else(|| CoordinatorError::ConnectionClosed(format!("{} closed before reporting status", worker)))?;
    link.received_one();

    let frame = timeout(settings.work_timeout, read_frame(&mut link.stream, &settings.limits))
        .await??
        .ok_or_else(|| CoordinatorError::ConnectionClosed(format!("{} closed before returning a file", worker)))?;
    link.received_one();

    Ok(ExchangeResult { status: status.trim().to_string(), artifact: interpret(frame, settings.min_artifact_bytes) })
}

/// Read and drop the replies an abandoned exchange is still owed
async fn discard_owed(worker: &str, link: &mut WorkerLink, settings: &ExchangeSettings) -> Result<(), CoordinatorError> {
    while link.owed() > 0 {
        let kind = match timeout(settings.owed_reply_wait, peek_message_kind(&link.stream)).await {
            Ok(kind) => kind?,
            Err(_) => return Err(CoordinatorError::WorkerBusy(worker.to_string()))
        };

        let bytes = match kind {
            Some(MessageKind::Frame) => timeout(settings.work_timeout, read_frame(&mut link.stream, &settings.limits))
                .await??
                .map(|frame| frame.payload.len()),
            Some(MessageKind::Command) => {
                timeout(settings.work_timeout, message::read_text(&mut link.stream, STATUS_MAX_BYTES))
                    .await??
                    .map(|text| text.len())
            }
            None => None
        };
        let Some(bytes) = bytes else {
            return Err(CoordinatorError::ConnectionClosed(format!("{} closed with a reply outstanding", worker)));
        };

        link.received_one();
        event!(Level::INFO, event = scheduler::OWED_REPLY_DISCARDED, worker = %worker, kind = ?kind, bytes = bytes);
    }
    Ok(())
}

/// Decide whether a returned frame replaces the dataset
pub fn interpret(frame: Frame, min_artifact_bytes: usize) -> ReturnedArtifact {
    let Frame { header, payload } = frame;

    if header.action != FrameAction::ReturnFile {
        return ReturnedArtifact::NoUpdate { reason: format!("unexpected action {:?}", header.action) };
    }
    if header.filename == NO_UPDATE_FILENAME || payload == NO_UPDATE_MARKER {
        return ReturnedArtifact::NoUpdate { reason: "worker reported no update".to_string() };
    }
    if payload.len() < min_artifact_bytes {
        return ReturnedArtifact::NoUpdate {
            reason: format!("{} bytes is below the {} byte minimum", payload.len(), min_artifact_bytes)
        };
    }

    match String::from_utf8(payload) {
        Ok(content) => ReturnedArtifact::Updated { content },
        Err(_) => ReturnedArtifact::NoUpdate { reason: "returned file is not valid UTF-8".to_string() }
    }
}

#[cfg(test)]
mod tests {
    use tokio::{io::AsyncReadExt, net::TcpStream};

    use super::*;
    use crate::protocol::connection::tests::tcp_pair;

    fn settings() -> ExchangeSettings {
        ExchangeSettings {
            work_timeout:       Duration::from_millis(500),
            settle_delay:       Duration::from_millis(10),
            owed_reply_wait:    Duration::from_secs(2),
            min_artifact_bytes: 101,
            limits:             FrameLimits::default()
        }
    }

    fn returned(filename: &str, payload: &[u8]) -> Frame {
        Frame {
            header:  FrameHeader::for_payload(FrameAction::ReturnFile, filename, payload),
            payload: payload.to_vec()
        }
    }

    /// Plays a well-behaved worker that returns `reply`
    async fn answer(mut client: TcpStream, reply: Frame) -> Frame {
        let received = read_frame(&mut client, &FrameLimits::default()).await.unwrap().unwrap();
        let command = message::read_text(&mut client, 64).await.unwrap().unwrap();
        assert_eq!(command, WORK);
        message::write_text(&mut client, "done").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        write_frame(&mut client, &reply.header, &reply.payload).await.unwrap();
        received
    }

    #[test]
    fn test_interpret_rules() {
        let big = "x".repeat(150);
        assert!(matches!(interpret(returned("out.csv", big.as_bytes()), 101), ReturnedArtifact::Updated { .. }));
        assert!(matches!(
            interpret(returned(NO_UPDATE_FILENAME, NO_UPDATE_MARKER), 101),
            ReturnedArtifact::NoUpdate { .. }
        ));
        assert!(matches!(interpret(returned("out.csv", b"short"), 101), ReturnedArtifact::NoUpdate { .. }));
        assert!(matches!(interpret(returned("out.csv", &[0xff; 200]), 101), ReturnedArtifact::NoUpdate { .. }));

        let mut wrong_action = returned("out.csv", big.as_bytes());
        wrong_action.header.action = FrameAction::SendFile;
        assert!(matches!(interpret(wrong_action, 101), ReturnedArtifact::NoUpdate { .. }));

        // Exactly at the minimum counts
        assert!(matches!(interpret(returned("out.csv", &[b'a'; 101]), 101), ReturnedArtifact::Updated { .. }));
    }

    #[tokio::test]
    async fn test_exchange_round_trip() {
        let (server, client) = tcp_pair().await;
        let connection = WorkerConnection::new(server);
        let dataset = Dataset::new("text,label\nhello,1\n", "temp_processing.csv");
        let update = format!("text,label\n{}\n", "cleaned,1\n".repeat(20));

        let worker = tokio::spawn(answer(client, returned("cleaned.csv", update.as_bytes())));
        let result = exchange("Cleaner", &connection, &dataset, &settings()).await.unwrap();

        let received = worker.await.unwrap();
        assert_eq!(received.header.action, FrameAction::SendFile);
        assert_eq!(received.header.filename, "temp_processing.csv");
        assert_eq!(received.payload, dataset.as_bytes());

        assert_eq!(result.status, "done");
        assert_eq!(result.artifact, ReturnedArtifact::Updated { content: update });
    }

    #[tokio::test]
    async fn test_exchange_times_out_on_silent_worker() {
        let (server, mut client) = tcp_pair().await;
        let connection = WorkerConnection::new(server);
        let dataset = Dataset::new("a\n", "temp_processing.csv");

        let silent = tokio::spawn(async move {
            let _ = read_frame(&mut client, &FrameLimits::default()).await;
            tokio::time::sleep(Duration::from_secs(2)).await;
            drop(client);
        });

        let err = exchange("Slow", &connection, &dataset, &settings()).await.unwrap_err();
        assert!(err.is_timeout());
        silent.abort();
    }

    #[tokio::test]
    async fn test_exchange_reports_hard_close() {
        let (server, mut client) = tcp_pair().await;
        let connection = WorkerConnection::new(server);
        let dataset = Dataset::new("a\n", "temp_processing.csv");

        tokio::spawn(async move {
            let _ = read_frame(&mut client, &FrameLimits::default()).await;
            drop(client);
        });

        let err = exchange("Gone", &connection, &dataset, &settings()).await.unwrap_err();
        assert!(err.is_hard_close(), "unexpected error: {err:?}");
    }

    #[tokio::test]
    async fn test_late_reply_is_dropped_before_next_exchange() {
        let (server, mut client) = tcp_pair().await;
        let connection = WorkerConnection::new(server);
        let first = Dataset::new("text,label\nfirst,1\n", "temp_processing.csv");
        let second = Dataset::new("text,label\nsecond,1\n", "temp_processing.csv");
        let late = format!("text,label\n{}", "late,1\n".repeat(20));
        let fresh = format!("text,label\n{}", "fresh,1\n".repeat(20));
        let expected = fresh.clone();

        let worker = tokio::spawn(async move {
            let _ = read_frame(&mut client, &FrameLimits::default()).await.unwrap();
            let _ = message::read_text(&mut client, 64).await.unwrap();
            // Answers only after the coordinator gave up
            tokio::time::sleep(Duration::from_millis(700)).await;
            message::write_text(&mut client, "late").await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            let stale = returned("late.csv", late.as_bytes());
            write_frame(&mut client, &stale.header, &stale.payload).await.unwrap();

            answer(client, returned("fresh.csv", fresh.as_bytes())).await
        });

        let err = exchange("Slow", &connection, &first, &settings()).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(connection.lock().await.owed(), 2);

        let result = exchange("Slow", &connection, &second, &settings()).await.unwrap();
        assert_eq!(result.status, "done");
        assert_eq!(result.artifact, ReturnedArtifact::Updated { content: expected });
        assert_eq!(connection.lock().await.owed(), 0);

        let received = worker.await.unwrap();
        assert_eq!(received.payload, second.as_bytes());
    }

    #[tokio::test]
    async fn test_worker_still_busy_gets_no_new_request() {
        let (server, mut client) = tcp_pair().await;
        let connection = WorkerConnection::new(server);
        let dataset = Dataset::new("a\n", "temp_processing.csv");
        let impatient = ExchangeSettings { owed_reply_wait: Duration::from_millis(100), ..settings() };

        let (result, mut client) = tokio::join!(exchange("Busy", &connection, &dataset, &impatient), async move {
            let _ = read_frame(&mut client, &FrameLimits::default()).await.unwrap();
            let _ = message::read_text(&mut client, 64).await.unwrap();
            client
        });
        assert!(result.unwrap_err().is_timeout());

        let err = exchange("Busy", &connection, &dataset, &impatient).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::WorkerBusy(_)), "unexpected error: {err:?}");
        assert_eq!(connection.lock().await.owed(), 2);

        let mut buf = [0u8; 16];
        let nothing = tokio::time::timeout(Duration::from_millis(100), client.read(&mut buf)).await;
        assert!(nothing.is_err(), "a new request reached a busy worker");
    }
}
