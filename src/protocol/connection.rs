//! Long-lived handle to one worker's TCP stream
//!
//! The stream sits behind an async mutex: whoever holds the guard owns the byte
//! stream for the duration of an exchange. The acceptor's connection holder
//! only ever takes the lock opportunistically to check liveness.
//!
//! The guard also tracks replies the worker still owes from an exchange that
//! gave up waiting, so the next exchange can consume them before sending.

use std::{io::ErrorKind, sync::Arc, time::Duration};

use tokio::{
    io::AsyncReadExt,
    net::TcpStream,
    sync::{Mutex, MutexGuard}
};

use crate::protocol::message::{self, DISCONNECT};

const PEEK_BYTES: usize = 16;

/// What a liveness check observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Nothing pending, stream open
    Alive,
    /// Data is waiting that is not a disconnect request
    Pending,
    /// Stream in use by an exchange, not checked
    Busy,
    /// The worker asked to leave with `DISCONNECT`
    PeerDisconnect,
    /// EOF or reset
    Closed
}

/// The stream plus the number of messages the worker still owes us
#[derive(Debug)]
pub struct WorkerLink {
    pub stream: TcpStream,
    owed:       u32
}

impl WorkerLink {
    /// Status texts and returned frames not yet read back
    pub fn owed(&self) -> u32 {
        self.owed
    }

    /// `WORK` went out: a status text and a returned frame will follow
    pub fn expect_reply(&mut self) {
        self.owed += 2;
    }

    pub fn received_one(&mut self) {
        self.owed = self.owed.saturating_sub(1);
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConnection {
    link: Arc<Mutex<WorkerLink>>
}

impl WorkerConnection {
    pub fn new(stream: TcpStream) -> Self {
        Self { link: Arc::new(Mutex::new(WorkerLink { stream, owed: 0 })) }
    }

    /// Exclusive access for a full exchange
    pub async fn lock(&self) -> MutexGuard<'_, WorkerLink> {
        self.link.lock().await
    }

    /// Non-blocking peek for closure or a pending `DISCONNECT`; never waits for data.
    pub async fn check_liveness(&self) -> Liveness {
        let Ok(mut link) = self.link.try_lock() else {
            return Liveness::Busy;
        };
        let stream = &mut link.stream;

        let mut buf = [0u8; PEEK_BYTES];
        match tokio::time::timeout(Duration::ZERO, stream.peek(&mut buf)).await {
            Err(_) => Liveness::Alive,
            Ok(Ok(0)) => Liveness::Closed,
            Ok(Ok(n)) => {
                if buf[..n].starts_with(DISCONNECT.as_bytes()) {
                    let mut consumed = [0u8; DISCONNECT.len()];
                    let _ = stream.read_exact(&mut consumed).await;
                    Liveness::PeerDisconnect
                } else {
                    Liveness::Pending
                }
            }
            Ok(Err(e)) if is_closed(e.kind()) => Liveness::Closed,
            Ok(Err(_)) => Liveness::Alive
        }
    }

    /// Best-effort `DISCONNECT` followed by a write shutdown. Errors are ignored.
    pub async fn goodbye(&self) {
        let mut link = self.link.lock().await;
        let _ = message::write_text(&mut link.stream, DISCONNECT).await;
        let _ = tokio::io::AsyncWriteExt::shutdown(&mut link.stream).await;
    }
}

/// Discard bytes already buffered on the stream, e.g. a late reply to an exchange that timed out.
pub fn drain_pending(stream: &TcpStream) -> usize {
    let mut buf = [0u8; 4096];
    let mut total = 0;
    loop {
        match stream.try_read(&mut buf) {
            Ok(0) => return total,
            Ok(n) => total += n,
            Err(_) => return total
        }
    }
}

fn is_closed(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe | ErrorKind::NotConnected
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use tokio::{io::AsyncWriteExt, net::TcpListener};

    use super::*;

    /// A connected (server side, client side) TCP pair on localhost
    pub(crate) async fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (server, client)
    }

    #[tokio::test]
    async fn test_liveness_sees_disconnect_request_and_close() {
        let (server, mut client) = tcp_pair().await;
        let conn = WorkerConnection::new(server);
        assert_eq!(conn.check_liveness().await, Liveness::Alive);

        client.write_all(DISCONNECT.as_bytes()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(conn.check_liveness().await, Liveness::PeerDisconnect);

        drop(client);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(conn.check_liveness().await, Liveness::Closed);
    }

    #[tokio::test]
    async fn test_liveness_skips_busy_connection() {
        let (server, _client) = tcp_pair().await;
        let conn = WorkerConnection::new(server);
        let _guard = conn.lock().await;
        assert_eq!(conn.check_liveness().await, Liveness::Busy);
    }

    #[tokio::test]
    async fn test_drain_discards_late_bytes() {
        let (server, mut client) = tcp_pair().await;
        client.write_all(b"late status").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(drain_pending(&server), 11);
        assert_eq!(drain_pending(&server), 0);
    }
}
