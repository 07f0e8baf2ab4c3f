//! Framed message codec shared by the coordinator and the worker runtime.
//!
//! Wire format: `[u32 big-endian header length][JSON header][payload]`, where
//! the header declares the payload size. Both lengths are checked against
//! [`FrameLimits`] before the block they describe is read.
//!
//! Plain command strings (`WORK`, `DISCONNECT`, ...) travel on the same stream
//! without any prefix. [`peek_message_kind`] tells the two apart by inspecting
//! the first four bytes without consuming them.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream
};

use crate::domain::error::CoordinatorError;

/// Width of the header length prefix
pub const PREFIX_LEN: usize = 4;
/// Upper bound (exclusive) for a prefix to be read as a header length when peeking.
pub const FRAME_PREFIX_LIMIT: u32 = 10_000;

/// Largest header a peeking peer still recognises as a frame
pub const MAX_PEEKABLE_HEADER_BYTES: u32 = FRAME_PREFIX_LIMIT - 1;

const DEFAULT_MAX_HEADER_BYTES: u32 = MAX_PEEKABLE_HEADER_BYTES;
const DEFAULT_MAX_PAYLOAD_BYTES: u64 = 512 * 1024 * 1024;

const SHORT_PEEK_RETRIES: usize = 50;
const SHORT_PEEK_BACKOFF: Duration = Duration::from_millis(10);

/// What a frame carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameAction {
    /// Coordinator → worker: the current dataset
    SendFile,
    /// Worker → coordinator: the processed dataset or the no-update sentinel
    ReturnFile,
    /// Anything a newer peer might send; never produced here
    #[serde(other)]
    Unknown
}

/// Self-describing header preceding every payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameHeader {
    pub action:   FrameAction,
    pub filename: String,
    #[serde(default)]
    pub size:     u64
}

impl FrameHeader {
    /// Header whose declared size matches `payload`
    pub fn for_payload(action: FrameAction, filename: impl Into<String>, payload: &[u8]) -> Self {
        Self { action, filename: filename.into(), size: payload.len() as u64 }
    }
}

/// One decoded protocol unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header:  FrameHeader,
    pub payload: Vec<u8>
}

/// Sanity bounds applied before any declared block is read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    pub max_header_bytes:  u32,
    pub max_payload_bytes: u64
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self { max_header_bytes: DEFAULT_MAX_HEADER_BYTES, max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES }
    }
}

/// How the next message on a mixed stream should be read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Frame,
    Command
}

/// Write one frame and flush it.
pub async fn write_frame<W>(stream: &mut W, header: &FrameHeader, payload: &[u8]) -> Result<(), CoordinatorError>
where
    W: AsyncWrite + Unpin
{
    if header.size != payload.len() as u64 {
        return Err(CoordinatorError::MalformedFrame(format!(
            "header declares {} bytes but payload has {}",
            header.size,
            payload.len()
        )));
    }

    let header_bytes = serde_json::to_vec(header)?;
    let header_len = u32::try_from(header_bytes.len()).map_err(|_| {
        CoordinatorError::MalformedFrame(format!("header exceeds u32::MAX: {} bytes", header_bytes.len()))
    })?;

    stream.write_all(&header_len.to_be_bytes()).await?;
    stream.write_all(&header_bytes).await?;
    if !payload.is_empty() {
        stream.write_all(payload).await?;
    }
    stream.flush().await?;
    Ok(())
}

/// Read one frame.
///
/// Returns `Ok(None)` when the peer closed the stream before sending any byte
/// of the length prefix. A close anywhere later is `ConnectionClosed`.
pub async fn read_frame<R>(stream: &mut R, limits: &FrameLimits) -> Result<Option<Frame>, CoordinatorError>
where
    R: AsyncRead + Unpin
{
    let mut prefix = [0u8; PREFIX_LEN];
    let mut filled = 0;
    while filled < PREFIX_LEN {
        let n = stream.read(&mut prefix[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(CoordinatorError::ConnectionClosed(format!(
                "stream closed after {} of {} prefix bytes",
                filled, PREFIX_LEN
            )));
        }
        filled += n;
    }

    let header_len = u32::from_be_bytes(prefix);
    if header_len == 0 || header_len > limits.max_header_bytes {
        return Err(CoordinatorError::MalformedFrame(format!(
            "header length {} outside 1..={}",
            header_len, limits.max_header_bytes
        )));
    }

    let mut header_bytes = vec![0u8; header_len as usize];
    stream.read_exact(&mut header_bytes).await?;
    let header: FrameHeader = serde_json::from_slice(&header_bytes)
        .map_err(|e| CoordinatorError::MalformedFrame(format!("unparsable header: {}", e)))?;

    if header.size > limits.max_payload_bytes {
        return Err(CoordinatorError::MalformedFrame(format!(
            "payload size {} exceeds {}",
            header.size, limits.max_payload_bytes
        )));
    }

    let mut payload = vec![0u8; header.size as usize];
    if header.size > 0 {
        stream.read_exact(&mut payload).await?;
    }

    Ok(Some(Frame { header, payload }))
}

/// Classify four leading bytes.
///
/// A small positive big-endian integer is taken as a frame header length;
/// anything else is the start of a plain command. Text commands start with
/// printable ASCII, which always decodes far above [`FRAME_PREFIX_LIMIT`].
pub fn classify_prefix(prefix: [u8; PREFIX_LEN]) -> MessageKind {
    let n = u32::from_be_bytes(prefix);
    if n > 0 && n < FRAME_PREFIX_LIMIT { MessageKind::Frame } else { MessageKind::Command }
}

/// Wait for the next message and report its kind without consuming it.
///
/// `Ok(None)` means the peer closed the stream.
pub async fn peek_message_kind(stream: &TcpStream) -> Result<Option<MessageKind>, CoordinatorError> {
    let mut buf = [0u8; PREFIX_LEN];
    let mut retries = 0;
    loop {
        let n = stream.peek(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        if n == PREFIX_LEN {
            return Ok(Some(classify_prefix(buf)));
        }
        // Fewer than four bytes so far: either a frame prefix split by the
        // transport or a very short command.
        if retries == SHORT_PEEK_RETRIES {
            return Ok(Some(MessageKind::Command));
        }
        retries += 1;
        tokio::time::sleep(SHORT_PEEK_BACKOFF).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::connection::tests::tcp_pair;

    fn encoded(header: &FrameHeader, payload: &[u8]) -> Vec<u8> {
        let header_bytes = serde_json::to_vec(header).unwrap();
        let mut buf = Vec::new();
        buf.extend_from_slice(&(header_bytes.len() as u32).to_be_bytes());
        buf.extend_from_slice(&header_bytes);
        buf.extend_from_slice(payload);
        buf
    }

    #[tokio::test]
    async fn test_frame_round_trip() {
        let payload = b"name,size\napple,7\npear,9\n".to_vec();
        let header = FrameHeader::for_payload(FrameAction::SendFile, "temp_processing.csv", &payload);

        let mut buf = Vec::new();
        write_frame(&mut buf, &header, &payload).await.unwrap();

        let frame = read_frame(&mut buf.as_slice(), &FrameLimits::default()).await.unwrap().unwrap();
        assert_eq!(frame.header, header);
        assert_eq!(frame.payload, payload);
    }

    #[tokio::test]
    async fn test_wire_layout_matches_header_json() {
        let payload = b"NO_UPDATE";
        let header = FrameHeader::for_payload(FrameAction::ReturnFile, "no_update.txt", payload);

        let mut buf = Vec::new();
        write_frame(&mut buf, &header, payload).await.unwrap();

        let header_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        let json: serde_json::Value = serde_json::from_slice(&buf[4..4 + header_len]).unwrap();
        assert_eq!(json["action"], "return_file");
        assert_eq!(json["filename"], "no_update.txt");
        assert_eq!(json["size"], 9);
        assert_eq!(&buf[4 + header_len..], payload);
    }

    #[tokio::test]
    async fn test_empty_payload_means_no_body() {
        let header = FrameHeader::for_payload(FrameAction::ReturnFile, "empty.csv", &[]);
        let mut buf = Vec::new();
        write_frame(&mut buf, &header, &[]).await.unwrap();

        let frame = read_frame(&mut buf.as_slice(), &FrameLimits::default()).await.unwrap().unwrap();
        assert_eq!(frame.header.size, 0);
        assert!(frame.payload.is_empty());
    }

    #[tokio::test]
    async fn test_eof_before_prefix_is_end_of_stream() {
        let empty: &[u8] = &[];
        let result = read_frame(&mut &*empty, &FrameLimits::default()).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_close_inside_prefix_is_connection_error() {
        let partial: &[u8] = &[0, 0];
        let err = read_frame(&mut &*partial, &FrameLimits::default()).await.unwrap_err();
        assert!(err.is_hard_close());
    }

    #[tokio::test]
    async fn test_truncated_payload_is_connection_error() {
        let payload = vec![7u8; 64];
        let header = FrameHeader::for_payload(FrameAction::SendFile, "data.csv", &payload);
        let mut buf = encoded(&header, &payload);
        buf.truncate(buf.len() - 10);

        let err = read_frame(&mut buf.as_slice(), &FrameLimits::default()).await.unwrap_err();
        assert!(err.is_hard_close());
    }

    #[tokio::test]
    async fn test_oversized_header_length_rejected_before_reading() {
        // Declares 2^31 header bytes and carries nothing after the prefix.
        let buf = (1u32 << 31).to_be_bytes().to_vec();
        let err = read_frame(&mut buf.as_slice(), &FrameLimits::default()).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::MalformedFrame(_)));
    }

    #[tokio::test]
    async fn test_oversized_payload_rejected_before_reading() {
        let header = FrameHeader { action: FrameAction::SendFile, filename: "big.csv".into(), size: 1 << 31 };
        let buf = encoded(&header, &[]);
        let limits = FrameLimits { max_header_bytes: 1024, max_payload_bytes: 1024 };

        let err = read_frame(&mut buf.as_slice(), &limits).await.unwrap_err();
        match err {
            CoordinatorError::MalformedFrame(msg) => assert!(msg.contains("exceeds")),
            other => panic!("unexpected error: {other:?}")
        }
    }

    #[tokio::test]
    async fn test_zero_header_length_rejected() {
        let buf = 0u32.to_be_bytes().to_vec();
        let err = read_frame(&mut buf.as_slice(), &FrameLimits::default()).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::MalformedFrame(_)));
    }

    #[tokio::test]
    async fn test_mismatched_declared_size_refused_on_write() {
        let header = FrameHeader { action: FrameAction::SendFile, filename: "x".into(), size: 3 };
        let mut buf = Vec::new();
        assert!(write_frame(&mut buf, &header, b"four").await.is_err());
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_action_still_parses() {
        let raw = br#"{"action":"ping","filename":"","size":0}"#;
        let mut buf = (raw.len() as u32).to_be_bytes().to_vec();
        buf.extend_from_slice(raw);

        let frame = read_frame(&mut buf.as_slice(), &FrameLimits::default()).await.unwrap().unwrap();
        assert_eq!(frame.header.action, FrameAction::Unknown);
    }

    #[test]
    fn test_default_header_limit_stays_peekable() {
        let limit = FrameLimits::default().max_header_bytes;
        assert_eq!(classify_prefix(limit.to_be_bytes()), MessageKind::Frame);
        assert_eq!(classify_prefix((limit + 1).to_be_bytes()), MessageKind::Command);
    }

    #[tokio::test]
    async fn test_peek_waits_for_split_prefix() {
        let (server, mut client) = tcp_pair().await;
        let header = FrameHeader::for_payload(FrameAction::SendFile, "temp_processing.csv", b"a,b\n");
        let bytes = encoded(&header, b"a,b\n");

        client.write_all(&bytes[..2]).await.unwrap();
        client.flush().await.unwrap();
        let peeked = tokio::spawn(async move {
            let kind = peek_message_kind(&server).await.unwrap();
            (kind, server)
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        client.write_all(&bytes[2..]).await.unwrap();

        let (kind, mut server) = peeked.await.unwrap();
        assert_eq!(kind, Some(MessageKind::Frame));
        // Nothing was consumed
        let frame = read_frame(&mut server, &FrameLimits::default()).await.unwrap().unwrap();
        assert_eq!(frame.header, header);
    }

    #[tokio::test]
    async fn test_short_text_falls_back_to_command() {
        let (server, mut client) = tcp_pair().await;
        client.write_all(b"OK").await.unwrap();

        assert_eq!(peek_message_kind(&server).await.unwrap(), Some(MessageKind::Command));
    }

    #[test]
    fn test_classify_prefix() {
        assert_eq!(classify_prefix(*b"WORK"), MessageKind::Command);
        assert_eq!(classify_prefix(*b"DISC"), MessageKind::Command);
        assert_eq!(classify_prefix(*b"ERRO"), MessageKind::Command);
        assert_eq!(classify_prefix(58u32.to_be_bytes()), MessageKind::Frame);
        assert_eq!(classify_prefix(0u32.to_be_bytes()), MessageKind::Command);
        assert_eq!(classify_prefix(FRAME_PREFIX_LIMIT.to_be_bytes()), MessageKind::Command);
    }
}
