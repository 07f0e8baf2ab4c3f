//! Plain-text control messages and the registration record

use std::fmt::Display;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::domain::{error::CoordinatorError, worker::WorkerMode};

pub const WORK: &str = "WORK";
pub const DISCONNECT: &str = "DISCONNECT";
pub const CONNECTED: &str = "CONNECTED";
pub const ERROR_PREFIX: &str = "ERROR:";
pub const NAME_IN_USE: &str = "ERROR: Name already in use";

/// Largest handshake record read from a new connection
pub const HANDSHAKE_MAX_BYTES: usize = 1024;
/// Largest status text read after `WORK`
pub const STATUS_MAX_BYTES: usize = 4096;
/// Largest command read by the worker runtime
pub const COMMAND_MAX_BYTES: usize = 1024;

const FIELD_SEPARATOR: char = '|';

/// `name|level|mode`, sent once by a worker right after connecting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub name:  String,
    pub level: u32,
    pub mode:  WorkerMode
}

impl Handshake {
    pub fn parse(record: &str) -> Result<Self, CoordinatorError> {
        let record = record.trim_end_matches(['\r', '\n', '\0']);
        let fields: Vec<&str> = record.split(FIELD_SEPARATOR).collect();
        let [name, level, mode] = fields.as_slice() else {
            return Err(CoordinatorError::Handshake(format!(
                "expected name|level|mode, got {} field(s)",
                fields.len()
            )));
        };

        let name = name.trim();
        if name.is_empty() {
            return Err(CoordinatorError::Handshake("empty worker name".to_string()));
        }

        let level: u32 = level
            .trim()
            .parse()
            .map_err(|_| CoordinatorError::Handshake(format!("level '{}' is not a positive integer", level.trim())))?;
        if level == 0 {
            return Err(CoordinatorError::Handshake("level must be at least 1".to_string()));
        }

        Ok(Self { name: name.to_string(), level, mode: mode.parse()? })
    }

    pub fn encode(&self) -> String {
        format!("{}|{}|{}", self.name, self.level, self.mode.as_wire())
    }
}

/// A decoded plain-text command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    Work,
    Disconnect,
    Connected,
    Error(String),
    Other(String)
}

impl ControlMessage {
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        match text {
            WORK => ControlMessage::Work,
            DISCONNECT => ControlMessage::Disconnect,
            CONNECTED => ControlMessage::Connected,
            _ => match text.strip_prefix(ERROR_PREFIX) {
                Some(reason) => ControlMessage::Error(reason.trim().to_string()),
                None => ControlMessage::Other(text.to_string())
            }
        }
    }
}

impl Display for ControlMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlMessage::Work => write!(f, "{}", WORK),
            ControlMessage::Disconnect => write!(f, "{}", DISCONNECT),
            ControlMessage::Connected => write!(f, "{}", CONNECTED),
            ControlMessage::Error(reason) => write!(f, "{} {}", ERROR_PREFIX, reason),
            ControlMessage::Other(text) => write!(f, "{}", text)
        }
    }
}

/// Send a text message as-is and flush.
pub async fn write_text<W>(stream: &mut W, text: &str) -> Result<(), CoordinatorError>
where
    W: AsyncWrite + Unpin
{
    stream.write_all(text.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

/// One read of at most `max` bytes, decoded lossily.
///
/// `Ok(None)` means the peer closed the stream.
pub async fn read_text<R>(stream: &mut R, max: usize) -> Result<Option<String>, CoordinatorError>
where
    R: AsyncRead + Unpin
{
    let mut buf = vec![0u8; max];
    let n = stream.read(&mut buf).await?;
    if n == 0 {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&buf[..n]).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_handshake() {
        let hs = Handshake::parse("Tokenizer|2|Sequential").unwrap();
        assert_eq!(hs, Handshake { name: "Tokenizer".into(), level: 2, mode: WorkerMode::Sequential });

        let legacy = Handshake::parse("Model1|5|Параллельно\n").unwrap();
        assert_eq!(legacy.mode, WorkerMode::Parallel);
        assert_eq!(legacy.level, 5);
    }

    #[test]
    fn test_reject_bad_handshakes() {
        assert!(Handshake::parse("").is_err());
        assert!(Handshake::parse("OnlyName").is_err());
        assert!(Handshake::parse("A|1|Sequential|extra").is_err());
        assert!(Handshake::parse("|1|Sequential").is_err());
        assert!(Handshake::parse("A|0|Sequential").is_err());
        assert!(Handshake::parse("A|-3|Sequential").is_err());
        assert!(Handshake::parse("A|two|Parallel").is_err());
        assert!(Handshake::parse("A|1|Sometimes").is_err());
    }

    #[test]
    fn test_handshake_encode_parses_back() {
        let hs = Handshake { name: "Prediction_Client".into(), level: 8, mode: WorkerMode::Sequential };
        assert_eq!(hs.encode(), "Prediction_Client|8|Sequential");
        assert_eq!(Handshake::parse(&hs.encode()).unwrap(), hs);
    }

    #[test]
    fn test_control_messages() {
        assert_eq!(ControlMessage::parse("WORK"), ControlMessage::Work);
        assert_eq!(ControlMessage::parse("DISCONNECT"), ControlMessage::Disconnect);
        assert_eq!(ControlMessage::parse("CONNECTED"), ControlMessage::Connected);
        assert_eq!(ControlMessage::parse(NAME_IN_USE), ControlMessage::Error("Name already in use".into()));
        assert_eq!(ControlMessage::parse("hello"), ControlMessage::Other("hello".into()));
    }

    #[tokio::test]
    async fn test_read_text_reports_close() {
        let empty: &[u8] = &[];
        assert!(read_text(&mut &*empty, 16).await.unwrap().is_none());

        let data: &[u8] = b"Tokenizer: Tokenized 12 rows";
        assert_eq!(read_text(&mut &*data, STATUS_MAX_BYTES).await.unwrap().unwrap(), "Tokenizer: Tokenized 12 rows");
    }
}
