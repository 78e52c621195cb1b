//! IPC protocol between capgate and an engine child process.
//!
//! Each frame is a 4-byte big-endian length followed by a JSON-encoded
//! [`HostMessage`] or [`EngineMessage`].

use std::io;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::engine::{ExecutionRequest, ExecutionResult};

/// Default maximum IPC message size: 64 MB.
pub const DEFAULT_MAX_IPC_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Messages sent from capgate to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HostMessage {
    /// Initial message: run this request.
    Execute {
        /// The full execution request.
        request: ExecutionRequest,
    },
    /// Response to a capability call from the engine.
    CapabilityResult {
        /// Matches the request_id from [`EngineMessage::CapabilityCall`].
        request_id: u64,
        /// The capability's return value, or an error message.
        result: Result<Value, String>,
    },
}

/// Messages sent from the engine to capgate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineMessage {
    /// The snippet called an external function.
    CapabilityCall {
        /// Unique ID for correlating request and response.
        request_id: u64,
        /// Capability name as written in the snippet.
        name: String,
        /// Positional arguments.
        #[serde(default)]
        args: Vec<Value>,
        /// Keyword arguments.
        #[serde(default)]
        kwargs: Map<String, Value>,
    },
    /// The run has finished.
    ExecutionComplete {
        /// Output or structured failure.
        result: ExecutionResult,
    },
    /// A diagnostic line from the engine.
    Log {
        /// The log message text.
        message: String,
    },
}

fn invalid_data(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

/// Encode `msg` as one frame: big-endian `u32` payload length, then JSON.
pub fn encode_frame<T: Serialize>(msg: &T) -> io::Result<Vec<u8>> {
    let mut frame = vec![0u8; 4];
    serde_json::to_writer(&mut frame, msg).map_err(invalid_data)?;
    let payload_len = frame.len() - 4;
    let len = u32::try_from(payload_len)
        .map_err(|_| invalid_data(format!("IPC payload too large: {payload_len} bytes")))?;
    frame[..4].copy_from_slice(&len.to_be_bytes());
    Ok(frame)
}

/// Write one framed message and flush.
pub async fn write_message<T: Serialize, W: AsyncWrite + Unpin>(
    writer: &mut W,
    msg: &T,
) -> io::Result<()> {
    let frame = encode_frame(msg)?;
    writer.write_all(&frame).await?;
    writer.flush().await
}

/// [`read_message_with_limit`] with [`DEFAULT_MAX_IPC_MESSAGE_SIZE`].
pub async fn read_message<T: DeserializeOwned, R: AsyncRead + Unpin>(
    reader: &mut R,
) -> io::Result<Option<T>> {
    read_message_with_limit(reader, DEFAULT_MAX_IPC_MESSAGE_SIZE).await
}

/// Read one framed message, rejecting payloads over `max_size` bytes.
///
/// `Ok(None)` means the peer closed the stream before a length prefix.
pub async fn read_message_with_limit<T: DeserializeOwned, R: AsyncRead + Unpin>(
    reader: &mut R,
    max_size: usize,
) -> io::Result<Option<T>> {
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };
    if len > max_size {
        return Err(invalid_data(format!(
            "IPC message too large: {len} bytes (limit: {max_size} bytes)"
        )));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    serde_json::from_slice(&payload).map(Some).map_err(invalid_data)
}
