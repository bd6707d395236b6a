//! Wire format of the data channel.
//!
//! # Wire format
//!
//! ```text
//! HANDSHAKE (answering -> offering peer): [32 bytes: hex token ASCII]
//! AUTH RESPONSE (offering -> answering):  [1 byte: 0x01=OK, 0x00=rejected]
//!
//! PER MESSAGE (either direction):
//!   [1 byte: kind, 0x01=text 0x02=binary]
//!   [4 bytes BE: payload_len]
//!   [payload_len bytes: UTF-8 text or raw bytes]
//! ```
//!
//! EOF at a message boundary closes the channel cleanly.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::MAX_MESSAGE_SIZE;
use crate::channel::ChannelMessage;
use crate::error::DataChannelError;

/// Authentication response: accepted.
pub const AUTH_OK: u8 = 0x01;

/// Authentication response: rejected.
pub const AUTH_REJECTED: u8 = 0x00;

/// Token length in bytes (32 hex characters).
pub const TOKEN_LEN: usize = 32;

/// Message kind: UTF-8 text.
pub const KIND_TEXT: u8 = 0x01;

/// Message kind: raw binary.
pub const KIND_BINARY: u8 = 0x02;

/// Writes one message to the stream (without flushing).
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    message: &ChannelMessage,
) -> Result<(), DataChannelError> {
    let (kind, payload) = match message {
        ChannelMessage::Text(text) => (KIND_TEXT, text.as_bytes()),
        ChannelMessage::Binary(data) => (KIND_BINARY, data.as_slice()),
    };
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(DataChannelError::MessageTooLarge(payload.len()));
    }

    writer.write_u8(kind).await?;
    writer.write_u32(payload.len() as u32).await?;
    writer.write_all(payload).await?;
    Ok(())
}

/// Reads one message from the stream.
///
/// Returns `None` when the peer closed the stream between messages.
pub async fn read_message<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<ChannelMessage>, DataChannelError> {
    let kind = match reader.read_u8().await {
        Ok(kind) => kind,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let len = reader.read_u32().await? as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(DataChannelError::MessageTooLarge(len));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    match kind {
        KIND_TEXT => String::from_utf8(payload)
            .map(|text| Some(ChannelMessage::Text(text)))
            .map_err(|e| DataChannelError::Protocol(format!("invalid UTF-8 text: {e}"))),
        KIND_BINARY => Ok(Some(ChannelMessage::Binary(payload))),
        other => Err(DataChannelError::Protocol(format!(
            "unknown message kind 0x{other:02x}"
        ))),
    }
}

/// Writes the authentication token (32 hex ASCII bytes).
pub async fn write_token<W: AsyncWrite + Unpin>(
    writer: &mut W,
    token: &str,
) -> Result<(), DataChannelError> {
    if token.len() != TOKEN_LEN {
        return Err(DataChannelError::Protocol(format!(
            "token must be {TOKEN_LEN} bytes, got {}",
            token.len()
        )));
    }
    writer.write_all(token.as_bytes()).await?;
    Ok(())
}

/// Reads the authentication token (32 hex ASCII bytes).
pub async fn read_token<R: AsyncRead + Unpin>(reader: &mut R) -> Result<String, DataChannelError> {
    let mut buf = [0u8; TOKEN_LEN];
    reader.read_exact(&mut buf).await?;
    String::from_utf8(buf.to_vec())
        .map_err(|e| DataChannelError::Protocol(format!("invalid token encoding: {e}")))
}

/// Writes the authentication response byte.
pub async fn write_auth_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    accepted: bool,
) -> Result<(), DataChannelError> {
    writer
        .write_u8(if accepted { AUTH_OK } else { AUTH_REJECTED })
        .await?;
    writer.flush().await?;
    Ok(())
}

/// Reads the authentication response byte.
pub async fn read_auth_response<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<bool, DataChannelError> {
    let byte = reader.read_u8().await?;
    Ok(byte == AUTH_OK)
}
