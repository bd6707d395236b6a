//! Answering side: connect to a pasted description and authenticate.

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::channel::DataChannel;
use crate::description::ConnectionDescription;
use crate::error::DataChannelError;
use crate::wire::{read_auth_response, write_token};
use crate::{AUTH_TIMEOUT, CONNECT_TIMEOUT};

/// Connects to the offering peer described by `description`.
pub async fn connect(
    description: &ConnectionDescription,
    cancel: CancellationToken,
) -> Result<DataChannel, DataChannelError> {
    let addr = description.address;

    let mut stream = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return Err(DataChannelError::Cancelled);
        }
        result = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)) => {
            match result {
                Ok(Ok(s)) => {
                    info!(%addr, "data channel connected");
                    s
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => return Err(DataChannelError::Timeout),
            }
        }
    };

    write_token(&mut stream, &description.token).await?;
    stream.flush().await?;

    let accepted = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return Err(DataChannelError::Cancelled);
        }
        result = tokio::time::timeout(AUTH_TIMEOUT, read_auth_response(&mut stream)) => {
            match result {
                Ok(Ok(a)) => a,
                Ok(Err(e)) => return Err(e),
                Err(_) => return Err(DataChannelError::Timeout),
            }
        }
    };

    if !accepted {
        return Err(DataChannelError::AuthFailed("peer rejected token".into()));
    }

    stream.set_nodelay(true)?;
    info!(%addr, "data channel: authenticated");
    Ok(DataChannel::spawn(stream, cancel))
}
