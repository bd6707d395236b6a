//! Offering side: bind, publish a description, accept one peer.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::channel::DataChannel;
use crate::description::{ConnectionDescription, advertised_address};
use crate::error::DataChannelError;
use crate::wire::{read_token, write_auth_response};
use crate::AUTH_TIMEOUT;

/// A bound listener waiting for the answering peer.
pub struct ChannelListener {
    listener: TcpListener,
    description: ConnectionDescription,
    cancel: CancellationToken,
}

impl ChannelListener {
    /// Binds `bind` and generates a fresh token.
    ///
    /// `advertise` overrides the address published in the description.
    pub async fn bind(
        bind: SocketAddr,
        advertise: Option<SocketAddr>,
        cancel: CancellationToken,
    ) -> Result<Self, DataChannelError> {
        let listener = TcpListener::bind(bind).await?;
        let local = listener.local_addr()?;
        let address = match advertise {
            Some(addr) if addr.port() == 0 => SocketAddr::new(addr.ip(), local.port()),
            Some(addr) => addr,
            None => advertised_address(local),
        };
        let description = ConnectionDescription {
            address,
            token: crate::token::generate_token(),
        };

        info!(%local, %address, "data channel listener bound");
        Ok(Self {
            listener,
            description,
            cancel,
        })
    }

    /// The description to hand to the answering peer.
    pub fn description(&self) -> &ConnectionDescription {
        &self.description
    }

    /// Accepts a single connection and checks its token.
    ///
    /// Waits until a peer connects or `cancel` fires; only the token
    /// exchange is bounded by [`AUTH_TIMEOUT`]. The listener is consumed:
    /// one channel per description.
    pub async fn accept(self) -> Result<DataChannel, DataChannelError> {
        let (mut stream, addr) = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                return Err(DataChannelError::Cancelled);
            }
            result = self.listener.accept() => result?,
        };
        info!(%addr, "data channel connection accepted");
        drop(self.listener);

        let presented = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                return Err(DataChannelError::Cancelled);
            }
            result = tokio::time::timeout(AUTH_TIMEOUT, read_token(&mut stream)) => {
                match result {
                    Ok(Ok(t)) => t,
                    Ok(Err(e)) => return Err(e),
                    Err(_) => return Err(DataChannelError::Timeout),
                }
            }
        };

        if !crate::token::validate_token(&presented, &self.description.token) {
            warn!(%addr, "data channel: invalid token");
            write_auth_response(&mut stream, false).await?;
            return Err(DataChannelError::AuthFailed("invalid token".into()));
        }

        write_auth_response(&mut stream, true).await?;
        stream.set_nodelay(true)?;
        info!(%addr, "data channel: authenticated");

        Ok(DataChannel::spawn(stream, self.cancel))
    }
}
