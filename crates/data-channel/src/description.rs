//! Copy/paste connection descriptions.
//!
//! The offering peer prints one; the answering peer pastes it. The text
//! form is standard base64 of a JSON record so it survives chat clients
//! and terminals without quoting.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::DataChannelError;
use crate::wire::TOKEN_LEN;

/// Where to connect and which token to present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDescription {
    pub address: SocketAddr,
    pub token: String,
}

impl ConnectionDescription {
    /// Encodes the description for copy/paste.
    pub fn encode(&self) -> String {
        // Serializing a SocketAddr and a String cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        STANDARD.encode(json)
    }

    /// Decodes a pasted description. Surrounding whitespace is ignored.
    pub fn decode(text: &str) -> Result<Self, DataChannelError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(DataChannelError::InvalidDescription("empty".into()));
        }

        let json = STANDARD
            .decode(text)
            .map_err(|e| DataChannelError::InvalidDescription(format!("not base64: {e}")))?;
        let desc: ConnectionDescription = serde_json::from_slice(&json)
            .map_err(|e| DataChannelError::InvalidDescription(format!("malformed: {e}")))?;

        if desc.token.len() != TOKEN_LEN || !desc.token.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DataChannelError::InvalidDescription(
                "token must be 32 hex characters".into(),
            ));
        }
        if desc.address.port() == 0 || desc.address.ip().is_unspecified() {
            return Err(DataChannelError::InvalidDescription(format!(
                "address {} is not connectable",
                desc.address
            )));
        }
        Ok(desc)
    }
}

/// Picks the address to publish for a listener bound to `bound`.
///
/// A specific bound IP is published as is. For an unspecified bind
/// (`0.0.0.0`) the first non-loopback IPv4 interface is used, falling back
/// to loopback when the host has none.
pub fn advertised_address(bound: SocketAddr) -> SocketAddr {
    if !bound.ip().is_unspecified() {
        return bound;
    }

    let ip = if_addrs::get_if_addrs()
        .ok()
        .and_then(|ifaces| {
            ifaces
                .into_iter()
                .filter(|iface| !iface.is_loopback())
                .map(|iface| iface.ip())
                .find(IpAddr::is_ipv4)
        })
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

    SocketAddr::new(ip, bound.port())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ConnectionDescription {
        ConnectionDescription {
            address: "192.168.1.20:40123".parse().unwrap(),
            token: "a1b2c3d4e5f6a7b8a1b2c3d4e5f6a7b8".into(),
        }
    }

    #[test]
    fn encode_then_decode() {
        let desc = sample();
        let text = desc.encode();
        assert!(!text.contains('{'));
        assert_eq!(ConnectionDescription::decode(&text).unwrap(), desc);
    }

    #[test]
    fn decode_tolerates_surrounding_whitespace() {
        let text = format!("  {}\n", sample().encode());
        assert_eq!(ConnectionDescription::decode(&text).unwrap(), sample());
    }

    #[test]
    fn decode_rejects_garbage() {
        for text in ["", "   ", "not base64 at all!", "aGVsbG8="] {
            assert!(matches!(
                ConnectionDescription::decode(text),
                Err(DataChannelError::InvalidDescription(_))
            ));
        }
    }

    #[test]
    fn decode_rejects_bad_token() {
        let mut desc = sample();
        desc.token = "short".into();
        assert!(ConnectionDescription::decode(&desc.encode()).is_err());
    }

    #[test]
    fn decode_rejects_unspecified_address() {
        let mut desc = sample();
        desc.address = "0.0.0.0:40123".parse().unwrap();
        assert!(ConnectionDescription::decode(&desc.encode()).is_err());
    }

    #[test]
    fn specific_bind_is_advertised_unchanged() {
        let bound: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        assert_eq!(advertised_address(bound), bound);
    }

    #[test]
    fn unspecified_bind_keeps_port() {
        let bound: SocketAddr = "0.0.0.0:5000".parse().unwrap();
        let advertised = advertised_address(bound);
        assert_eq!(advertised.port(), 5000);
        assert!(!advertised.ip().is_unspecified());
    }
}
