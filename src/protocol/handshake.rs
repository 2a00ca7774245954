//! Connection handshake
//!
//! The first frame a client sends declares what it wants from the broker:
//!
//! ```text
//! Client                                   Server
//!   |                                        |
//!   |-- {"role": "source", "dataset": "x"} ->|
//!   |                                        |
//!   |            [role-specific data flow]   |
//! ```
//!
//! Roles:
//! - `source`: the client will push data packets for the named dataset
//! - `sink`: the client will receive data packets from the named dataset
//! - `info`: the server answers with a dataset listing and closes
//!
//! A malformed handshake fails the connection immediately; the transport is
//! closed without a response.

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};

/// Role a connection declares at handshake time.
///
/// Selected once per connection; all later behavior dispatches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Pushes packets into a dataset
    Source,
    /// Pops packets from a dataset
    Sink,
    /// Requests the list of live datasets
    Info,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Source => write!(f, "source"),
            Role::Sink => write!(f, "sink"),
            Role::Info => write!(f, "info"),
        }
    }
}

/// Handshake record, sent once per connection immediately after connect
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handshake {
    /// Declared role
    pub role: Role,
    /// Dataset name; ignored for [`Role::Info`]
    #[serde(default)]
    pub dataset: String,
}

impl Handshake {
    /// Create a handshake record for the given role and dataset
    pub fn new(role: Role, dataset: impl Into<String>) -> Self {
        Self {
            role,
            dataset: dataset.into(),
        }
    }

    /// Serialize into a frame payload
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ProtocolError::Handshake(e.to_string()).into())
    }

    /// Parse a handshake from a frame payload.
    ///
    /// Source and sink handshakes must name a dataset.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let handshake: Handshake = serde_json::from_slice(payload)
            .map_err(|e| ProtocolError::Handshake(e.to_string()))?;

        if handshake.dataset.is_empty() && handshake.role != Role::Info {
            return Err(ProtocolError::Handshake(format!(
                "{} handshake without a dataset name",
                handshake.role
            ))
            .into());
        }

        Ok(handshake)
    }
}

/// Server reply to an [`Role::Info`] handshake
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoResponse {
    /// Names of the datasets currently live on the broker
    pub datasets: Vec<String>,
}

impl InfoResponse {
    /// Serialize into a frame payload
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ProtocolError::Handshake(e.to_string()).into())
    }

    /// Parse an info response from a frame payload
    pub fn decode(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| ProtocolError::Handshake(e.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_handshake_roundtrip() {
        let hs = Handshake::new(Role::Source, "odmr_scan");
        let bytes = hs.encode().unwrap();

        let decoded = Handshake::decode(&bytes).unwrap();
        assert_eq!(decoded.role, Role::Source);
        assert_eq!(decoded.dataset, "odmr_scan");
    }

    #[test]
    fn test_handshake_wire_format() {
        let decoded =
            Handshake::decode(br#"{"role": "sink", "dataset": "counts"}"#).unwrap();
        assert_eq!(decoded.role, Role::Sink);
        assert_eq!(decoded.dataset, "counts");
    }

    #[test]
    fn test_info_handshake_needs_no_dataset() {
        let decoded = Handshake::decode(br#"{"role": "info"}"#).unwrap();
        assert_eq!(decoded.role, Role::Info);
        assert!(decoded.dataset.is_empty());
    }

    #[test]
    fn test_source_handshake_requires_dataset() {
        let result = Handshake::decode(br#"{"role": "source"}"#);
        assert!(matches!(
            result,
            Err(Error::Protocol(crate::error::ProtocolError::Handshake(_)))
        ));
    }

    #[test]
    fn test_malformed_handshake_rejected() {
        assert!(Handshake::decode(b"not json at all").is_err());
        assert!(Handshake::decode(br#"{"role": "destroyer", "dataset": "x"}"#).is_err());
        assert!(Handshake::decode(b"").is_err());
    }

    #[test]
    fn test_info_response_roundtrip() {
        let resp = InfoResponse {
            datasets: vec!["a".into(), "b".into()],
        };
        let bytes = resp.encode().unwrap();
        let decoded = InfoResponse::decode(&bytes).unwrap();
        assert_eq!(decoded.datasets, vec!["a", "b"]);
    }
}
