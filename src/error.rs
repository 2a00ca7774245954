//! Error types for the data broker
//!
//! Per-connection failures (protocol violations, transport errors) are
//! contained within that connection's task and never propagate to the
//! listener or to other connections.

use thiserror::Error;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// Protocol violation on a single connection
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Transport error; treated uniformly as a disconnect
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection
    #[error("connection closed")]
    ConnectionClosed,

    /// A client-side operation did not complete in time
    #[error("operation timed out")]
    Timeout,
}

/// Malformed frame or handshake; always fatal to the offending connection
/// only, never to the broker process.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Declared frame length exceeds the sanity limit
    #[error("frame length {len} exceeds maximum {max}")]
    FrameTooLarge { len: u64, max: u64 },

    /// The connection closed in the middle of a frame
    #[error("connection closed mid-frame")]
    Truncated,

    /// The handshake record could not be parsed or is invalid
    #[error("malformed handshake: {0}")]
    Handshake(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Protocol(ProtocolError::FrameTooLarge { len: 10, max: 5 });
        assert_eq!(err.to_string(), "protocol error: frame length 10 exceeds maximum 5");

        let err = Error::ConnectionClosed;
        assert_eq!(err.to_string(), "connection closed");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
