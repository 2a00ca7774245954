//! Length-prefixed framing
//!
//! Every message on the wire, handshake or data packet, is framed as:
//!
//! ```text
//! |        HEADER        |    PAYLOAD      |
//! | length (u64, LE)     | variable length |
//! |    FRAME_HEADER_LEN  |                 |
//! ```
//!
//! The broker does not interpret payload contents. Zero-length frames are
//! valid and reserved as keepalives; receivers skip them.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ProtocolError, Result};
use crate::protocol::constants::FRAME_HEADER_LEN;

/// Encode a payload into a single length-prefixed frame.
///
/// Mostly useful for tests and one-shot writes; [`write_frame`] avoids the
/// intermediate copy for the common case.
pub fn encode_frame(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
    buf.put_u64_le(payload.len() as u64);
    buf.put_slice(payload);
    buf.freeze()
}

/// Read one complete frame from the stream.
///
/// Suspends until a full header and payload have arrived. Returns
/// `Ok(None)` if the peer closed the connection cleanly at a frame
/// boundary. A close mid-frame is a [`ProtocolError::Truncated`]; a
/// declared length above `max_len` is a [`ProtocolError::FrameTooLarge`].
pub async fn read_frame<R>(reader: &mut R, max_len: u64) -> Result<Option<Bytes>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_LEN];

    // The first read distinguishes a clean close (0 bytes) from a close
    // partway through the header.
    let n = reader.read(&mut header).await?;
    if n == 0 {
        return Ok(None);
    }
    if n < FRAME_HEADER_LEN {
        reader
            .read_exact(&mut header[n..])
            .await
            .map_err(map_truncated)?;
    }

    let len = u64::from_le_bytes(header);
    if len > max_len {
        return Err(ProtocolError::FrameTooLarge { len, max: max_len }.into());
    }

    let mut payload = BytesMut::zeroed(len as usize);
    if len > 0 {
        reader
            .read_exact(&mut payload)
            .await
            .map_err(map_truncated)?;
    }

    Ok(Some(payload.freeze()))
}

/// Write one length-prefixed frame to the stream and flush it.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let header = (payload.len() as u64).to_le_bytes();
    writer.write_all(&header).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

fn map_truncated(err: std::io::Error) -> crate::error::Error {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        ProtocolError::Truncated.into()
    } else {
        err.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::protocol::constants::DEFAULT_MAX_FRAME_LEN;

    #[tokio::test]
    async fn test_frame_roundtrip() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        write_frame(&mut client, b"hello broker").await.unwrap();

        let payload = read_frame(&mut server, DEFAULT_MAX_FRAME_LEN)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&payload[..], b"hello broker");
    }

    #[tokio::test]
    async fn test_empty_frame() {
        let (mut client, mut server) = tokio::io::duplex(64);

        write_frame(&mut client, b"").await.unwrap();

        let payload = read_frame(&mut server, DEFAULT_MAX_FRAME_LEN)
            .await
            .unwrap()
            .unwrap();
        assert!(payload.is_empty());
    }

    #[tokio::test]
    async fn test_clean_close_returns_none() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);

        let result = read_frame(&mut server, DEFAULT_MAX_FRAME_LEN).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_close_mid_frame_is_truncated() {
        let (mut client, mut server) = tokio::io::duplex(64);

        // Header promises 100 bytes but only 3 arrive.
        let mut partial = Vec::new();
        partial.extend_from_slice(&100u64.to_le_bytes());
        partial.extend_from_slice(b"abc");
        tokio::io::AsyncWriteExt::write_all(&mut client, &partial)
            .await
            .unwrap();
        drop(client);

        let result = read_frame(&mut server, DEFAULT_MAX_FRAME_LEN).await;
        assert!(matches!(
            result,
            Err(Error::Protocol(ProtocolError::Truncated))
        ));
    }

    #[tokio::test]
    async fn test_close_mid_header_is_truncated() {
        let (mut client, mut server) = tokio::io::duplex(64);

        tokio::io::AsyncWriteExt::write_all(&mut client, &[1, 2, 3])
            .await
            .unwrap();
        drop(client);

        let result = read_frame(&mut server, DEFAULT_MAX_FRAME_LEN).await;
        assert!(matches!(
            result,
            Err(Error::Protocol(ProtocolError::Truncated))
        ));
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);

        tokio::io::AsyncWriteExt::write_all(&mut client, &u64::MAX.to_le_bytes())
            .await
            .unwrap();

        let result = read_frame(&mut server, 1024).await;
        assert!(matches!(
            result,
            Err(Error::Protocol(ProtocolError::FrameTooLarge { .. }))
        ));
    }

    #[test]
    fn test_encode_frame_layout() {
        let frame = encode_frame(b"xyz");
        assert_eq!(frame.len(), FRAME_HEADER_LEN + 3);
        assert_eq!(&frame[..FRAME_HEADER_LEN], &3u64.to_le_bytes());
        assert_eq!(&frame[FRAME_HEADER_LEN..], b"xyz");
    }
}
