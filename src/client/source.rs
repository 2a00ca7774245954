//! Producer-side client
//!
//! A [`DataSource`] holds the source role for one dataset on the broker.
//! Reconnection after a disconnect (or an eviction by a newer source) is
//! the caller's responsibility.

use tokio::net::{TcpStream, ToSocketAddrs};

use crate::error::Result;
use crate::protocol::frame::write_frame;
use crate::protocol::handshake::{Handshake, Role};

/// Pushes packets into a named dataset on the broker
///
/// # Example
/// ```no_run
/// use dataserv_rs::client::DataSource;
///
/// # async fn example() -> dataserv_rs::error::Result<()> {
/// let mut source = DataSource::connect("localhost:30101", "odmr_scan").await?;
/// source.push(b"sweep 1 counts".as_ref()).await?;
/// # Ok(())
/// # }
/// ```
pub struct DataSource {
    stream: TcpStream,
    dataset: String,
}

impl DataSource {
    /// Connect to the broker and claim the source role for `dataset`.
    ///
    /// If the dataset already has a source, the broker closes the old
    /// connection in favor of this one.
    pub async fn connect<A: ToSocketAddrs>(addr: A, dataset: impl Into<String>) -> Result<Self> {
        let dataset = dataset.into();
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;

        let mut source = Self { stream, dataset };
        let handshake = Handshake::new(Role::Source, source.dataset.clone()).encode()?;
        write_frame(&mut source.stream, &handshake).await?;

        tracing::debug!(dataset = %source.dataset, "Source connected");
        Ok(source)
    }

    /// Send one packet to the broker.
    ///
    /// The broker fans it out to whatever sinks are attached at that
    /// moment; there is no delivery acknowledgment.
    pub async fn push(&mut self, payload: &[u8]) -> Result<()> {
        write_frame(&mut self.stream, payload).await
    }

    /// The dataset this source publishes to
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// Shut the connection down cleanly
    pub async fn close(mut self) -> Result<()> {
        use tokio::io::AsyncWriteExt;
        self.stream.shutdown().await?;
        Ok(())
    }
}
