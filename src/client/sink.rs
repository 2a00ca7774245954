//! Consumer-side client
//!
//! A [`DataSink`] receives one dataset's packet stream. A background task
//! drains the socket into a client-side [`BoundedQueue`], so slow user
//! code sheds load by eviction (mirroring the broker's policy) instead of
//! stalling the socket, and [`DataSink::pop`] is an ordinary
//! blocking-pop-with-timeout.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::protocol::constants::{DEFAULT_MAX_FRAME_LEN, DEFAULT_QUEUE_CAPACITY};
use crate::protocol::frame::read_frame;
use crate::protocol::handshake::{Handshake, Role};
use crate::queue::{BoundedQueue, PopResult};

/// Pops packets from a named dataset on the broker
///
/// # Example
/// ```no_run
/// use std::time::Duration;
/// use dataserv_rs::client::DataSink;
///
/// # async fn example() -> dataserv_rs::error::Result<()> {
/// let sink = DataSink::connect("localhost:30101", "odmr_scan").await?;
/// while let Some(packet) = sink.pop(Duration::from_secs(1)).await? {
///     println!("got {} bytes", packet.len());
/// }
/// # Ok(())
/// # }
/// ```
pub struct DataSink {
    dataset: String,
    queue: Arc<BoundedQueue>,
    reader: JoinHandle<()>,
}

impl DataSink {
    /// Connect to the broker as a sink for `dataset` with the default
    /// local queue capacity
    pub async fn connect<A: ToSocketAddrs>(addr: A, dataset: impl Into<String>) -> Result<Self> {
        Self::connect_with_capacity(addr, dataset, DEFAULT_QUEUE_CAPACITY).await
    }

    /// Connect with a custom local queue capacity
    pub async fn connect_with_capacity<A: ToSocketAddrs>(
        addr: A,
        dataset: impl Into<String>,
        capacity: usize,
    ) -> Result<Self> {
        let dataset = dataset.into();
        let mut stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;

        let handshake = Handshake::new(Role::Sink, dataset.clone()).encode()?;
        crate::protocol::frame::write_frame(&mut stream, &handshake).await?;

        let queue = Arc::new(BoundedQueue::new(capacity));
        let reader = tokio::spawn(read_loop(stream, Arc::clone(&queue), dataset.clone()));

        tracing::debug!(dataset = %dataset, "Sink connected");
        Ok(Self {
            dataset,
            queue,
            reader,
        })
    }

    /// Pop the oldest received packet, waiting up to `timeout`.
    ///
    /// Returns `Ok(None)` on timeout and `Err(ConnectionClosed)` once the
    /// broker connection is gone and the local queue is drained.
    pub async fn pop(&self, timeout: Duration) -> Result<Option<Bytes>> {
        match self.queue.pop(timeout).await {
            PopResult::Item(packet) => Ok(Some(packet)),
            PopResult::TimedOut => Ok(None),
            PopResult::Closed => Err(Error::ConnectionClosed),
        }
    }

    /// Pop without waiting
    pub fn try_pop(&self) -> Option<Bytes> {
        self.queue.try_pop()
    }

    /// The dataset this sink receives
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// Whether the broker connection is still alive
    pub fn is_connected(&self) -> bool {
        !self.queue.is_closed()
    }

    /// Disconnect and stop the background reader
    pub fn close(self) {
        self.reader.abort();
        self.queue.close();
    }
}

impl Drop for DataSink {
    fn drop(&mut self) {
        self.reader.abort();
        self.queue.close();
    }
}

async fn read_loop(mut stream: TcpStream, queue: Arc<BoundedQueue>, dataset: String) {
    loop {
        match read_frame(&mut stream, DEFAULT_MAX_FRAME_LEN).await {
            Ok(Some(payload)) => {
                // Zero-length frames are keepalives
                if !payload.is_empty() && queue.push(payload) {
                    tracing::debug!(
                        dataset = %dataset,
                        "Local consumer can't keep up, oldest packet evicted"
                    );
                }
            }
            Ok(None) => {
                tracing::debug!(dataset = %dataset, "Broker closed the sink connection");
                break;
            }
            Err(e) => {
                tracing::warn!(dataset = %dataset, error = %e, "Sink read failed");
                break;
            }
        }
    }
    queue.close();
}
