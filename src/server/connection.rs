//! Per-connection handler
//!
//! Each accepted connection gets one task. It performs the handshake, then
//! runs the read or write loop for its role. Any error here is contained
//! within this connection: the listener only logs it, other connections
//! never observe it.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::protocol::frame::{read_frame, write_frame};
use crate::protocol::handshake::{Handshake, InfoResponse, Role};
use crate::queue::PopResult;
use crate::registry::DataRegistry;
use crate::server::config::ServerConfig;

/// A single accepted connection, pre-handshake
pub struct Connection {
    session_id: u64,
    socket: TcpStream,
    peer_addr: SocketAddr,
    config: ServerConfig,
    registry: Arc<DataRegistry>,
    shutdown: watch::Receiver<bool>,
}

impl Connection {
    /// Wrap an accepted socket
    pub fn new(
        session_id: u64,
        socket: TcpStream,
        peer_addr: SocketAddr,
        config: ServerConfig,
        registry: Arc<DataRegistry>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            session_id,
            socket,
            peer_addr,
            config,
            registry,
            shutdown,
        }
    }

    /// Handshake, then run the role-specific loop to completion.
    ///
    /// Returns when the peer disconnects, the connection faults, the source
    /// is evicted, or the broker shuts down. Detach from the registry is
    /// guaranteed on every exit path of the role loops.
    pub async fn run(mut self) -> Result<()> {
        let payload = match tokio::time::timeout(
            self.config.handshake_timeout,
            read_frame(&mut self.socket, self.config.max_frame_len),
        )
        .await
        {
            Ok(Ok(Some(payload))) => payload,
            Ok(Ok(None)) => return Err(Error::ConnectionClosed),
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(Error::Timeout),
        };

        let handshake = Handshake::decode(&payload)?;

        tracing::debug!(
            session_id = self.session_id,
            peer = %self.peer_addr,
            role = %handshake.role,
            dataset = %handshake.dataset,
            "Handshake complete"
        );

        match handshake.role {
            Role::Source => self.run_source(handshake.dataset).await,
            Role::Sink => self.run_sink(handshake.dataset).await,
            Role::Info => self.run_info().await,
        }
    }

    /// Source loop: drain inbound frames into the registry's fan-out path
    async fn run_source(mut self, dataset: String) -> Result<()> {
        let handle = self
            .registry
            .attach_source(&dataset, self.session_id)
            .await;

        let result = loop {
            // The read is not resumed after the other branches fire, which
            // is fine: both terminate the connection.
            tokio::select! {
                _ = handle.evicted.notified() => {
                    tracing::info!(
                        session_id = self.session_id,
                        dataset = %dataset,
                        "Source connection closed, replaced by a newer source"
                    );
                    break Ok(());
                }
                _ = self.shutdown.changed() => break Ok(()),
                res = read_frame(&mut self.socket, self.config.max_frame_len) => match res {
                    Ok(Some(payload)) => {
                        // Zero-length frames are keepalives
                        if !payload.is_empty() {
                            self.registry.publish(&dataset, payload).await;
                        }
                    }
                    Ok(None) => break Ok(()),
                    Err(e) => break Err(e),
                },
            }
        };

        self.registry.detach_source(&dataset, self.session_id).await;
        result
    }

    /// Sink loop: drain the owned queue out to the socket
    async fn run_sink(mut self, dataset: String) -> Result<()> {
        let handle = self.registry.attach_sink(&dataset, self.session_id).await;

        let result = loop {
            tokio::select! {
                _ = self.shutdown.changed() => break Ok(()),
                popped = handle.queue.pop(self.config.sink_pop_timeout) => match popped {
                    PopResult::Item(packet) => {
                        match write_frame(&mut self.socket, &packet).await {
                            Ok(()) => self.registry.stats().packet_delivered(packet.len()),
                            // Write failure is a disconnect, never retried
                            Err(e) => break Err(e),
                        }
                    }
                    // No keepalive: the transport's own liveness detection
                    // suffices, so just wait again
                    PopResult::TimedOut => {}
                    PopResult::Closed => break Ok(()),
                },
            }
        };

        self.registry.detach_sink(&dataset, self.session_id).await;
        result
    }

    /// Info request: answer with the live dataset names and close
    async fn run_info(mut self) -> Result<()> {
        let response = InfoResponse {
            datasets: self.registry.dataset_names().await,
        };
        write_frame(&mut self.socket, &response.encode()?).await?;

        tracing::debug!(
            session_id = self.session_id,
            peer = %self.peer_addr,
            datasets = response.datasets.len(),
            "Served dataset listing"
        );
        Ok(())
    }
}
