//! Broker listener
//!
//! Handles the TCP accept loop, spawns connection handlers, and supervises
//! their lifecycle through shutdown.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinSet;

use crate::error::Result;
use crate::registry::DataRegistry;
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;

/// The data broker server
pub struct Broker {
    config: ServerConfig,
    listener: TcpListener,
    local_addr: SocketAddr,
    registry: Arc<DataRegistry>,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
    connections: Mutex<JoinSet<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Broker {
    /// Bind the listening socket.
    ///
    /// Fails only on a bind error; accepting starts with
    /// [`run`](Self::run) or [`run_until`](Self::run_until).
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        let local_addr = listener.local_addr()?;

        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            registry: Arc::new(DataRegistry::new(config.queue_capacity)),
            config,
            listener,
            local_addr,
            next_session_id: AtomicU64::new(1),
            connection_semaphore,
            connections: Mutex::new(JoinSet::new()),
            shutdown_tx,
        })
    }

    /// Get a reference to the dataset registry
    pub fn registry(&self) -> &Arc<DataRegistry> {
        &self.registry
    }

    /// The address the broker is actually bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Run the broker.
    ///
    /// This method blocks until the process exits; there is no shutdown
    /// path. Use [`run_until`](Self::run_until) for graceful shutdown.
    pub async fn run(&self) -> Result<()> {
        tracing::info!(addr = %self.local_addr, "Data broker listening");
        let stats_handle = self.spawn_stats_task();
        let result = self.accept_loop().await;
        stats_handle.abort();
        result
    }

    /// Run the broker until `shutdown` resolves, then drain.
    ///
    /// On shutdown the listener stops accepting, every connection task is
    /// signalled, and live tasks get [`ServerConfig::shutdown_grace`] to
    /// close before being aborted.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        tracing::info!(addr = %self.local_addr, "Data broker listening");
        let stats_handle = self.spawn_stats_task();

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop() => result,
        };

        stats_handle.abort();
        self.drain_connections().await;
        result
    }

    async fn accept_loop(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    async fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match Arc::clone(sem).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            session_id,
            peer = %peer_addr,
            "New connection"
        );

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::warn!(session_id, error = %e, "Failed to set TCP_NODELAY");
            }
        }

        let connection = Connection::new(
            session_id,
            socket,
            peer_addr,
            self.config.clone(),
            Arc::clone(&self.registry),
            self.shutdown_tx.subscribe(),
        );

        let registry = Arc::clone(&self.registry);
        registry.stats().connection_opened();

        let mut connections = self.connections.lock().await;
        // Reap tasks that have already finished so the set does not grow
        // with every connection ever accepted
        while connections.try_join_next().is_some() {}

        connections.spawn(async move {
            // The permit lives as long as the connection task
            let _permit = permit;

            if let Err(e) = connection.run().await {
                tracing::debug!(session_id, error = %e, "Connection error");
            }

            registry.stats().connection_closed();
            tracing::debug!(session_id, "Connection closed");
        });
    }

    /// Signal all connection tasks and wait out the grace period
    async fn drain_connections(&self) {
        let _ = self.shutdown_tx.send(true);
        // Wake sink tasks blocked on their queues and sources blocked on
        // reads that may not observe the watch channel promptly
        self.registry.close_all().await;

        let mut connections = self.connections.lock().await;
        let drain = async {
            while connections.join_next().await.is_some() {}
        };

        if tokio::time::timeout(self.config.shutdown_grace, drain)
            .await
            .is_err()
        {
            tracing::warn!(
                grace_secs = self.config.shutdown_grace.as_secs(),
                "Connections did not drain within grace period, aborting"
            );
            connections.abort_all();
        }

        tracing::info!("Data broker stopped");
    }

    /// Spawn the periodic stats log task
    fn spawn_stats_task(&self) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(&self.registry);
        let interval = self.config.stats_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // First tick completes immediately
            loop {
                ticker.tick().await;
                let snapshot = registry.stats().snapshot();
                let datasets = registry.dataset_count().await;
                tracing::info!(
                    datasets,
                    connections = snapshot.connections_active,
                    published = snapshot.packets_published,
                    dropped = snapshot.packets_dropped,
                    bytes_in = snapshot.bytes_in,
                    bytes_out = snapshot.bytes_out,
                    "Broker stats"
                );
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::protocol::frame::write_frame;

    #[tokio::test]
    async fn test_finished_connection_tasks_are_reaped() {
        let config = ServerConfig::default().bind("127.0.0.1:0".parse().unwrap());
        let broker = Arc::new(Broker::bind(config).await.unwrap());
        let addr = broker.local_addr();

        let runner = Arc::clone(&broker);
        tokio::spawn(async move {
            let _ = runner.run().await;
        });

        // Connections that fail the handshake finish almost immediately
        for _ in 0..10 {
            let mut socket = TcpStream::connect(addr).await.unwrap();
            write_frame(&mut socket, b"not a handshake").await.unwrap();
        }

        // Each new accept reaps the tasks that finished before it
        for _ in 0..100 {
            let mut socket = TcpStream::connect(addr).await.unwrap();
            write_frame(&mut socket, b"not a handshake").await.unwrap();
            drop(socket);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if broker.connections.lock().await.len() <= 2 {
                return;
            }
        }
        panic!("finished connection tasks were never reaped");
    }
}
