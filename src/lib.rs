//! Streaming data broker for laboratory experiment data
//!
//! `dataserv-rs` decouples producers of experimental measurements from the
//! consumers that visualize or persist them. A producer connects to the
//! broker as the *source* of a named *dataset*; any number of *sinks*
//! attach to the same name and each receives an independent copy of every
//! packet published from then on.
//!
//! The broker never blocks a producer on a slow consumer: each sink owns a
//! fixed-capacity queue that evicts its oldest unread packet on overflow
//! (backpressure by eviction). Delivery is therefore best-effort by
//! design; silent packet loss under slow consumption is documented
//! behavior, not an error.
//!
//! # Quick start
//!
//! ```no_run
//! use std::time::Duration;
//! use dataserv_rs::client::{DataSink, DataSource};
//! use dataserv_rs::server::{Broker, ServerConfig};
//!
//! # async fn example() -> dataserv_rs::error::Result<()> {
//! let broker = Broker::bind(ServerConfig::default()).await?;
//! let addr = broker.local_addr();
//! tokio::spawn(async move { broker.run().await });
//!
//! let mut source = DataSource::connect(addr, "odmr_scan").await?;
//! let sink = DataSink::connect(addr, "odmr_scan").await?;
//!
//! source.push(b"sweep data").await?;
//! let packet = sink.pop(Duration::from_secs(1)).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod protocol;
pub mod queue;
pub mod registry;
pub mod server;
pub mod stats;

pub use client::{fetch_datasets, DataSink, DataSource};
pub use error::{Error, ProtocolError, Result};
pub use protocol::{Handshake, Role};
pub use queue::{BoundedQueue, PopResult};
pub use registry::{DataRegistry, SinkHandle, SourceHandle};
pub use server::{Broker, ServerConfig};
pub use stats::{BrokerStats, StatsSnapshot};
