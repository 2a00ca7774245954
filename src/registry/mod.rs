//! Dataset registry: the broker's fan-out authority
//!
//! The registry maps dataset names to their live source and sink
//! connections and copies every published packet into each sink's bounded
//! queue.
//!
//! # Architecture
//!
//! ```text
//!                       Arc<DataRegistry>
//!                 ┌──────────────────────────┐
//!                 │ datasets: HashMap<name,  │
//!                 │   DatasetEntry {         │
//!                 │     source,              │
//!                 │     sinks: id → queue,   │
//!                 │   }                      │
//!                 └────────────┬─────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!   [Source]               [Sink]                [Sink]
//!   read_frame()           queue.pop()           queue.pop()
//!        │                     │                     │
//!        └──► publish() ──► queue.push() ──► write_frame() ──► TCP
//! ```
//!
//! # Cheap fan-out
//!
//! Packets are immutable `bytes::Bytes`, so the fan-out copy into every
//! sink queue is a reference-count bump, not a memory copy.

pub mod entry;
pub mod store;

pub use entry::DatasetEntry;
pub use store::{DataRegistry, SinkHandle, SourceHandle};
