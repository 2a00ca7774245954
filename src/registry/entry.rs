//! Per-dataset state stored in the registry

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio::sync::Notify;

use crate::queue::BoundedQueue;

/// The source connection currently attached to a dataset
pub(crate) struct SourceSlot {
    /// Session id of the owning connection
    pub session_id: u64,
    /// Fired when a newer source replaces this one
    pub evict: Arc<Notify>,
}

/// Entry for a single dataset.
///
/// Holds at most one source and any number of sinks, each with its own
/// [`BoundedQueue`]. Lives as long as any connection references the
/// dataset's name.
pub struct DatasetEntry {
    /// Current source, if any
    pub(crate) source: Option<SourceSlot>,

    /// Sink session id to its owned queue
    pub(crate) sinks: HashMap<u64, Arc<BoundedQueue>>,

    /// When the dataset was created
    pub created_at: Instant,
}

impl DatasetEntry {
    pub(crate) fn new() -> Self {
        Self {
            source: None,
            sinks: HashMap::new(),
            created_at: Instant::now(),
        }
    }

    /// Whether a source connection is currently attached
    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Number of attached sinks
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// No source and no sinks; the entry is eligible for deletion
    pub fn is_empty(&self) -> bool {
        self.source.is_none() && self.sinks.is_empty()
    }

    /// Copy a packet into every sink queue.
    ///
    /// Never blocks; a full queue evicts its oldest packet. Returns
    /// `(fanned_out, dropped)` counts for the stats path.
    pub(crate) fn fan_out(&self, packet: &Bytes) -> (u64, u64) {
        let mut fanned_out = 0;
        let mut dropped = 0;
        for queue in self.sinks.values() {
            if queue.push(packet.clone()) {
                dropped += 1;
            }
            fanned_out += 1;
        }
        (fanned_out, dropped)
    }
}

impl Default for DatasetEntry {
    fn default() -> Self {
        Self::new()
    }
}
